//! Error types raised while loading configuration documents.

use std::path::{Path, PathBuf};

use crate::document::{Event, Span};

/// Errors raised while turning a document into typed objects.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The structural event stream was unbalanced or ended early.
    #[error("malformed event stream{}: {}", location(.span), .message)]
    StreamMalformed {
        /// What went wrong.
        message: String,
        /// Where it went wrong, when known.
        span: Option<Span>,
    },

    /// The YAML scanner rejected the document text.
    #[error("syntax error at {span}: {message}")]
    Syntax {
        /// Scanner message.
        message: String,
        /// Position reported by the scanner.
        span: Span,
    },

    /// No candidate type could represent a polymorphic node.
    #[error(transparent)]
    TypeResolution(#[from] TypeResolutionFailure),

    /// An `!import` directive referenced a missing document.
    #[error("imported document {} does not exist (at {})", .path.display(), .span)]
    ImportNotFound {
        /// Absolute path that was attempted.
        path: PathBuf,
        /// Span of the import directive.
        span: Span,
    },

    /// An `!import` directive referenced a document that is already being parsed.
    #[error("import cycle: {} is already being loaded (at {})", .path.display(), .span)]
    ImportCycle {
        /// Absolute path of the document closing the cycle.
        path: PathBuf,
        /// Span of the import directive.
        span: Span,
    },

    /// A mapping contained a key no schema accepts.
    #[error("unknown key `{key}` for {owner} at {span}")]
    UnknownKey {
        /// Offending key.
        key: String,
        /// Schema that rejected it.
        owner: String,
        /// Span of the key.
        span: Span,
    },

    /// A required key was absent.
    #[error("missing required key `{key}` for {owner} at {span}")]
    MissingKey {
        /// Missing key, under the active naming convention.
        key: String,
        /// Schema requiring it.
        owner: String,
        /// Span of the mapping.
        span: Span,
    },

    /// A mapping repeated a key.
    #[error("duplicate key `{key}` at {span}")]
    DuplicateKey {
        /// Repeated key.
        key: String,
        /// Span of the second occurrence.
        span: Span,
    },

    /// A node of the wrong kind was found.
    #[error("expected {expected}, found {found} at {span}")]
    UnexpectedNode {
        /// Node kind the reader wanted.
        expected: &'static str,
        /// Node kind it got.
        found: String,
        /// Span of the offending event.
        span: Span,
    },

    /// A scalar could not be converted to the requested type.
    #[error("invalid {expected} `{value}` at {span}: {reason}")]
    InvalidScalar {
        /// Requested type.
        expected: &'static str,
        /// Raw scalar text.
        value: String,
        /// Conversion failure.
        reason: String,
        /// Span of the scalar.
        span: Span,
    },

    /// The type registry refused a query.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A document could not be read from its resource provider.
    #[error("failed to read {}: {}", .path.display(), .source)]
    Io {
        /// Absolute path that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Applying configuration onto a domain object failed.
    #[error("failed to apply {subject}: {message}")]
    Apply {
        /// Node that was being applied.
        subject: String,
        /// Failure description.
        message: String,
    },

    /// An error that crossed a document boundary.
    #[error("{}{}: {}", .path.display(), location(.span), .source)]
    InFile {
        /// Document in which the error surfaced.
        path: PathBuf,
        /// Position inside that document.
        span: Option<Span>,
        /// Wrapped error.
        #[source]
        source: Box<LoadError>,
    },
}

impl LoadError {
    /// Build a [`LoadError::StreamMalformed`].
    pub fn malformed(message: impl Into<String>, span: Option<Span>) -> Self {
        LoadError::StreamMalformed {
            message: message.into(),
            span,
        }
    }

    /// Build a [`LoadError::UnexpectedNode`] for the given event.
    pub fn unexpected(expected: &'static str, event: &Event) -> Self {
        LoadError::UnexpectedNode {
            expected,
            found: event.kind.describe().to_string(),
            span: event.span,
        }
    }

    /// Source position of the error, when it has one.
    pub fn span(&self) -> Option<Span> {
        match self {
            LoadError::StreamMalformed { span, .. } | LoadError::InFile { span, .. } => *span,
            LoadError::Syntax { span, .. }
            | LoadError::ImportNotFound { span, .. }
            | LoadError::ImportCycle { span, .. }
            | LoadError::UnknownKey { span, .. }
            | LoadError::MissingKey { span, .. }
            | LoadError::DuplicateKey { span, .. }
            | LoadError::UnexpectedNode { span, .. }
            | LoadError::InvalidScalar { span, .. } => Some(*span),
            LoadError::TypeResolution(failure) => Some(failure.span()),
            LoadError::Registry(_) | LoadError::Io { .. } | LoadError::Apply { .. } => None,
        }
    }

    /// Tag the error with the document it surfaced in.
    ///
    /// Errors already scoped to the same document are returned unchanged.
    pub fn in_file(self, path: &Path) -> Self {
        if let LoadError::InFile { path: inner, .. } = &self {
            if inner == path {
                return self;
            }
        }
        let span = self.span();
        LoadError::InFile {
            path: path.to_path_buf(),
            span,
            source: Box::new(self),
        }
    }

    /// Innermost error beneath any document scoping.
    pub fn root_cause(&self) -> &LoadError {
        match self {
            LoadError::InFile { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Documents the error passed through, outermost first.
    pub fn file_trail(&self) -> Vec<&Path> {
        let mut trail = Vec::new();
        let mut current = self;
        while let LoadError::InFile { path, source, .. } = current {
            trail.push(path.as_path());
            current = source.as_ref();
        }
        trail
    }
}

/// No candidate type matched a polymorphic node.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeResolutionFailure {
    /// The discriminator value is not registered for the expected type.
    #[error(
        "unknown {} `{}` for {} at {}; registered values: [{}]",
        .key,
        .value,
        .expected,
        .span,
        .registered.join(", ")
    )]
    UnknownDiscriminator {
        /// Expected (super)type.
        expected: &'static str,
        /// Discriminator key.
        key: &'static str,
        /// Value found in the document.
        value: String,
        /// Every registered discriminator value, in registration order.
        registered: Vec<String>,
        /// Span of the node.
        span: Span,
    },

    /// No duck-typed candidate accepts the observed keys.
    #[error(
        "no candidate for {} accepts keys [{}] at {}; candidates: [{}]",
        .expected,
        .observed.join(", "),
        .span,
        .candidates.join(", ")
    )]
    NoDuckMatch {
        /// Expected (super)type.
        expected: &'static str,
        /// Candidate names in declaration order.
        candidates: Vec<String>,
        /// Keys present on the node.
        observed: Vec<String>,
        /// Span of the node.
        span: Span,
    },

    /// The node's tag names no registered candidate.
    #[error(
        "tag `{}` names no candidate for {} at {}; candidates: [{}]",
        .tag,
        .expected,
        .span,
        .candidates.join(", ")
    )]
    UnknownTag {
        /// Expected (super)type.
        expected: &'static str,
        /// Tag found on the node.
        tag: String,
        /// Registered candidate names.
        candidates: Vec<String>,
        /// Span of the node.
        span: Span,
    },

    /// An untagged node could be any of several candidates.
    #[error(
        "cannot choose a type for {} at {}; candidates: [{}]",
        .expected,
        .span,
        .candidates.join(", ")
    )]
    Ambiguous {
        /// Expected (super)type.
        expected: &'static str,
        /// Registered candidate names.
        candidates: Vec<String>,
        /// Span of the node.
        span: Span,
    },
}

impl TypeResolutionFailure {
    /// Span of the node that failed to resolve.
    pub fn span(&self) -> Span {
        match self {
            TypeResolutionFailure::UnknownDiscriminator { span, .. }
            | TypeResolutionFailure::NoDuckMatch { span, .. }
            | TypeResolutionFailure::UnknownTag { span, .. }
            | TypeResolutionFailure::Ambiguous { span, .. } => *span,
        }
    }
}

/// Errors raised by the type registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The marker is not flagged registrable.
    #[error("marker `{marker}` is not registrable and cannot be queried")]
    Unregistrable {
        /// Marker name.
        marker: &'static str,
    },
}

/// A type tagged with a marker it does not conform to.
///
/// Recorded once per offending type and logged as a warning; never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{type_name} is tagged `{marker}` by module `{module}` but was rejected: {reason}")]
pub struct ExtensionMisconfigured {
    /// Marker the type was tagged with.
    pub marker: &'static str,
    /// Offending type.
    pub type_name: String,
    /// Module that registered it.
    pub module: String,
    /// Why it was rejected.
    pub reason: String,
}

/// A mod's root document failed to load.
#[derive(Debug, thiserror::Error)]
#[error("failed to load mod at {}: {}", .mod_path.display(), summarize(.errors))]
pub struct DocumentLoadFailure {
    /// Directory of the mod that failed.
    pub mod_path: PathBuf,
    /// One error per failed root pass.
    pub errors: Vec<LoadError>,
}

fn location(span: &Option<Span>) -> String {
    match span {
        Some(span) => format!(":{}", span.start),
        None => String::new(),
    }
}

fn summarize(errors: &[LoadError]) -> String {
    match errors {
        [] => "no errors recorded".to_string(),
        [single] => single.to_string(),
        many => many
            .iter()
            .enumerate()
            .map(|(index, err)| format!("\n  {}. {}", index + 1, err))
            .collect(),
    }
}
