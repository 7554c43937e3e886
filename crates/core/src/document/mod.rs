//! Positioned structural events and the documents that own them.

/// YAML text to balanced event sequences.
pub mod reader;

use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::error::LoadError;

/// A position in a document's source text.
///
/// `index` counts characters from the start of the document; `line` and
/// `column` are both 1-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Mark {
    /// Character offset.
    pub index: usize,
    /// Line number.
    pub line: usize,
    /// Column number.
    pub column: usize,
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Start and end positions of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Span {
    /// First position covered.
    pub start: Mark,
    /// Position just past the node.
    pub end: Mark,
}

impl Span {
    /// Build a span, clamping `end` so it never precedes `start`.
    pub fn new(start: Mark, end: Mark) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Zero-width span at `mark`.
    pub fn point(mark: Mark) -> Self {
        Self {
            start: mark,
            end: mark,
        }
    }

    /// Span from the start of `self` to the end of `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end)
    }

    /// Whether `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Span) -> bool {
        self.start.index <= other.start.index && other.end.index <= self.end.index
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A YAML tag such as `!import`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    /// Tag handle, `!` for local tags.
    pub handle: String,
    /// Tag suffix.
    pub suffix: String,
}

impl Tag {
    /// Build a local (`!name`) tag.
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            handle: "!".to_string(),
            suffix: name.into(),
        }
    }

    /// Whether this is the local tag `!name`.
    pub fn is_local(&self, name: &str) -> bool {
        self.handle == "!" && self.suffix == name
    }

    /// Suffix of a local tag.
    pub fn local_name(&self) -> Option<&str> {
        (self.handle == "!").then_some(self.suffix.as_str())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.handle, self.suffix)
    }
}

/// Kind of a structural event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Opens a mapping.
    MappingStart {
        /// Tag attached to the mapping.
        tag: Option<Tag>,
    },
    /// Closes the innermost mapping.
    MappingEnd,
    /// Opens a sequence.
    SequenceStart {
        /// Tag attached to the sequence.
        tag: Option<Tag>,
    },
    /// Closes the innermost sequence.
    SequenceEnd,
    /// A scalar value.
    Scalar {
        /// Scalar text.
        value: String,
        /// Tag attached to the scalar.
        tag: Option<Tag>,
        /// Whether the scalar was written unquoted.
        plain: bool,
    },
}

impl EventKind {
    /// Whether the event opens a composite node.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            EventKind::MappingStart { .. } | EventKind::SequenceStart { .. }
        )
    }

    /// Whether the event closes a composite node.
    pub fn is_close(&self) -> bool {
        matches!(self, EventKind::MappingEnd | EventKind::SequenceEnd)
    }

    /// Tag carried by the event.
    pub fn tag(&self) -> Option<&Tag> {
        match self {
            EventKind::MappingStart { tag }
            | EventKind::SequenceStart { tag }
            | EventKind::Scalar { tag, .. } => tag.as_ref(),
            EventKind::MappingEnd | EventKind::SequenceEnd => None,
        }
    }

    /// Short human readable name.
    pub fn describe(&self) -> &'static str {
        match self {
            EventKind::MappingStart { .. } => "mapping",
            EventKind::MappingEnd => "end of mapping",
            EventKind::SequenceStart { .. } => "sequence",
            EventKind::SequenceEnd => "end of sequence",
            EventKind::Scalar { .. } => "scalar",
        }
    }
}

/// A structural event with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// Where it happened.
    pub span: Span,
}

impl Event {
    /// Build an event.
    pub fn new(kind: EventKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Scalar text, if the event is a scalar.
    pub fn as_scalar(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Scalar { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Whether the event is an untagged plain null scalar.
    pub fn is_null(&self) -> bool {
        match &self.kind {
            EventKind::Scalar {
                value,
                tag: None,
                plain: true,
            } => matches!(value.as_str(), "" | "~" | "null" | "Null" | "NULL"),
            _ => false,
        }
    }
}

/// Forward reader over structural events.
pub trait EventSource {
    /// Next event without consuming it.
    fn peek(&self) -> Option<&Event>;

    /// Consume the next event.
    fn next_event(&mut self) -> Option<Event>;

    /// Span of the most recently consumed event.
    fn last_span(&self) -> Option<Span>;

    /// Consume the next event, failing at end of stream.
    fn require(&mut self) -> Result<Event, LoadError> {
        match self.next_event() {
            Some(event) => Ok(event),
            None => Err(LoadError::malformed(
                "unexpected end of event stream",
                self.last_span(),
            )),
        }
    }

    /// Consume one complete node and return its span.
    fn skip_node(&mut self) -> Result<Span, LoadError> {
        let first = self.require()?;
        if first.kind.is_close() {
            return Err(LoadError::malformed(
                format!("unexpected {} where a node was expected", first.kind.describe()),
                Some(first.span),
            ));
        }
        let mut depth = usize::from(first.kind.is_open());
        let mut end = first.span;
        while depth > 0 {
            let event = self.require()?;
            if event.kind.is_open() {
                depth += 1;
            } else if event.kind.is_close() {
                depth -= 1;
            }
            end = event.span;
        }
        Ok(first.span.to(end))
    }
}

/// Borrowing cursor over a finalized event slice.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    events: &'a [Event],
    position: usize,
}

impl<'a> Cursor<'a> {
    /// Cursor positioned before the first event.
    pub fn new(events: &'a [Event]) -> Self {
        Self {
            events,
            position: 0,
        }
    }

    /// Events not yet consumed.
    pub fn remaining(&self) -> &'a [Event] {
        &self.events[self.position..]
    }
}

impl EventSource for Cursor<'_> {
    fn peek(&self) -> Option<&Event> {
        self.events.get(self.position)
    }

    fn next_event(&mut self) -> Option<Event> {
        let event = self.events.get(self.position)?.clone();
        self.position += 1;
        Some(event)
    }

    fn last_span(&self) -> Option<Span> {
        self.position
            .checked_sub(1)
            .and_then(|index| self.events.get(index))
            .map(|event| event.span)
    }
}

/// One parsed YAML document: a balanced event sequence for a single root node.
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    events: Vec<Event>,
    end: Mark,
}

impl Document {
    /// Parse `source` as a single document.
    ///
    /// Anchors, aliases and `<<` merge keys are resolved here, so readers
    /// only ever see plain mappings, sequences and scalars. An empty source
    /// yields an empty mapping.
    pub fn parse(path: impl Into<PathBuf>, source: &str) -> Result<Self, LoadError> {
        let (events, end) = reader::read_events(source)?;
        Ok(Self {
            path: path.into(),
            events,
            end,
        })
    }

    /// Path the document was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every event of the document.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Fresh reader positioned at the root node.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(&self.events)
    }

    /// Span covering the whole source text.
    pub fn bounds(&self) -> Span {
        Span::new(
            Mark {
                index: 0,
                line: 1,
                column: 1,
            },
            self.end,
        )
    }
}
