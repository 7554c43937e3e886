//! Object materialization over structural event streams.
//!
//! [`Materialize`] is the baseline construction step for one node.
//! [`Materializer`] wraps it: it handles import directives, captures the node
//! for types that want a second pass over their own events, and reports the
//! node's span to the completion hook. It also carries the state of one
//! document load: the file stack, the resource provider stack and the nodes
//! awaiting an owner. It is neither `Send` nor shareable.

mod scalars;
mod value;

pub use value::Value;

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    rc::Rc,
    sync::Arc,
};

use tracing::trace;

use crate::{
    config::LoadOptions,
    document::{EventKind, EventSource, Span},
    error::LoadError,
    pipeline::{ConfigNode, DomainStore},
    registry::RegistryIndex,
    replay::ReplayBuffer,
    resolve::import,
    resource::ResourceProvider,
    schema::{self, NamingConvention, Schema},
};

/// Baseline construction of a value from one node.
pub trait Materialize: Sized {
    /// Whether [`extra_data`](Self::extra_data) wants a replay of the node.
    const EXTRA_DATA: bool = false;

    /// Build the value from the next node of `events`.
    fn materialize(cx: &mut Materializer<'_>, events: &mut dyn EventSource)
        -> Result<Self, LoadError>;

    /// Second pass over the node's own events, run before completion.
    fn extra_data(
        &mut self,
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<(), LoadError> {
        let _ = (cx, events);
        Ok(())
    }

    /// Notification that the node spanning `span` is fully built.
    fn on_complete(&mut self, cx: &mut Materializer<'_>, span: Span) -> Result<(), LoadError> {
        let _ = (cx, span);
        Ok(())
    }
}

/// Keys read by [`Materializer::read_mapping`].
#[derive(Debug, Clone, Default)]
pub struct MappingSummary {
    /// Span of the whole mapping.
    pub span: Span,
    /// Keys handed to the visitor, in document order.
    pub keys: Vec<(String, Span)>,
    /// Keys skipped because the schema is open.
    pub skipped: Vec<(String, Span)>,
}

impl MappingSummary {
    /// Whether `key` was read.
    pub fn has(&self, key: &str) -> bool {
        self.keys.iter().any(|(seen, _)| seen == key)
    }
}

#[derive(Debug, Clone, Default)]
struct PendingMapping {
    open: bool,
    reserved: Option<String>,
}

/// Load-scoped context driving materialization.
pub struct Materializer<'a> {
    registry: Arc<RegistryIndex>,
    options: &'a LoadOptions,
    store: &'a mut DomainStore,
    files: Vec<PathBuf>,
    providers: Vec<Rc<dyn ResourceProvider>>,
    loading: Vec<Rc<dyn ConfigNode>>,
    pending: PendingMapping,
}

impl<'a> Materializer<'a> {
    /// Context for one load against a registry snapshot.
    pub fn new(
        registry: Arc<RegistryIndex>,
        options: &'a LoadOptions,
        store: &'a mut DomainStore,
    ) -> Self {
        Self {
            registry,
            options,
            store,
            files: Vec::new(),
            providers: Vec::new(),
            loading: Vec::new(),
            pending: PendingMapping::default(),
        }
    }

    /// Registry snapshot used for this load.
    pub fn registry(&self) -> Arc<RegistryIndex> {
        Arc::clone(&self.registry)
    }

    /// Load options.
    pub fn options(&self) -> &LoadOptions {
        self.options
    }

    /// Active key naming convention.
    pub fn convention(&self) -> NamingConvention {
        self.options.naming
    }

    /// Domain objects created or located by subject nodes.
    pub fn store(&mut self) -> &mut DomainStore {
        self.store
    }

    /// Document currently being parsed.
    pub fn current_file(&self) -> Option<&Path> {
        self.files.last().map(PathBuf::as_path)
    }

    /// Whether `path` is on the file stack.
    pub fn is_open_file(&self, path: &Path) -> bool {
        self.files.iter().any(|open| open == path)
    }

    /// Run `f` with `path` on top of the file stack.
    ///
    /// The path is popped again whatever `f` returns.
    pub fn with_file<R>(
        &mut self,
        path: PathBuf,
        f: impl FnOnce(&mut Self) -> Result<R, LoadError>,
    ) -> Result<R, LoadError> {
        trace!(path = %path.display(), depth = self.files.len(), "entering document");
        self.files.push(path);
        let result = f(self);
        self.files.pop();
        result
    }

    /// Resource provider currently in scope.
    pub fn provider(&self) -> Option<Rc<dyn ResourceProvider>> {
        self.providers.last().cloned()
    }

    /// Run `f` with `provider` in scope.
    ///
    /// The provider is popped again whatever `f` returns.
    pub fn with_provider<R>(
        &mut self,
        provider: Rc<dyn ResourceProvider>,
        f: impl FnOnce(&mut Self) -> Result<R, LoadError>,
    ) -> Result<R, LoadError> {
        self.providers.push(provider);
        let result = f(self);
        self.providers.pop();
        result
    }

    /// Queue a configuration node until its owner is known.
    pub fn register_loading(&mut self, node: Rc<dyn ConfigNode>) {
        self.loading.push(node);
    }

    /// Nodes queued since the last call.
    pub fn take_loading(&mut self) -> Vec<Rc<dyn ConfigNode>> {
        std::mem::take(&mut self.loading)
    }

    /// Read the next mapping as an open schema, whatever the type declares.
    pub(crate) fn open_next_mapping(&mut self) {
        self.pending.open = true;
    }

    /// Skip `key` in the next mapping, whatever the type declares.
    pub(crate) fn reserve_next_key(&mut self, key: &str) {
        self.pending.reserved = Some(key.to_string());
    }

    /// Key reserved for the next mapping, if any.
    pub(crate) fn reserved_key(&self) -> Option<&str> {
        self.pending.reserved.as_deref()
    }

    /// Drop any mapping adjustment the last read left unused.
    pub(crate) fn clear_pending(&mut self) {
        self.pending = PendingMapping::default();
    }

    /// Materialize the next node as `T`, running the hooks around it.
    pub fn read<T: Materialize>(&mut self, events: &mut dyn EventSource) -> Result<T, LoadError> {
        if let Some((target, span)) = import::directive(events.peek(), &self.options.import_tag) {
            events.require()?;
            return import::substitute::<T>(self, &target, span);
        }

        let start = match events.peek() {
            Some(event) => event.span.start,
            None => {
                return Err(LoadError::malformed(
                    "expected a node, found end of stream",
                    events.last_span(),
                ))
            }
        };

        let (mut value, span) = if T::EXTRA_DATA {
            let buffer = ReplayBuffer::capture(events, |_| {})?;
            // Both passes see the same mapping adjustments.
            let pending = self.pending.clone();
            let mut value = T::materialize(self, &mut buffer.cursor())?;
            self.pending = pending;
            let extra = value.extra_data(self, &mut buffer.cursor());
            self.clear_pending();
            extra?;
            let span = buffer.span().unwrap_or_else(|| Span::point(start));
            (value, span)
        } else {
            let value = T::materialize(self, events)?;
            let end = events.last_span().map_or(start, |span| span.end);
            (value, Span::new(start, end))
        };

        value.on_complete(self, span)?;
        Ok(value)
    }

    /// Read a mapping with arbitrary scalar keys.
    ///
    /// `visit` must consume exactly the value node of each key.
    pub fn read_entries(
        &mut self,
        events: &mut dyn EventSource,
        mut visit: impl FnMut(&mut Self, String, Span, &mut dyn EventSource) -> Result<(), LoadError>,
    ) -> Result<Span, LoadError> {
        let start = events.require()?;
        if !matches!(start.kind, EventKind::MappingStart { .. }) {
            return Err(LoadError::unexpected("mapping", &start));
        }

        let mut seen = HashSet::new();
        loop {
            let key = events.require()?;
            let key_span = key.span;
            let name = match key.kind {
                EventKind::MappingEnd => return Ok(start.span.to(key_span)),
                EventKind::Scalar { value, .. } => value,
                other => {
                    return Err(LoadError::UnexpectedNode {
                        expected: "scalar key",
                        found: other.describe().to_string(),
                        span: key_span,
                    })
                }
            };
            if !seen.insert(name.clone()) {
                return Err(LoadError::DuplicateKey {
                    key: name,
                    span: key_span,
                });
            }
            visit(self, name, key_span, events)?;
        }
    }

    /// Read a mapping against the schema `S`.
    ///
    /// Keys are matched to member identifiers under the active naming
    /// convention and `visit` receives the identifier. Unknown keys are an
    /// error unless the schema is open.
    pub fn read_mapping<S: Schema>(
        &mut self,
        events: &mut dyn EventSource,
        mut visit: impl FnMut(&mut Self, &'static str, &mut dyn EventSource) -> Result<(), LoadError>,
    ) -> Result<MappingSummary, LoadError> {
        let pending = std::mem::take(&mut self.pending);
        let open = S::OPEN || pending.open;
        let convention = self.convention();

        let mut keys = Vec::new();
        let mut skipped = Vec::new();
        let span = self.read_entries(events, |cx, key, key_span, events| {
            if pending.reserved.as_deref() == Some(key.as_str()) {
                events.skip_node()?;
                return Ok(());
            }
            match schema::member_for(S::MEMBERS, convention, &key) {
                Some(member) => {
                    visit(cx, member.ident, events)?;
                    keys.push((key, key_span));
                }
                None if open => {
                    events.skip_node()?;
                    skipped.push((key, key_span));
                }
                None => {
                    return Err(LoadError::UnknownKey {
                        key,
                        owner: S::NAME.to_string(),
                        span: key_span,
                    })
                }
            }
            Ok(())
        })?;

        Ok(MappingSummary {
            span,
            keys,
            skipped,
        })
    }

    /// Read a sequence, calling `visit` once per item.
    pub fn read_sequence(
        &mut self,
        events: &mut dyn EventSource,
        mut visit: impl FnMut(&mut Self, &mut dyn EventSource) -> Result<(), LoadError>,
    ) -> Result<Span, LoadError> {
        let start = events.require()?;
        if !matches!(start.kind, EventKind::SequenceStart { .. }) {
            return Err(LoadError::unexpected("sequence", &start));
        }
        loop {
            let at_end = match events.peek() {
                Some(event) => matches!(event.kind, EventKind::SequenceEnd),
                None => {
                    return Err(LoadError::malformed("unterminated sequence", Some(start.span)))
                }
            };
            if at_end {
                let end = events.require()?;
                return Ok(start.span.to(end.span));
            }
            visit(self, events)?;
        }
    }

    /// Read a scalar's text.
    pub fn read_scalar(
        &mut self,
        events: &mut dyn EventSource,
        expected: &'static str,
    ) -> Result<(String, Span), LoadError> {
        let event = events.require()?;
        match event.kind {
            EventKind::Scalar { value, .. } => Ok((value, event.span)),
            _ => Err(LoadError::unexpected(expected, &event)),
        }
    }
}

/// Unwrap a required member, reporting it under the active naming convention.
pub fn require_member<T>(
    value: Option<T>,
    ident: &'static str,
    owner: &'static str,
    convention: NamingConvention,
    span: Span,
) -> Result<T, LoadError> {
    value.ok_or_else(|| LoadError::MissingKey {
        key: convention.apply(ident),
        owner: owner.to_string(),
        span,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        document::Document,
        registry::TypeRegistry,
        schema::Member,
        testing::Harness,
    };

    #[derive(Debug, Default)]
    struct Settings {
        max_speed: u32,
        label: Option<String>,
        notes: Vec<String>,
        extras: Vec<String>,
        completed: Option<Span>,
    }

    impl Schema for Settings {
        const NAME: &'static str = "settings";
        const MEMBERS: &'static [Member] = &[
            Member::new("max_speed"),
            Member::aliased("label", &["title"]),
            Member::new("notes"),
        ];
        const OPEN: bool = true;
    }

    impl Materialize for Settings {
        const EXTRA_DATA: bool = true;

        fn materialize(
            cx: &mut Materializer<'_>,
            events: &mut dyn EventSource,
        ) -> Result<Self, LoadError> {
            let mut settings = Settings::default();
            let mut max_speed: Option<u32> = None;
            let summary = cx.read_mapping::<Self>(events, |cx, member, events| {
                match member {
                    "max_speed" => max_speed = Some(cx.read(events)?),
                    "label" => settings.label = cx.read(events)?,
                    "notes" => settings.notes = cx.read(events)?,
                    _ => {
                        events.skip_node()?;
                    }
                }
                Ok(())
            })?;
            settings.max_speed =
                require_member(max_speed, "max_speed", Self::NAME, cx.convention(), summary.span)?;
            Ok(settings)
        }

        fn extra_data(
            &mut self,
            cx: &mut Materializer<'_>,
            events: &mut dyn EventSource,
        ) -> Result<(), LoadError> {
            assert!(self.completed.is_none(), "extra data must precede completion");
            let summary = cx.read_mapping::<Self>(events, |_, _, events| {
                events.skip_node()?;
                Ok(())
            })?;
            self.extras = summary.skipped.into_iter().map(|(key, _)| key).collect();
            Ok(())
        }

        fn on_complete(&mut self, _cx: &mut Materializer<'_>, span: Span) -> Result<(), LoadError> {
            self.completed = Some(span);
            Ok(())
        }
    }

    #[test]
    fn reads_members_aliases_and_extra_data() -> anyhow::Result<()> {
        let document = Document::parse(
            "settings.yaml",
            "max_speed: 12\ntitle: Fast\nnotes: [a, b]\nx-origin: test\n",
        )?;
        let mut harness = Harness::new(TypeRegistry::new());
        let settings: Settings = harness.read(&document)?;

        assert_eq!(settings.max_speed, 12);
        assert_eq!(settings.label.as_deref(), Some("Fast"));
        assert_eq!(settings.notes, vec!["a", "b"]);
        assert_eq!(settings.extras, vec!["x-origin"]);

        let span = settings.completed.expect("completion hook ran");
        assert!(span.start <= span.end);
        assert!(document.bounds().contains(&span));
        Ok(())
    }

    #[test]
    fn missing_required_member_is_reported() -> anyhow::Result<()> {
        let document = Document::parse("settings.yaml", "label: slow\n")?;
        let mut harness = Harness::new(TypeRegistry::new());
        let err = harness.read::<Settings>(&document).unwrap_err();
        assert!(
            matches!(err, LoadError::MissingKey { ref key, .. } if key == "max_speed"),
            "unexpected error {err}"
        );
        Ok(())
    }

    #[test]
    fn duplicate_keys_are_rejected() -> anyhow::Result<()> {
        let document = Document::parse("dup.yaml", "{a: 1, a: 2}")?;
        let mut harness = Harness::new(TypeRegistry::new());
        let err = harness
            .read::<std::collections::BTreeMap<String, i64>>(&document)
            .unwrap_err();
        assert!(matches!(err, LoadError::DuplicateKey { .. }));
        Ok(())
    }

    #[test]
    fn sequence_reader_rejects_mappings() -> anyhow::Result<()> {
        let document = Document::parse("seq.yaml", "a: 1\n")?;
        let mut harness = Harness::new(TypeRegistry::new());
        let err = harness.read::<Vec<String>>(&document).unwrap_err();
        assert!(matches!(err, LoadError::UnexpectedNode { expected: "sequence", .. }));
        Ok(())
    }
}
