//! Captured, rewindable event streams for a single node.
//!
//! A [`ReplayBuffer`] is filled once, either by [`ReplayBuffer::enqueue`] or
//! by [`ReplayBuffer::capture`], then frozen with [`ReplayBuffer::start`].
//! From then on it can be iterated and rewound any number of times, and every
//! pass produces the same events. Type discovery, extension attachment and
//! final materialization all read the same captured node this way.

use crate::{
    document::{Cursor, Event, EventKind, EventSource, Span},
    error::LoadError,
};

/// Events of exactly one node, replayable after [`start`](Self::start).
#[derive(Debug, Clone, Default)]
pub struct ReplayBuffer {
    events: Vec<Event>,
    position: usize,
    started: bool,
}

impl ReplayBuffer {
    /// Empty buffer accepting events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the next complete node from `source`.
    ///
    /// Every consumed event is also forwarded to `passthrough`, so a caller can
    /// inspect the node while it is being captured. The returned buffer is
    /// already started.
    pub fn capture(
        source: &mut dyn EventSource,
        mut passthrough: impl FnMut(&Event),
    ) -> Result<Self, LoadError> {
        let mut buffer = Self::new();
        let first = source.require()?;
        if first.kind.is_close() {
            return Err(LoadError::malformed(
                format!("unexpected {} where a node was expected", first.kind.describe()),
                Some(first.span),
            ));
        }

        let mut depth = usize::from(first.kind.is_open());
        passthrough(&first);
        buffer.events.push(first);
        while depth > 0 {
            let event = source.next_event().ok_or_else(|| {
                LoadError::malformed("unterminated node while capturing", buffer.span())
            })?;
            if event.kind.is_open() {
                depth += 1;
            } else if event.kind.is_close() {
                depth -= 1;
            }
            passthrough(&event);
            buffer.events.push(event);
        }

        buffer.started = true;
        Ok(buffer)
    }

    /// Append an event. Only allowed before the buffer is started.
    pub fn enqueue(&mut self, event: Event) -> Result<(), LoadError> {
        if self.started {
            return Err(LoadError::malformed(
                "cannot enqueue into a started replay buffer",
                Some(event.span),
            ));
        }
        self.events.push(event);
        Ok(())
    }

    /// Freeze the buffer and make it readable. Can only happen once.
    ///
    /// The enqueued events must form one balanced node.
    pub fn start(&mut self) -> Result<(), LoadError> {
        if self.started {
            return Err(LoadError::malformed("replay buffer already started", self.span()));
        }
        check_balanced(&self.events)?;
        self.started = true;
        self.position = 0;
        Ok(())
    }

    /// Whether [`start`](Self::start) has run.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Rewind to the first event.
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Move to the next event; `false` once the stream is exhausted.
    pub fn advance(&mut self) -> bool {
        if self.started && self.position < self.events.len() {
            self.position += 1;
            true
        } else {
            false
        }
    }

    /// Event the last [`advance`](Self::advance) moved onto.
    pub fn current(&self) -> Option<&Event> {
        if !self.started {
            return None;
        }
        self.position
            .checked_sub(1)
            .and_then(|index| self.events.get(index))
    }

    /// Independent reader over the captured events.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(if self.started { &self.events } else { &[] })
    }

    /// Captured events.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Span of the captured node.
    pub fn span(&self) -> Option<Span> {
        let first = self.events.first()?;
        let last = self.events.last()?;
        Some(first.span.to(last.span))
    }

    /// Keys of the captured mapping's top level, with their spans.
    ///
    /// Empty when the node is not a mapping.
    pub fn top_level_keys(&self) -> Vec<(String, Span)> {
        let mut keys = Vec::new();
        let mut collector = KeyCollector::default();
        for event in &self.events {
            if let Some(key) = collector.observe(event) {
                keys.push(key);
            }
        }
        keys
    }

    /// Scalar value stored under a top-level key, if any.
    pub fn top_level_scalar(&self, key: &str) -> Option<(String, Span)> {
        let mut collector = KeyCollector::default();
        let mut matched = false;
        for event in &self.events {
            if matched && collector.depth == 1 {
                return event
                    .as_scalar()
                    .map(|value| (value.to_string(), event.span));
            }
            matched = collector
                .observe(event)
                .is_some_and(|(found, _)| found == key);
        }
        None
    }
}

impl EventSource for ReplayBuffer {
    fn peek(&self) -> Option<&Event> {
        if !self.started {
            return None;
        }
        self.events.get(self.position)
    }

    fn next_event(&mut self) -> Option<Event> {
        if self.advance() {
            self.current().cloned()
        } else {
            None
        }
    }

    fn last_span(&self) -> Option<Span> {
        self.current().map(|event| event.span)
    }
}

/// Incremental tracker of top-level mapping keys, usable as a passthrough.
#[derive(Debug, Default)]
pub struct KeyCollector {
    depth: usize,
    expect_key: bool,
    mapping: bool,
}

impl KeyCollector {
    /// Feed one event; returns the key when the event is a top-level key.
    pub fn observe(&mut self, event: &Event) -> Option<(String, Span)> {
        let mut key = None;
        if self.depth == 1 && self.mapping && self.expect_key {
            key = event.as_scalar().map(|value| (value.to_string(), event.span));
        }

        if event.kind.is_open() {
            if self.depth == 0 {
                self.mapping = matches!(event.kind, EventKind::MappingStart { .. });
                self.expect_key = true;
            } else if self.depth == 1 {
                self.expect_key = !self.expect_key;
            }
            self.depth += 1;
        } else if event.kind.is_close() {
            self.depth = self.depth.saturating_sub(1);
        } else if self.depth == 1 {
            self.expect_key = !self.expect_key;
        }
        key
    }
}

fn check_balanced(events: &[Event]) -> Result<(), LoadError> {
    let mut depth = 0usize;
    for (index, event) in events.iter().enumerate() {
        if event.kind.is_open() {
            depth += 1;
        } else if event.kind.is_close() {
            depth = depth.checked_sub(1).ok_or_else(|| {
                LoadError::malformed(
                    format!("unbalanced {}", event.kind.describe()),
                    Some(event.span),
                )
            })?;
        }
        if depth == 0 && index + 1 != events.len() {
            return Err(LoadError::malformed(
                "replay buffer holds more than one node",
                events.get(index + 1).map(|event| event.span),
            ));
        }
    }
    if depth != 0 || events.is_empty() {
        return Err(LoadError::malformed(
            "replay buffer does not hold a complete node",
            events.last().map(|event| event.span),
        ));
    }
    Ok(())
}
