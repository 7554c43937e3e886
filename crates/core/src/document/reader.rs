use std::collections::HashMap;
use std::ops::Range;

use yaml_rust2::parser::{Event as YamlEvent, MarkedEventReceiver, Parser, Tag as YamlTag};
use yaml_rust2::scanner::{Marker, TScalarStyle};

use super::{Event, EventKind, Mark, Span, Tag};
use crate::error::LoadError;

const MERGE_KEY: &str = "<<";

/// Upper bound on events copied in by alias expansion, per document.
const MAX_ALIAS_EVENTS: usize = 100_000;

/// Parse `source` into the balanced events of its single root node.
///
/// Returns the events together with the mark just past the end of the text.
pub(crate) fn read_events(source: &str) -> Result<(Vec<Event>, Mark), LoadError> {
    let lines = LineIndex::new(source);

    let mut collector = Collector::default();
    let mut parser = Parser::new(source.chars());
    parser
        .load(&mut collector, true)
        .map_err(|err| LoadError::Syntax {
            message: err.to_string(),
            span: Span::point(lines.mark(err.marker().index())),
        })?;

    let mut builder = Builder::new(&lines);
    for (position, (event, marker)) in collector.events.iter().enumerate() {
        let next = collector
            .events
            .get(position + 1)
            .map(|(_, marker)| marker.index());
        builder.push(event, marker, next)?;
    }
    let events = builder.finish()?;
    let events = resolve_merges(&events)?;
    Ok((events, lines.end()))
}

#[derive(Default)]
struct Collector {
    events: Vec<(YamlEvent, Marker)>,
}

impl MarkedEventReceiver for Collector {
    fn on_event(&mut self, event: YamlEvent, marker: Marker) {
        self.events.push((event, marker));
    }
}

/// Character-offset to line/column translation.
struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        let mut len = 0;
        for (index, ch) in source.chars().enumerate() {
            if ch == '\n' {
                starts.push(index + 1);
            }
            len = index + 1;
        }
        Self { starts, len }
    }

    fn mark(&self, index: usize) -> Mark {
        let index = index.min(self.len);
        let line = self.starts.partition_point(|start| *start <= index);
        let line_start = self.starts[line.saturating_sub(1)];
        Mark {
            index,
            line: line.max(1),
            column: index - line_start + 1,
        }
    }

    fn end(&self) -> Mark {
        self.mark(self.len)
    }
}

/// Converts parser events, expanding aliases as they are met.
struct Builder<'l> {
    lines: &'l LineIndex,
    out: Vec<Event>,
    anchors: HashMap<usize, Range<usize>>,
    open: Vec<(usize, usize)>,
    roots: usize,
    expanded: usize,
}

impl<'l> Builder<'l> {
    fn new(lines: &'l LineIndex) -> Self {
        Self {
            lines,
            out: Vec::new(),
            anchors: HashMap::new(),
            open: Vec::new(),
            roots: 0,
            expanded: 0,
        }
    }

    fn push(
        &mut self,
        event: &YamlEvent,
        marker: &Marker,
        next: Option<usize>,
    ) -> Result<(), LoadError> {
        let mark = self.lines.mark(marker.index());
        match event {
            YamlEvent::MappingStart(anchor, tag) => {
                self.open_node(*anchor, EventKind::MappingStart { tag: convert_tag(tag) }, mark);
            }
            YamlEvent::SequenceStart(anchor, tag) => {
                self.open_node(*anchor, EventKind::SequenceStart { tag: convert_tag(tag) }, mark);
            }
            YamlEvent::MappingEnd => self.close_node(EventKind::MappingEnd, mark)?,
            YamlEvent::SequenceEnd => self.close_node(EventKind::SequenceEnd, mark)?,
            YamlEvent::Scalar(value, style, anchor, tag) => {
                self.note_root();
                let quoted = matches!(
                    style,
                    TScalarStyle::SingleQuoted | TScalarStyle::DoubleQuoted
                );
                let estimate = marker.index() + value.chars().count() + if quoted { 2 } else { 0 };
                let end = next.map_or(estimate, |next| estimate.min(next));
                let index = self.out.len();
                self.out.push(Event::new(
                    EventKind::Scalar {
                        value: value.clone(),
                        tag: convert_tag(tag),
                        plain: matches!(style, TScalarStyle::Plain),
                    },
                    Span::new(mark, self.lines.mark(end)),
                ));
                if *anchor > 0 {
                    self.anchors.insert(*anchor, index..index + 1);
                }
            }
            YamlEvent::Alias(anchor) => {
                self.note_root();
                let range = self.anchors.get(anchor).cloned().ok_or_else(|| {
                    LoadError::malformed(
                        format!("alias refers to unknown anchor #{anchor}"),
                        Some(Span::point(mark)),
                    )
                })?;
                let span = Span::point(mark);
                self.expanded += range.len();
                if self.expanded > MAX_ALIAS_EVENTS {
                    return Err(LoadError::malformed(
                        format!("aliases expand to more than {MAX_ALIAS_EVENTS} events"),
                        Some(span),
                    ));
                }
                let copied: Vec<Event> = self.out[range]
                    .iter()
                    .map(|event| Event::new(event.kind.clone(), span))
                    .collect();
                self.out.extend(copied);
            }
            _ => {}
        }
        Ok(())
    }

    fn note_root(&mut self) {
        if self.open.is_empty() {
            self.roots += 1;
        }
    }

    fn open_node(&mut self, anchor: usize, kind: EventKind, mark: Mark) {
        self.note_root();
        self.open.push((anchor, self.out.len()));
        self.out.push(Event::new(kind, Span::point(mark)));
    }

    fn close_node(&mut self, kind: EventKind, mark: Mark) -> Result<(), LoadError> {
        let (anchor, start) = self.open.pop().ok_or_else(|| {
            LoadError::malformed(
                format!("unbalanced {}", kind.describe()),
                Some(Span::point(mark)),
            )
        })?;
        let opened = self.out[start].span.start;
        self.out[start].span = Span::new(opened, mark);
        self.out.push(Event::new(kind, Span::point(mark)));
        if anchor > 0 {
            self.anchors.insert(anchor, start..self.out.len());
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<Event>, LoadError> {
        if !self.open.is_empty() {
            return Err(LoadError::malformed("unterminated node at end of document", None));
        }
        match self.roots {
            0 => {
                let origin = Span::point(self.lines.mark(0));
                Ok(vec![
                    Event::new(EventKind::MappingStart { tag: None }, origin),
                    Event::new(EventKind::MappingEnd, origin),
                ])
            }
            1 => Ok(self.out),
            count => Err(LoadError::malformed(
                format!("expected a single document, found {count}"),
                self.out.first().map(|event| event.span),
            )),
        }
    }
}

fn convert_tag(tag: &Option<YamlTag>) -> Option<Tag> {
    tag.as_ref().map(|tag| Tag {
        handle: tag.handle.clone(),
        suffix: tag.suffix.clone(),
    })
}

/// Index just past the node starting at `start`.
fn node_end(events: &[Event], start: usize) -> Result<usize, LoadError> {
    let first = events
        .get(start)
        .ok_or_else(|| LoadError::malformed("expected a node, found end of stream", None))?;
    if first.kind.is_close() {
        return Err(LoadError::malformed(
            format!("expected a node, found {}", first.kind.describe()),
            Some(first.span),
        ));
    }
    let mut depth = 0usize;
    for (offset, event) in events[start..].iter().enumerate() {
        if event.kind.is_open() {
            depth += 1;
        } else if event.kind.is_close() {
            depth -= 1;
        }
        if depth == 0 {
            return Ok(start + offset + 1);
        }
    }
    Err(LoadError::malformed("unterminated node", Some(first.span)))
}

struct Pair {
    key: Option<String>,
    events: Vec<Event>,
}

enum Entry {
    Explicit(Pair),
    Merged(Vec<Pair>),
}

fn resolve_merges(events: &[Event]) -> Result<Vec<Event>, LoadError> {
    let mut out = Vec::with_capacity(events.len());
    let end = emit_node(events, 0, &mut out)?;
    if end != events.len() {
        return Err(LoadError::malformed(
            "trailing events after the root node",
            events.get(end).map(|event| event.span),
        ));
    }
    Ok(out)
}

fn emit_node(events: &[Event], at: usize, out: &mut Vec<Event>) -> Result<usize, LoadError> {
    let first = events
        .get(at)
        .ok_or_else(|| LoadError::malformed("expected a node, found end of stream", None))?;
    match &first.kind {
        EventKind::MappingStart { .. } => emit_mapping(events, at, out),
        EventKind::SequenceStart { .. } => {
            out.push(first.clone());
            let mut index = at + 1;
            loop {
                let event = events.get(index).ok_or_else(|| {
                    LoadError::malformed("unterminated sequence", Some(first.span))
                })?;
                if matches!(event.kind, EventKind::SequenceEnd) {
                    out.push(event.clone());
                    return Ok(index + 1);
                }
                index = emit_node(events, index, out)?;
            }
        }
        EventKind::Scalar { .. } => {
            out.push(first.clone());
            Ok(at + 1)
        }
        EventKind::MappingEnd | EventKind::SequenceEnd => Err(LoadError::malformed(
            format!("unexpected {}", first.kind.describe()),
            Some(first.span),
        )),
    }
}

fn emit_mapping(events: &[Event], at: usize, out: &mut Vec<Event>) -> Result<usize, LoadError> {
    let start = &events[at];
    let mut entries = Vec::new();
    let mut index = at + 1;
    let close = loop {
        let event = events
            .get(index)
            .ok_or_else(|| LoadError::malformed("unterminated mapping", Some(start.span)))?;
        if matches!(event.kind, EventKind::MappingEnd) {
            break event;
        }

        let merge = matches!(
            &event.kind,
            EventKind::Scalar { value, plain: true, tag: None } if value == MERGE_KEY
        );
        let key = event.as_scalar().map(str::to_string);

        let mut pair = Vec::new();
        let value_start = emit_node(events, index, &mut pair)?;
        let key_len = pair.len();
        index = emit_node(events, value_start, &mut pair)?;

        if merge {
            entries.push(Entry::Merged(merge_sources(&pair[key_len..])?));
        } else {
            entries.push(Entry::Explicit(Pair { key, events: pair }));
        }
    };

    let mut present: Vec<String> = entries
        .iter()
        .filter_map(|entry| match entry {
            Entry::Explicit(pair) => pair.key.clone(),
            Entry::Merged(_) => None,
        })
        .collect();

    out.push(start.clone());
    for entry in entries {
        match entry {
            Entry::Explicit(pair) => out.extend(pair.events),
            Entry::Merged(pairs) => {
                for pair in pairs {
                    if let Some(key) = &pair.key {
                        if present.contains(key) {
                            continue;
                        }
                        present.push(key.clone());
                    }
                    out.extend(pair.events);
                }
            }
        }
    }
    out.push(close.clone());
    Ok(index + 1)
}

/// Key/value pairs contributed by the value of a `<<` key.
fn merge_sources(value: &[Event]) -> Result<Vec<Pair>, LoadError> {
    let first = value
        .first()
        .ok_or_else(|| LoadError::malformed("empty merge value", None))?;
    match first.kind {
        EventKind::MappingStart { .. } => mapping_pairs(value),
        EventKind::SequenceStart { .. } => {
            let mut pairs = Vec::new();
            let mut index = 1;
            while index < value.len() - 1 {
                let end = node_end(value, index)?;
                pairs.extend(mapping_pairs(&value[index..end])?);
                index = end;
            }
            Ok(pairs)
        }
        _ => Err(LoadError::malformed(
            "merge key `<<` expects a mapping or a sequence of mappings",
            Some(first.span),
        )),
    }
}

fn mapping_pairs(mapping: &[Event]) -> Result<Vec<Pair>, LoadError> {
    let first = &mapping[0];
    if !matches!(first.kind, EventKind::MappingStart { .. }) {
        return Err(LoadError::malformed(
            "merge key `<<` expects a mapping or a sequence of mappings",
            Some(first.span),
        ));
    }
    let mut pairs = Vec::new();
    let mut index = 1;
    while index < mapping.len() - 1 {
        let key_end = node_end(mapping, index)?;
        let value_end = node_end(mapping, key_end)?;
        pairs.push(Pair {
            key: mapping[index].as_scalar().map(str::to_string),
            events: mapping[index..value_end].to_vec(),
        });
        index = value_end;
    }
    Ok(pairs)
}
