use std::fmt;

use super::{Materialize, Materializer};
use crate::{
    document::{EventKind, EventSource},
    error::LoadError,
};

/// Untyped document tree, for open-ended configuration data.
///
/// Plain scalars are typed the YAML 1.2 core way (null, booleans, integers,
/// floats); quoted scalars always stay strings.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `~`, `null` or an empty plain scalar.
    Null,
    /// `true` / `false`.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Float scalar.
    Float(f64),
    /// Any other scalar.
    String(String),
    /// A sequence.
    Sequence(Vec<Value>),
    /// A mapping, in document order.
    Mapping(Vec<(String, Value)>),
}

impl Value {
    /// Entry of a mapping.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Mapping(entries) => entries
                .iter()
                .find(|(candidate, _)| candidate == key)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// String content of a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    /// Integer content of an integer scalar.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    fn from_plain(text: String) -> Value {
        match text.as_str() {
            "" | "~" | "null" | "Null" | "NULL" => return Value::Null,
            "true" | "True" | "TRUE" => return Value::Bool(true),
            "false" | "False" | "FALSE" => return Value::Bool(false),
            _ => {}
        }
        if let Ok(int) = text.parse::<i64>() {
            return Value::Int(int);
        }
        if text.contains(|c: char| c.is_ascii_digit()) {
            if let Ok(float) = text.parse::<f64>() {
                return Value::Float(float);
            }
        }
        Value::String(text)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::String(value) => write!(f, "{value:?}"),
            Value::Sequence(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Mapping(entries) => {
                write!(f, "{{")?;
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Materialize for Value {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        enum Shape {
            Mapping,
            Sequence,
            Scalar,
        }

        let shape = match events.peek().map(|event| &event.kind) {
            Some(EventKind::MappingStart { .. }) => Shape::Mapping,
            Some(EventKind::SequenceStart { .. }) => Shape::Sequence,
            _ => Shape::Scalar,
        };

        match shape {
            Shape::Mapping => {
                let mut entries = Vec::new();
                cx.read_entries(events, |cx, key, _, events| {
                    entries.push((key, cx.read(events)?));
                    Ok(())
                })?;
                Ok(Value::Mapping(entries))
            }
            Shape::Sequence => cx.read(events).map(Value::Sequence),
            Shape::Scalar => {
                let event = events.require()?;
                match event.kind {
                    EventKind::Scalar {
                        value, plain: true, ..
                    } => Ok(Value::from_plain(value)),
                    EventKind::Scalar { value, .. } => Ok(Value::String(value)),
                    _ => Err(LoadError::unexpected("node", &event)),
                }
            }
        }
    }
}
