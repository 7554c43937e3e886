//! Built-in materializers for scalars and standard containers.

use std::{
    collections::{BTreeMap, HashMap},
    str::FromStr,
};

use super::{Materialize, Materializer};
use crate::{document::EventSource, error::LoadError};

impl Materialize for String {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        cx.read_scalar(events, "string").map(|(value, _)| value)
    }
}

impl Materialize for bool {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let (value, span) = cx.read_scalar(events, "boolean")?;
        match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => Ok(true),
            "false" | "no" | "off" => Ok(false),
            _ => Err(LoadError::InvalidScalar {
                expected: "boolean",
                value,
                reason: "expected true/false, yes/no or on/off".to_string(),
                span,
            }),
        }
    }
}

fn parse_number<T>(
    cx: &mut Materializer<'_>,
    events: &mut dyn EventSource,
    expected: &'static str,
) -> Result<T, LoadError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let (value, span) = cx.read_scalar(events, expected)?;
    let cleaned = value.trim().replace('_', "");
    cleaned.parse().map_err(|err: T::Err| LoadError::InvalidScalar {
        expected,
        value,
        reason: err.to_string(),
        span,
    })
}

macro_rules! number_materializer {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Materialize for $ty {
                fn materialize(
                    cx: &mut Materializer<'_>,
                    events: &mut dyn EventSource,
                ) -> Result<Self, LoadError> {
                    parse_number(cx, events, $name)
                }
            }
        )*
    };
}

number_materializer! {
    i32 => "i32",
    i64 => "i64",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
    usize => "usize",
    f32 => "f32",
    f64 => "f64",
}

impl<T: Materialize> Materialize for Option<T> {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let null = events.peek().is_some_and(|event| event.is_null());
        if null {
            events.require()?;
            return Ok(None);
        }
        cx.read(events).map(Some)
    }
}

impl<T: Materialize> Materialize for Vec<T> {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut items = Vec::new();
        cx.read_sequence(events, |cx, events| {
            items.push(cx.read(events)?);
            Ok(())
        })?;
        Ok(items)
    }
}

impl<T: Materialize> Materialize for BTreeMap<String, T> {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut entries = BTreeMap::new();
        cx.read_entries(events, |cx, key, _, events| {
            entries.insert(key, cx.read(events)?);
            Ok(())
        })?;
        Ok(entries)
    }
}

impl<T: Materialize> Materialize for HashMap<String, T> {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        let mut entries = HashMap::new();
        cx.read_entries(events, |cx, key, _, events| {
            entries.insert(key, cx.read(events)?);
            Ok(())
        })?;
        Ok(entries)
    }
}
