//! Static key schemas for materializable types.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// How Rust member identifiers map to document keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingConvention {
    /// `max_speed`
    #[default]
    Underscored,
    /// `max-speed`
    Kebab,
    /// `maxSpeed`
    Camel,
    /// `MaxSpeed`
    Pascal,
}

impl NamingConvention {
    /// Document key for a snake_case member identifier.
    pub fn apply(self, ident: &str) -> String {
        let words: Vec<&str> = ident
            .trim_start_matches("r#")
            .split('_')
            .filter(|word| !word.is_empty())
            .collect();
        match self {
            NamingConvention::Underscored => words.join("_"),
            NamingConvention::Kebab => words.join("-"),
            NamingConvention::Camel => words
                .iter()
                .enumerate()
                .map(|(index, word)| {
                    if index == 0 {
                        word.to_string()
                    } else {
                        capitalize(word)
                    }
                })
                .collect(),
            NamingConvention::Pascal => words.iter().map(|word| capitalize(word)).collect(),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A public member of a schema, with optional extra key spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    /// Rust identifier, snake_case.
    pub ident: &'static str,
    /// Keys accepted verbatim in addition to the converted identifier.
    pub aliases: &'static [&'static str],
}

impl Member {
    /// Member without aliases.
    pub const fn new(ident: &'static str) -> Self {
        Self {
            ident,
            aliases: &[],
        }
    }

    /// Member with extra key spellings.
    pub const fn aliased(ident: &'static str, aliases: &'static [&'static str]) -> Self {
        Self { ident, aliases }
    }

    /// Whether `key` names this member under `convention`.
    pub fn matches(&self, convention: NamingConvention, key: &str) -> bool {
        convention.apply(self.ident) == key || self.aliases.contains(&key)
    }
}

/// Key schema of a type read from a mapping.
pub trait Schema {
    /// Name used in diagnostics and as the nominal tag of candidates.
    const NAME: &'static str;

    /// Public members, in declaration order.
    const MEMBERS: &'static [Member] = &[];

    /// Explicit accepted key-set overriding the one derived from members.
    const ACCEPTED_KEYS: Option<&'static [&'static str]> = None;

    /// Whether unknown keys are skipped instead of rejected.
    const OPEN: bool = false;
}

/// Keys a schema accepts under `convention`.
pub fn accepted_keys<S: Schema>(convention: NamingConvention) -> BTreeSet<String> {
    if let Some(keys) = S::ACCEPTED_KEYS {
        return keys.iter().map(|key| key.to_string()).collect();
    }
    member_keys(S::MEMBERS, convention)
}

pub(crate) fn member_keys(members: &[Member], convention: NamingConvention) -> BTreeSet<String> {
    members
        .iter()
        .flat_map(|member| {
            std::iter::once(convention.apply(member.ident))
                .chain(member.aliases.iter().map(|alias| alias.to_string()))
        })
        .collect()
}

pub(crate) fn member_for(
    members: &'static [Member],
    convention: NamingConvention,
    key: &str,
) -> Option<&'static Member> {
    members.iter().find(|member| member.matches(convention, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sensor;

    impl Schema for Sensor {
        const NAME: &'static str = "sensor";
        const MEMBERS: &'static [Member] = &[
            Member::new("max_speed"),
            Member::aliased("r#type", &["kind"]),
        ];
    }

    struct Fixed;

    impl Schema for Fixed {
        const NAME: &'static str = "fixed";
        const MEMBERS: &'static [Member] = &[Member::new("ignored")];
        const ACCEPTED_KEYS: Option<&'static [&'static str]> = Some(&["a", "b"]);
    }

    #[test]
    fn conventions_convert_identifiers() {
        assert_eq!(NamingConvention::Underscored.apply("max_speed"), "max_speed");
        assert_eq!(NamingConvention::Kebab.apply("max_speed"), "max-speed");
        assert_eq!(NamingConvention::Camel.apply("max_speed"), "maxSpeed");
        assert_eq!(NamingConvention::Pascal.apply("max_speed"), "MaxSpeed");
        assert_eq!(NamingConvention::Camel.apply("r#type"), "type");
    }

    #[test]
    fn accepted_keys_include_aliases() {
        let keys = accepted_keys::<Sensor>(NamingConvention::Camel);
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        assert_eq!(keys, vec!["kind", "maxSpeed", "type"]);
    }

    #[test]
    fn explicit_override_wins() {
        let keys = accepted_keys::<Fixed>(NamingConvention::Underscored);
        assert_eq!(keys.len(), 2);
        assert!(!keys.contains("ignored"));
    }

    #[test]
    fn member_lookup_respects_convention() {
        assert!(member_for(Sensor::MEMBERS, NamingConvention::Kebab, "max-speed").is_some());
        assert!(member_for(Sensor::MEMBERS, NamingConvention::Kebab, "max_speed").is_none());
        assert_eq!(
            member_for(Sensor::MEMBERS, NamingConvention::Kebab, "kind").map(|m| m.ident),
            Some("r#type")
        );
    }
}
