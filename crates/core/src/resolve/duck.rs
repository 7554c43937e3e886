use std::collections::BTreeSet;

use tracing::{debug, trace};

use super::{Candidate, Polymorphic};
use crate::{
    document::Span, error::TypeResolutionFailure, replay::ReplayBuffer, schema::NamingConvention,
};

/// Candidate whose accepted key-set best fits the node's keys.
///
/// A candidate that does not accept every observed key is disqualified. The
/// remaining ones are scored by how many observed keys they accept; the
/// highest score wins and ties go to the candidate declared first.
pub(super) fn select<'c, 'r, T: ?Sized + Polymorphic>(
    candidates: &'c [Candidate<'r, T>],
    buffer: &ReplayBuffer,
    convention: NamingConvention,
    span: Span,
) -> Result<&'c Candidate<'r, T>, TypeResolutionFailure> {
    let observed: BTreeSet<String> = buffer
        .top_level_keys()
        .into_iter()
        .map(|(key, _)| key)
        .collect();

    let mut best: Option<(usize, &'c Candidate<'r, T>)> = None;
    for name in T::DUCK_CANDIDATES {
        let Some(candidate) = candidates.iter().find(|candidate| candidate.vtable.name == *name)
        else {
            debug!(expected = T::NAME, candidate = name, "declared candidate is not registered");
            continue;
        };

        let accepted = candidate.vtable.accepted_keys(convention);
        if !accepted.is_superset(&observed) {
            trace!(candidate = name, "disqualified by unknown keys");
            continue;
        }
        let score = accepted.intersection(&observed).count();
        trace!(candidate = name, score, "key-set candidate qualifies");
        if score > 0 && best.map_or(true, |(top, _)| score > top) {
            best = Some((score, candidate));
        }
    }

    best.map(|(_, candidate)| candidate)
        .ok_or_else(|| TypeResolutionFailure::NoDuckMatch {
            expected: T::NAME,
            candidates: T::DUCK_CANDIDATES.iter().map(|name| name.to_string()).collect(),
            observed: observed.into_iter().collect(),
            span,
        })
}

#[cfg(test)]
mod tests {
    use crate::{
        document::Document,
        error::{LoadError, TypeResolutionFailure},
        registry::{module, TypeRegistry},
        resolve::Poly,
        testing::{
            fixtures::{self, Sensor},
            Harness,
        },
    };

    fn harness() -> Harness {
        let registry = TypeRegistry::new();
        registry.add_module(module("sensors", fixtures::register_sensors));
        Harness::new(registry)
    }

    #[test]
    fn exact_key_set_prefers_first_declared_fit() -> anyhow::Result<()> {
        let mut harness = harness();
        for _ in 0..5 {
            let document = Document::parse("sensor.yaml", "a: 1\nb: 2\n")?;
            let sensor: Poly<dyn Sensor> = harness.read(&document)?;
            assert_eq!(sensor.kind(), "c1");
        }
        Ok(())
    }

    #[test]
    fn larger_key_set_selects_wider_candidate() -> anyhow::Result<()> {
        let document = Document::parse("sensor.yaml", "a: 1\nb: 2\nc: 3\n")?;
        let sensor: Poly<dyn Sensor> = harness().read(&document)?;
        assert_eq!(sensor.kind(), "c2");
        Ok(())
    }

    #[test]
    fn unknown_key_disqualifies_every_candidate() -> anyhow::Result<()> {
        let document = Document::parse("sensor.yaml", "a: 1\nb: 2\nd: 4\n")?;
        let err = harness().read::<Poly<dyn Sensor>>(&document).unwrap_err();
        match err.root_cause() {
            LoadError::TypeResolution(TypeResolutionFailure::NoDuckMatch {
                candidates,
                observed,
                ..
            }) => {
                assert_eq!(candidates, &vec!["c1".to_string(), "c2".to_string()]);
                assert_eq!(observed, &vec!["a".to_string(), "b".to_string(), "d".to_string()]);
            }
            other => panic!("unexpected error {other}"),
        }
        Ok(())
    }

    #[test]
    fn empty_mapping_has_no_match() -> anyhow::Result<()> {
        let document = Document::parse("sensor.yaml", "{}")?;
        assert!(harness().read::<Poly<dyn Sensor>>(&document).is_err());
        Ok(())
    }
}
