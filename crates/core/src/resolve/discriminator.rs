use tracing::trace;

use super::{Candidate, Polymorphic};
use crate::{document::Span, error::TypeResolutionFailure, replay::ReplayBuffer};

/// Candidate selected by the value stored under `key`.
///
/// `Ok(None)` when the node carries no such key, so resolution can fall
/// through to the next strategy.
pub(super) fn select<'c, 'r, T: ?Sized + Polymorphic>(
    candidates: &'c [Candidate<'r, T>],
    buffer: &ReplayBuffer,
    key: &'static str,
    span: Span,
) -> Result<Option<&'c Candidate<'r, T>>, TypeResolutionFailure> {
    let Some((value, _)) = buffer.top_level_scalar(key) else {
        trace!(expected = T::NAME, key, "no discriminator on node");
        return Ok(None);
    };

    let chosen = candidates
        .iter()
        .find(|candidate| candidate.entry.discriminator() == Some(value.as_str()));
    match chosen {
        Some(candidate) => Ok(Some(candidate)),
        None => Err(TypeResolutionFailure::UnknownDiscriminator {
            expected: T::NAME,
            key,
            value,
            registered: candidates
                .iter()
                .filter_map(|candidate| candidate.entry.discriminator())
                .map(str::to_string)
                .collect(),
            span,
        }),
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        document::{Document, EventSource},
        error::{LoadError, TypeResolutionFailure},
        materialize::{require_member, Materialize, Materializer},
        registry::{module, Registrar, TypeRegistry},
        resolve::{Poly, Polymorphic},
        schema::{Member, Schema},
        testing::{
            fixtures::{self, Shape},
            Harness,
        },
    };

    fn harness() -> Harness {
        let registry = TypeRegistry::new();
        registry.add_module(module("shapes", fixtures::register_shapes));
        registry.add_module(module("labels", fixtures::register_labels));
        Harness::new(registry)
    }

    #[test]
    fn discriminator_anywhere_in_node_selects_candidate() -> anyhow::Result<()> {
        let document = Document::parse("shape.yaml", "radius: 2\nkind: circle\n")?;
        let shape: Poly<dyn Shape> = harness().read(&document)?;
        assert!((shape.area() - 4.0 * std::f64::consts::PI).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn known_values_always_pick_their_candidate() -> anyhow::Result<()> {
        let mut harness = harness();
        for _ in 0..3 {
            let document = Document::parse("label.yaml", "type: foo\ntext: hi\n")?;
            let label: Poly<dyn fixtures::Label> = harness.read(&document)?;
            assert_eq!(label.render(), "foo:hi");
        }
        Ok(())
    }

    #[test]
    fn unknown_value_lists_registered_values() -> anyhow::Result<()> {
        let document = Document::parse("label.yaml", "text: hi\ntype: baz\n")?;
        let err = harness()
            .read::<Poly<dyn fixtures::Label>>(&document)
            .unwrap_err();
        match err.root_cause() {
            LoadError::TypeResolution(TypeResolutionFailure::UnknownDiscriminator {
                value,
                registered,
                key,
                ..
            }) => {
                assert_eq!(value, "baz");
                assert_eq!(*key, "type");
                assert_eq!(registered, &vec!["foo".to_string(), "bar".to_string()]);
            }
            other => panic!("unexpected error {other}"),
        }
        Ok(())
    }

    trait Memo: std::fmt::Debug {
        fn note(&self) -> &str;
        fn replayed(&self) -> &[String];
    }

    impl Polymorphic for dyn Memo {
        const NAME: &'static str = "memo";
        const DISCRIMINATOR: Option<&'static str> = Some("kind");
    }

    #[derive(Debug)]
    struct Noted {
        note: String,
        replayed: Vec<String>,
    }

    impl Schema for Noted {
        const NAME: &'static str = "noted";
        const MEMBERS: &'static [Member] = &[Member::new("note")];
    }

    impl Materialize for Noted {
        const EXTRA_DATA: bool = true;

        fn materialize(
            cx: &mut Materializer<'_>,
            events: &mut dyn EventSource,
        ) -> Result<Self, LoadError> {
            let mut note: Option<String> = None;
            let summary = cx.read_mapping::<Self>(events, |cx, _, events| {
                note = Some(cx.read(events)?);
                Ok(())
            })?;
            Ok(Noted {
                note: require_member(note, "note", Self::NAME, cx.convention(), summary.span)?,
                replayed: Vec::new(),
            })
        }

        fn extra_data(
            &mut self,
            cx: &mut Materializer<'_>,
            events: &mut dyn EventSource,
        ) -> Result<(), LoadError> {
            let summary = cx.read_mapping::<Self>(events, |_, _, events| {
                events.skip_node()?;
                Ok(())
            })?;
            self.replayed = summary.keys.into_iter().map(|(key, _)| key).collect();
            Ok(())
        }
    }

    impl Memo for Noted {
        fn note(&self) -> &str {
            &self.note
        }

        fn replayed(&self) -> &[String] {
            &self.replayed
        }
    }

    fn register_memos(registrar: &mut Registrar) {
        registrar.discriminated::<dyn Memo, Noted>("noted", |noted| Box::new(noted));
    }

    #[test]
    fn extra_data_pass_also_skips_the_discriminator() -> anyhow::Result<()> {
        let registry = TypeRegistry::new();
        registry.add_module(module("memos", register_memos));
        let document = Document::parse("memo.yaml", "kind: noted\nnote: hi\n")?;
        let memo: Poly<dyn Memo> = Harness::new(registry).read(&document)?;
        assert_eq!(memo.note(), "hi");
        assert_eq!(memo.replayed().to_vec(), vec!["note".to_string()]);
        Ok(())
    }
}
