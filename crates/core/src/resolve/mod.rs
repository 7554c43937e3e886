//! Polymorphic type resolution.
//!
//! A field typed [`Poly<T>`] may hold any candidate registered for the trait
//! object `T`. The node is captured once, then the strategies run in order:
//!
//! 1. import substitution (handled by [`Materializer::read`] for every type),
//! 2. discriminator lookup, when `T` declares a discriminator key,
//! 3. duck-typed key-set matching, when `T` declares duck candidates,
//! 4. nominal resolution by local tag, or the single registered candidate.
//!
//! Explicitly tagged nodes skip straight to nominal resolution. Whatever
//! strategy picks the candidate, it is materialized from a fresh replay of the
//! captured node.

mod discriminator;
mod duck;
pub mod import;

use std::{collections::BTreeSet, fmt, marker::PhantomData, ops::Deref};

use tracing::trace;

use crate::{
    document::{EventSource, Span},
    error::{LoadError, TypeResolutionFailure},
    materialize::{Materialize, Materializer},
    registry::{Marker, Registrar, TypeEntry},
    replay::ReplayBuffer,
    schema::{self, NamingConvention, Schema},
};

/// A trait object type that documents may instantiate polymorphically.
pub trait Polymorphic: 'static {
    /// Name used in diagnostics.
    const NAME: &'static str;

    /// Key whose value selects the concrete candidate.
    const DISCRIMINATOR: Option<&'static str> = None;

    /// Candidate names eligible for key-set matching, in priority order.
    const DUCK_CANDIDATES: &'static [&'static str] = &[];
}

/// A value whose concrete type was resolved from the document.
pub struct Poly<T: ?Sized>(pub Box<T>);

impl<T: ?Sized> Poly<T> {
    /// Unwrap the boxed value.
    pub fn into_inner(self) -> Box<T> {
        self.0
    }
}

impl<T: ?Sized> Deref for Poly<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Poly<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: ?Sized + Polymorphic> Materialize for Poly<T> {
    fn materialize(
        cx: &mut Materializer<'_>,
        events: &mut dyn EventSource,
    ) -> Result<Self, LoadError> {
        resolve::<T>(cx, events).map(Poly)
    }
}

type BuildFn<T> = Box<
    dyn Fn(&mut Materializer<'_>, &mut dyn EventSource) -> Result<Box<T>, LoadError>
        + Send
        + Sync,
>;

/// Registry payload describing one candidate of `T`.
pub struct CandidateVTable<T: ?Sized> {
    name: &'static str,
    accepted: fn(NamingConvention) -> BTreeSet<String>,
    build: BuildFn<T>,
}

impl<T: ?Sized> CandidateVTable<T> {
    /// Candidate name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Keys the candidate accepts under `convention`.
    pub fn accepted_keys(&self, convention: NamingConvention) -> BTreeSet<String> {
        (self.accepted)(convention)
    }
}

/// Marker grouping the candidates of `T`.
pub struct CandidateOf<T: ?Sized>(PhantomData<fn() -> Box<T>>);

impl<T: ?Sized + Polymorphic> Marker for CandidateOf<T> {
    const NAME: &'static str = "candidate";

    fn accepts(entry: &TypeEntry) -> Result<(), String> {
        if entry.has_payload::<CandidateVTable<T>>() {
            Ok(())
        } else {
            Err(format!("payload is not a candidate of {}", T::NAME))
        }
    }
}

impl Registrar {
    /// Register `C` as a candidate for `T`, selectable by tag or key-set.
    pub fn candidate<T, C>(&mut self, upcast: fn(C) -> Box<T>) -> &mut Self
    where
        T: ?Sized + Polymorphic,
        C: Materialize + Schema + 'static,
    {
        let entry = TypeEntry::new::<C>(C::NAME, vtable::<T, C>(upcast));
        self.tag::<CandidateOf<T>>(entry)
    }

    /// Register `C` as the candidate for `T` whose discriminator equals `value`.
    pub fn discriminated<T, C>(&mut self, value: &str, upcast: fn(C) -> Box<T>) -> &mut Self
    where
        T: ?Sized + Polymorphic,
        C: Materialize + Schema + 'static,
    {
        let entry = TypeEntry::new::<C>(C::NAME, vtable::<T, C>(upcast)).with_discriminator(value);
        self.tag::<CandidateOf<T>>(entry)
    }
}

fn vtable<T, C>(upcast: fn(C) -> Box<T>) -> CandidateVTable<T>
where
    T: ?Sized + Polymorphic,
    C: Materialize + Schema + 'static,
{
    let build: BuildFn<T> = Box::new(move |cx, events| cx.read::<C>(events).map(upcast));
    CandidateVTable {
        name: C::NAME,
        accepted: schema::accepted_keys::<C>,
        build,
    }
}

/// A registered candidate paired with its vtable.
pub(crate) struct Candidate<'r, T: ?Sized> {
    pub(crate) entry: &'r TypeEntry,
    pub(crate) vtable: &'r CandidateVTable<T>,
}

/// Resolve and materialize the next node as one of `T`'s candidates.
pub fn resolve<T: ?Sized + Polymorphic>(
    cx: &mut Materializer<'_>,
    events: &mut dyn EventSource,
) -> Result<Box<T>, LoadError> {
    let registry = cx.registry();
    let candidates: Vec<Candidate<'_, T>> = registry
        .types_with::<CandidateOf<T>>()?
        .iter()
        .filter_map(|entry| {
            entry.payload::<CandidateVTable<T>>().map(|vtable| Candidate {
                entry: entry.as_ref(),
                vtable,
            })
        })
        .collect();

    let buffer = ReplayBuffer::capture(events, |_| {})?;
    let span = buffer.span().unwrap_or_default();
    let tagged = buffer
        .events()
        .first()
        .and_then(|event| event.kind.tag())
        .and_then(|tag| tag.local_name())
        .map(str::to_string);

    if tagged.is_none() {
        if let Some(key) = T::DISCRIMINATOR {
            if let Some(chosen) = discriminator::select::<T>(&candidates, &buffer, key, span)? {
                trace!(expected = T::NAME, chosen = chosen.vtable.name, "resolved by discriminator");
                cx.reserve_next_key(key);
                let built = (chosen.vtable.build)(cx, &mut buffer.cursor());
                cx.clear_pending();
                return built;
            }
        }
        if !T::DUCK_CANDIDATES.is_empty() {
            let chosen = duck::select::<T>(&candidates, &buffer, cx.convention(), span)?;
            trace!(expected = T::NAME, chosen = chosen.vtable.name, "resolved by key set");
            return (chosen.vtable.build)(cx, &mut buffer.cursor());
        }
    }

    let chosen = nominal::<T>(&candidates, tagged.as_deref(), span)?;
    (chosen.vtable.build)(cx, &mut buffer.cursor())
}

fn nominal<'c, 'r, T: ?Sized + Polymorphic>(
    candidates: &'c [Candidate<'r, T>],
    tag: Option<&str>,
    span: Span,
) -> Result<&'c Candidate<'r, T>, TypeResolutionFailure> {
    let names = || {
        candidates
            .iter()
            .map(|candidate| candidate.vtable.name.to_string())
            .collect::<Vec<_>>()
    };
    match tag {
        Some(tag) => candidates
            .iter()
            .find(|candidate| candidate.vtable.name == tag)
            .ok_or_else(|| TypeResolutionFailure::UnknownTag {
                expected: T::NAME,
                tag: format!("!{tag}"),
                candidates: names(),
                span,
            }),
        None => match candidates {
            [single] => Ok(single),
            _ => Err(TypeResolutionFailure::Ambiguous {
                expected: T::NAME,
                candidates: names(),
                span,
            }),
        },
    }
}
