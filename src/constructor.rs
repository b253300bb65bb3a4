use std::{
    any::{type_name, TypeId},
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

use tracing::debug;

use crate::{
    any::{downcast, erase, Erased, TypeInfo},
    dependency::Dependency,
    errors::{ConfigurationErrorKind, InstantiateErrorKind},
    plan::{ClassPlan, Injectable, PlanCache, Supertype},
};

type SupertypesFn = fn(&PlanCache) -> Option<Arc<[Supertype]>>;

/// Explicit constructor argument
#[derive(Clone)]
pub struct Arg {
    value: Option<Erased>,
    type_info: Option<TypeInfo>,
    supertypes: Option<SupertypesFn>,
}

impl Arg {
    /// Argument also matching parameters of the supertypes `A` declares
    #[inline]
    #[must_use]
    pub fn new<A: Injectable>(value: Arc<A>) -> Self {
        Self {
            value: Some(erase(value)),
            type_info: Some(TypeInfo::of::<A>()),
            supertypes: Some(PlanCache::supertypes_of::<A>),
        }
    }

    /// Argument matching only parameters of exactly type `A`
    #[inline]
    #[must_use]
    pub fn value<A: ?Sized + Send + Sync + 'static>(value: Arc<A>) -> Self {
        Self {
            value: Some(erase(value)),
            type_info: Some(TypeInfo::of::<A>()),
            supertypes: None,
        }
    }

    /// Argument matching any non-primitive parameter, passed as absent
    #[inline]
    #[must_use]
    pub const fn null() -> Self {
        Self {
            value: None,
            type_info: None,
            supertypes: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.value.is_none()
    }

    #[inline]
    #[must_use]
    pub const fn type_info(&self) -> Option<TypeInfo> {
        self.type_info
    }

    fn supertypes(&self, plans: &PlanCache) -> Option<Arc<[Supertype]>> {
        self.supertypes.and_then(|supertypes| supertypes(plans))
    }

    /// Steps up the supertype chain from the argument's type to the parameter's.
    /// `None` if the argument can't be passed as the parameter.
    #[must_use]
    pub(crate) fn distance_to(&self, dependency: &Dependency, plans: &PlanCache) -> Option<usize> {
        let Some(type_info) = self.type_info else {
            return (!dependency.is_primitive()).then_some(0);
        };
        if type_info == dependency.type_info() {
            return Some(0);
        }
        self.supertypes(plans)?
            .iter()
            .position(|supertype| supertype.type_info == dependency.type_info())
            .map(|position| position + 1)
    }

    /// Value passed for the parameter, upcast to the parameter's type.
    /// `None` if the argument can't be passed as the parameter.
    #[must_use]
    pub(crate) fn coerce(&self, dependency: &Dependency, plans: &PlanCache) -> Option<Option<Erased>> {
        let (Some(value), Some(type_info)) = (&self.value, self.type_info) else {
            return (!dependency.is_primitive()).then_some(None);
        };
        if type_info == dependency.type_info() {
            return Some(Some(value.clone()));
        }
        self.supertypes(plans)?
            .iter()
            .find(|supertype| supertype.type_info == dependency.type_info())
            .and_then(|supertype| (supertype.upcast)(value))
            .map(Some)
    }

    /// Key of the constructor selection cache. Supertype-aware arguments match more parameters
    /// than exact ones of the same type, so the flag is part of the key.
    pub(crate) fn signature(&self) -> ArgSignature {
        ArgSignature {
            type_id: self.type_info.map(|type_info| type_info.id),
            supertypes: self.supertypes.is_some(),
        }
    }

    fn describe(&self) -> &'static str {
        self.type_info.map_or("null", |type_info| type_info.name)
    }
}

impl Debug for Arg {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Arg").field(&self.describe()).finish()
    }
}

/// Argument type, `None` for a null argument, and whether supertypes are matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ArgSignature {
    type_id: Option<TypeId>,
    supertypes: bool,
}

/// Arguments a constructor or method is called with, in parameter order
pub struct Args {
    target: TypeInfo,
    values: Vec<Option<Erased>>,
}

impl Args {
    #[inline]
    #[must_use]
    pub(crate) const fn new(target: TypeInfo, values: Vec<Option<Erased>>) -> Self {
        Self { target, values }
    }

    /// # Errors
    /// Returns an error if the argument is absent or of another type
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>, InstantiateErrorKind> {
        self.optional(index)?.ok_or(InstantiateErrorKind::MissingArgument { index })
    }

    /// # Errors
    /// Returns an error if the argument doesn't exist or is of another type
    pub fn optional<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Result<Option<Arc<T>>, InstantiateErrorKind> {
        let Some(value) = self.values.get(index) else {
            return Err(InstantiateErrorKind::MissingArgument { index });
        };
        let Some(value) = value else {
            return Ok(None);
        };
        downcast::<T>(value).map(Some).ok_or(InstantiateErrorKind::IncorrectArgument {
            index,
            expected: type_name::<T>(),
        })
    }

    /// Type the arguments are passed to
    #[inline]
    #[must_use]
    pub const fn target(&self) -> TypeInfo {
        self.target
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Where a constructor parameter gets its value from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArgumentSource {
    Explicit(usize),
    Resolved,
}

impl<T: Send + Sync + 'static> ClassPlan<T> {
    /// Index of the constructor to call with `args`
    pub(crate) fn select(&self, args: &[Arg], plans: &PlanCache) -> Result<usize, ConfigurationErrorKind> {
        if args.is_empty() {
            return self
                .default_constructor
                .ok_or(ConfigurationErrorKind::NoConstructor { target: self.type_info });
        }

        let signature: Vec<_> = args.iter().map(Arg::signature).collect();
        if let Some(index) = self.selections.lock().get(&signature) {
            debug!(constructor = %self.constructors[*index].name, "Found selected constructor in cache");
            return Ok(*index);
        }

        let index = self
            .default_constructor
            .filter(|index| self.accepts(*index, args, plans))
            .or_else(|| self.closest(args, plans))
            .ok_or_else(|| ConfigurationErrorKind::NoMatchingConstructor {
                target: self.type_info,
                arguments: args.iter().map(Arg::describe).collect(),
            })?;
        debug!(constructor = %self.constructors[index].name, "Constructor selected");

        self.selections.lock().insert(signature, index);
        Ok(index)
    }

    /// Whether the constructor takes every explicit argument at its position
    fn accepts(&self, index: usize, args: &[Arg], plans: &PlanCache) -> bool {
        let params = &self.constructors[index].params;
        args.len() <= params.len()
            && args
                .iter()
                .zip(params)
                .all(|(arg, param)| param.dependency.always_inject || arg.distance_to(&param.dependency, plans).is_some())
    }

    /// Same-arity constructor with the lowest summed supertype distance, first one on ties
    fn closest(&self, args: &[Arg], plans: &PlanCache) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (index, constructor) in self.constructors.iter().enumerate() {
            if constructor.params.len() != args.len() {
                continue;
            }

            let score = args.iter().zip(&constructor.params).try_fold(0, |score, (arg, param)| {
                arg.distance_to(&param.dependency, plans).map(|distance| score + distance)
            });
            match (score, best) {
                (Some(score), Some((_, best_score))) if score >= best_score => {}
                (Some(score), _) => best = Some((index, score)),
                (None, _) => {}
            }
        }
        best.map(|(index, _)| index)
    }

    /// Which parameters of the constructor come from the explicit arguments
    pub(crate) fn sources(&self, index: usize, explicit: usize) -> Arc<[ArgumentSource]> {
        self.sources
            .lock()
            .entry((index, explicit))
            .or_insert_with(|| {
                self.constructors[index]
                    .params
                    .iter()
                    .enumerate()
                    .map(|(position, param)| {
                        if position < explicit && !param.dependency.always_inject {
                            ArgumentSource::Explicit(position)
                        } else {
                            ArgumentSource::Resolved
                        }
                    })
                    .collect()
            })
            .clone()
    }
}
