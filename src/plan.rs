mod builder;

pub use builder::{ClassBuilder, Constructor, Field, Method, Param};

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt::{self, Display, Formatter},
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error};

use crate::{
    any::{Erased, TypeInfo},
    constructor::{ArgSignature, ArgumentSource},
    context::ContextView,
    errors::{ConfigurationErrorKind, InstantiateErrorKind, ProvisionErrorKind, ResolveErrorKind},
    finalizer::Teardown,
    provider::Provided,
    resolution::Resolution,
};

/// Type the injector knows how to construct and inject.
///
/// # Examples
/// ```rust
/// use tincture::{ClassBuilder, Constructor, Injectable};
///
/// struct Clock;
///
/// impl Injectable for Clock {
///     fn describe(class: &mut ClassBuilder<Self>) {
///         class.constructor(Constructor::new("new", |_| Ok(Clock)));
///     }
/// }
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    fn describe(class: &mut ClassBuilder<Self>);
}

pub type ImplicitConstruction = fn(&mut Resolution<'_>, &dyn ContextView) -> Result<Option<Provided>, ResolveErrorKind>;

/// Type that can be requested from an injector
pub trait Resolvable: Send + Sync + 'static {
    /// How to construct the type when nothing is bound for it
    #[inline]
    #[must_use]
    fn implicit() -> Option<ImplicitConstruction> {
        None
    }
}

impl<T: Injectable> Resolvable for T {
    #[inline]
    fn implicit() -> Option<ImplicitConstruction> {
        Some(construct_implicitly::<T>)
    }
}

resolvable!(bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, str, String);

fn construct_implicitly<T: Injectable>(
    resolution: &mut Resolution<'_>,
    _context: &dyn ContextView,
) -> Result<Option<Provided>, ResolveErrorKind> {
    let constructed = resolution.construct_class::<T>(&[], false)?;
    let provided = Provided::new(constructed.instance);
    Ok(Some(match constructed.teardown {
        Some(teardown) => provided.with_teardown(teardown),
        None => provided,
    }))
}

/// Lifecycle phase a hook runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    PostConstruct,
    PostInject,
    PreDestroy,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::PostConstruct => "post-construct",
            Phase::PostInject => "post-inject",
            Phase::PreDestroy => "pre-destroy",
        })
    }
}

pub(crate) type HookFn<T> = dyn Fn(&T) -> Result<(), InstantiateErrorKind> + Send + Sync;

pub(crate) struct Hook<T> {
    pub(crate) name: String,
    pub(crate) priority: i32,
    pub(crate) declaring: TypeInfo,
    pub(crate) run: Arc<HookFn<T>>,
}

impl<T> Clone for Hook<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            priority: self.priority,
            declaring: self.declaring,
            run: self.run.clone(),
        }
    }
}

impl<T> Hook<T> {
    pub(crate) fn call(&self, phase: Phase, this: &T) -> Result<(), ResolveErrorKind> {
        debug!(hook = %self.name, %phase, "Calling hook");
        (self.run)(this).map_err(|err| {
            let err = ResolveErrorKind::from_instantiate(err, |source| ProvisionErrorKind::Hook {
                target: self.declaring,
                hook: self.name.clone(),
                phase,
                source,
            });
            error!("{}", err);
            err
        })
    }
}

/// Type a class can be injected as, nearest first
#[derive(Clone, Copy)]
pub(crate) struct Supertype {
    pub(crate) type_info: TypeInfo,
    pub(crate) upcast: fn(&Erased) -> Option<Erased>,
}

/// Everything the injector needs to construct and inject a class, built once per type
pub(crate) struct ClassPlan<T> {
    pub(crate) type_info: TypeInfo,
    pub(crate) constructors: Vec<Constructor<T>>,
    pub(crate) default_constructor: Option<usize>,
    pub(crate) fields: Vec<Field<T>>,
    pub(crate) methods: Vec<Method<T>>,
    post_construct: Vec<Hook<T>>,
    post_inject: Vec<Hook<T>>,
    pre_destroy: Vec<Hook<T>>,
    pub(crate) supertypes: Arc<[Supertype]>,
    /// Constructor chosen for explicit argument signatures
    pub(crate) selections: Mutex<HashMap<Vec<ArgSignature>, usize>>,
    /// Argument sources per constructor and explicit argument count
    pub(crate) sources: Mutex<HashMap<(usize, usize), Arc<[ArgumentSource]>>>,
}

impl<T: Injectable> ClassPlan<T> {
    fn build() -> Result<Self, ConfigurationErrorKind> {
        let mut class = ClassBuilder::<T>::new();
        T::describe(&mut class);
        class.validate()?;

        let ClassBuilder {
            type_info,
            constructors,
            fields,
            methods,
            mut post_construct,
            mut post_inject,
            mut pre_destroy,
            supertypes,
        } = class;

        let default_constructor = constructors
            .iter()
            .position(|constructor| constructor.injectable)
            .or_else(|| constructors.iter().position(|constructor| constructor.params.is_empty()))
            .or_else(|| (constructors.len() == 1).then_some(0));

        for hooks in [&mut post_construct, &mut post_inject, &mut pre_destroy] {
            hooks.sort_by_key(|hook| hook.priority);
        }

        Ok(Self {
            type_info,
            constructors,
            default_constructor,
            fields,
            methods,
            post_construct,
            post_inject,
            pre_destroy,
            supertypes: supertypes.into(),
            selections: Mutex::new(HashMap::new()),
            sources: Mutex::new(HashMap::new()),
        })
    }
}

impl<T: Send + Sync + 'static> ClassPlan<T> {
    #[must_use]
    pub(crate) fn hooks(&self, phase: Phase) -> &[Hook<T>] {
        match phase {
            Phase::PostConstruct => &self.post_construct,
            Phase::PostInject => &self.post_inject,
            Phase::PreDestroy => &self.pre_destroy,
        }
    }

    /// Runs hooks of the phase in priority order, stopping at the first failure
    pub(crate) fn run_hooks(&self, phase: Phase, this: &T) -> Result<(), ResolveErrorKind> {
        for hook in self.hooks(phase) {
            hook.call(phase, this)?;
        }
        Ok(())
    }

    /// Pre-destroy work for an instance, if the class declares any
    #[must_use]
    pub(crate) fn teardown(self: &Arc<Self>, instance: &Arc<T>) -> Option<Teardown> {
        if self.pre_destroy.is_empty() {
            return None;
        }

        let plan = self.clone();
        let instance = instance.clone();
        Some(Teardown::new(self.type_info, move || plan.run_hooks(Phase::PreDestroy, &instance)))
    }

    #[must_use]
    pub(crate) fn has_lifecycle(&self) -> bool {
        !(self.post_construct.is_empty() && self.post_inject.is_empty() && self.pre_destroy.is_empty())
    }
}

/// Plans of every class the injector has constructed or injected
#[derive(Default)]
pub(crate) struct PlanCache {
    plans: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl PlanCache {
    /// Plan of `T`, built on first use. Plans failing validation aren't cached.
    pub(crate) fn get<T: Injectable>(&self) -> Result<Arc<ClassPlan<T>>, ConfigurationErrorKind> {
        let type_id = TypeId::of::<T>();
        if let Some(plan) = self.plans.read().get(&type_id).cloned() {
            if let Ok(plan) = plan.downcast::<ClassPlan<T>>() {
                return Ok(plan);
            }
        }

        let plan = Arc::new(ClassPlan::<T>::build().map_err(|err| {
            error!("{}", err);
            err
        })?);
        debug!(class = plan.type_info.name, "Plan built");

        let cached = self
            .plans
            .write()
            .entry(type_id)
            .or_insert_with(|| plan.clone() as Arc<dyn Any + Send + Sync>)
            .clone();
        Ok(cached.downcast::<ClassPlan<T>>().unwrap_or(plan))
    }

    #[must_use]
    pub(crate) fn supertypes_of<T: Injectable>(&self) -> Option<Arc<[Supertype]>> {
        self.get::<T>().ok().map(|plan| plan.supertypes.clone())
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.plans.read().len()
    }
}
