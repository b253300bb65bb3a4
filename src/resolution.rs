use std::{any::TypeId, sync::Arc};

use tracing::{debug, error};

use crate::{
    any::{Erased, TypeInfo},
    binding::Binding,
    cache::Resolved,
    constructor::{Arg, ArgumentSource, Args},
    context::{ContextView, ElementKind, MemberView, Origin, Owner, MANDATORY},
    dependency::Dependency,
    errors::{
        ConfigurationErrorKind, CycleError, CycleStep, ProvisionErrorKind, ResolveErrorKind, StepSource,
    },
    finalizer::Teardown,
    injector::Injector,
    plan::{ClassPlan, ImplicitConstruction, Injectable, Phase, PlanCache, Resolvable},
    provider::Provided,
    qualifier::BindingQualifier,
    scope::ScopeState,
};

/// Instance built through its class plan, with the pre-destroy work it needs
pub(crate) struct Constructed<T> {
    pub(crate) instance: Arc<T>,
    pub(crate) teardown: Option<Teardown>,
}

/// Values already resolved for one owner, reused by later requests of the same owner
struct ResolutionScope {
    owner: Owner,
    resolved: Vec<(TypeId, BindingQualifier, Provided)>,
}

impl ResolutionScope {
    #[inline]
    const fn new(owner: Owner) -> Self {
        Self {
            owner,
            resolved: Vec::new(),
        }
    }

    fn get(&self, type_id: TypeId, qualifier: &BindingQualifier) -> Option<&Provided> {
        self.resolved
            .iter()
            .find(|(id, resolved_qualifier, _)| *id == type_id && resolved_qualifier == qualifier)
            .map(|(_, _, provided)| provided)
    }
}

type DeferredInjection = Box<dyn FnOnce(&mut Resolution<'_>) -> Result<(), ResolveErrorKind>>;

/// Member injection postponed by eager bring-up
struct Deferred {
    type_info: TypeInfo,
    inject: DeferredInjection,
    hooks: Vec<DeferredHook>,
}

struct DeferredHook {
    priority: i32,
    run: Box<dyn FnOnce() -> Result<(), ResolveErrorKind>>,
}

/// State of one engine call.
///
/// Holds the stack of owners being resolved, the requests in progress used to detect cycles,
/// and member injection postponed by eager bring-up.
/// Every public injector call creates its own, so concurrent calls never observe each other's requests.
pub struct Resolution<'a> {
    injector: &'a Injector,
    scopes: Vec<ResolutionScope>,
    in_progress: Vec<CycleStep>,
    deferred: Vec<Deferred>,
    next_construction: u64,
}

impl<'a> Resolution<'a> {
    #[must_use]
    pub(crate) fn new(injector: &'a Injector) -> Self {
        Self {
            injector,
            scopes: vec![ResolutionScope::new(Owner::Root)],
            in_progress: Vec::new(),
            deferred: Vec::new(),
            next_construction: 0,
        }
    }

    /// Injector the call was made on
    #[inline]
    #[must_use]
    pub const fn injector(&self) -> &'a Injector {
        self.injector
    }

    #[inline]
    #[must_use]
    pub(crate) fn plans(&self) -> &'a PlanCache {
        self.injector.plans()
    }

    /// # Errors
    /// Returns an error if a mandatory value can't be provided
    pub fn provide<T: ?Sized + Resolvable>(&mut self, context: &dyn ContextView) -> Result<Option<Arc<T>>, ResolveErrorKind> {
        let type_info = TypeInfo::of::<T>();
        let Some(provided) = self.provide_erased(type_info, T::implicit(), context)? else {
            return Ok(None);
        };
        match provided.get::<T>() {
            Some(value) => Ok(Some(value)),
            None => {
                let err = ResolveErrorKind::from(ProvisionErrorKind::IncorrectType {
                    expected: type_info,
                    actual: provided.type_info(),
                });
                error!("{}", err);
                Err(err)
            }
        }
    }

    /// Constructs `C` through its plan with explicit arguments
    ///
    /// # Errors
    /// Returns an error if no constructor accepts the arguments or construction fails
    pub fn construct<C: Injectable>(&mut self, args: &[Arg]) -> Result<Arc<C>, ResolveErrorKind> {
        self.construct_class::<C>(args, false).map(|constructed| constructed.instance)
    }

    pub(crate) fn provide_erased(
        &mut self,
        type_info: TypeInfo,
        implicit: Option<ImplicitConstruction>,
        context: &dyn ContextView,
    ) -> Result<Option<Provided>, ResolveErrorKind> {
        let entered = self.enter(context.owner());
        let result = self.provide_in_scope(type_info, implicit, context);
        if entered {
            self.scopes.pop();
        }
        result
    }

    fn enter(&mut self, owner: Owner) -> bool {
        if self.scopes.last().is_some_and(|scope| scope.owner == owner) {
            return false;
        }
        self.scopes.push(ResolutionScope::new(owner));
        true
    }

    fn provide_in_scope(
        &mut self,
        type_info: TypeInfo,
        implicit: Option<ImplicitConstruction>,
        context: &dyn ContextView,
    ) -> Result<Option<Provided>, ResolveErrorKind> {
        let qualifier = context.qualifier().map_err(|err| {
            error!("{}", err);
            ResolveErrorKind::from(err)
        })?;

        if let Some(provided) = self.find_resolved(type_info.id, &qualifier) {
            debug!(dependency = type_info.name, "Found in resolution scope");
            return Ok(Some(provided));
        }

        if let Some(position) = self
            .in_progress
            .iter()
            .position(|step| step.type_info == type_info && step.qualifier == qualifier)
        {
            let mut path = self.in_progress[position..].to_vec();
            path.push(CycleStep {
                type_info,
                qualifier,
                source: self.in_progress[position].source.clone(),
                origin: Origin::of(context),
            });
            let err = ResolveErrorKind::from(CycleError {
                requested: type_info,
                path,
            });
            error!("{}", err);
            return Err(err);
        }

        let injector = self.injector;
        let optional = context.is_optional();
        if optional && injector.is_known_absent(type_info.id, &qualifier) {
            debug!(dependency = type_info.name, "Known absent");
            return Ok(None);
        }

        let provided = match injector.lookup(type_info.id, &qualifier) {
            Some((owner, bindings)) => {
                let binding = Self::single(type_info, &qualifier, &bindings)?;
                debug!(key = %binding.key(), "Binding selected");
                self.provide_binding(owner, binding, context, false)?
            }
            None if optional => {
                injector.remember_absent(type_info.id, qualifier);
                debug!(dependency = type_info.name, "No binding for optional dependency");
                return Ok(None);
            }
            None => {
                let Some(implicit) = implicit.filter(|_| injector.config().implicit_construction) else {
                    let err = ResolveErrorKind::from(ConfigurationErrorKind::NoBinding { type_info, qualifier });
                    error!("{}", err);
                    return Err(err);
                };

                debug!(dependency = type_info.name, "Constructing implicitly");
                self.in_progress.push(CycleStep {
                    type_info,
                    qualifier: qualifier.clone(),
                    source: StepSource::Implicit,
                    origin: Origin::of(context),
                });
                let result = implicit(self, context);
                self.in_progress.pop();
                result?
            }
        };

        let Some(provided) = provided else {
            if optional {
                debug!(dependency = type_info.name, "Optional dependency resolved to nothing");
                return Ok(None);
            }
            let err = ResolveErrorKind::from(ProvisionErrorKind::Absent { type_info });
            error!("{}", err);
            return Err(err);
        };
        if provided.type_info() != type_info {
            let err = ResolveErrorKind::from(ProvisionErrorKind::IncorrectType {
                expected: type_info,
                actual: provided.type_info(),
            });
            error!("{}", err);
            return Err(err);
        }

        self.record(qualifier, &provided);
        Ok(Some(provided))
    }

    fn single<'b>(
        type_info: TypeInfo,
        qualifier: &BindingQualifier,
        bindings: &'b [Arc<Binding>],
    ) -> Result<&'b Arc<Binding>, ResolveErrorKind> {
        match bindings {
            [binding] => Ok(binding),
            bindings => {
                let count = bindings.len();
                let err = if bindings.iter().all(|binding| binding.is_collection()) {
                    ConfigurationErrorKind::CollectionInjectionUnsupported {
                        type_info,
                        qualifier: qualifier.clone(),
                        count,
                    }
                } else {
                    ConfigurationErrorKind::AmbiguousBinding {
                        type_info,
                        qualifier: qualifier.clone(),
                        count,
                    }
                };
                error!("{}", err);
                Err(err.into())
            }
        }
    }

    /// Calls the binding's provider with the request marked as in progress.
    /// Created values of trackable scopes are recorded on `owner` for ordered shutdown.
    pub(crate) fn provide_binding(
        &mut self,
        owner: &'a Injector,
        binding: &Binding,
        context: &dyn ContextView,
        deferred: bool,
    ) -> Result<Option<Provided>, ResolveErrorKind> {
        let key = binding.key();
        self.in_progress.push(CycleStep {
            type_info: key.type_info,
            qualifier: key.qualifier.clone(),
            source: StepSource::Binding { scope: key.scope.clone() },
            origin: Origin::of(context),
        });
        let result = if deferred {
            binding.provider().provide_deferred(self, context)
        } else {
            binding.provider().provide(self, context)
        };
        self.in_progress.pop();

        let provided = result?;
        if let Some(provided) = &provided {
            if provided.is_created() && owner.scopes().is_trackable(&key.scope) {
                owner.track(Resolved {
                    key: key.clone(),
                    teardown: provided.teardown().cloned(),
                });
                debug!(%key, "Tracked for shutdown");
            }
        }
        Ok(provided)
    }

    fn find_resolved(&mut self, type_id: TypeId, qualifier: &BindingQualifier) -> Option<Provided> {
        if let Some(provided) = self.scopes.iter().rev().find_map(|scope| scope.get(type_id, qualifier)) {
            return Some(provided.clone());
        }

        if type_id == TypeId::of::<Injector>() && qualifier.is_default() {
            let provided = Provided::new(Arc::new(self.injector.clone())).cached();
            self.scopes[0].resolved.push((type_id, BindingQualifier::None, provided.clone()));
            return Some(provided);
        }
        None
    }

    /// Records the value under the requested and the concrete type in the innermost scope
    fn record(&mut self, qualifier: BindingQualifier, provided: &Provided) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };

        let reused = provided.cached();
        if provided.concrete != provided.type_info {
            let concrete = Provided {
                value: provided.concrete_value.clone(),
                type_info: provided.concrete,
                teardown: None,
                ..reused.clone()
            };
            scope.resolved.push((provided.concrete.id, qualifier.clone(), concrete));
        }
        scope.resolved.push((provided.type_info.id, qualifier, Provided { teardown: None, ..reused }));
    }

    fn resolve(&mut self, dependency: &Dependency, context: &MemberView<'_>) -> Result<Option<Erased>, ResolveErrorKind> {
        self.provide_erased(dependency.type_info, dependency.implicit, context)
            .map(|provided| provided.map(|provided| provided.value))
    }

    pub(crate) fn construct_class<C: Injectable>(&mut self, args: &[Arg], defer: bool) -> Result<Constructed<C>, ResolveErrorKind> {
        let plan = self.plans().get::<C>()?;

        let owner = Owner::Construction(self.next_construction);
        self.next_construction += 1;

        self.scopes.push(ResolutionScope::new(owner));
        let result = self.construct_in_scope(&plan, owner, args, defer);
        self.scopes.pop();

        let instance = result?;
        Ok(Constructed {
            teardown: plan.teardown(&instance),
            instance,
        })
    }

    fn construct_in_scope<C: Injectable>(
        &mut self,
        plan: &Arc<ClassPlan<C>>,
        owner: Owner,
        args: &[Arg],
        defer: bool,
    ) -> Result<Arc<C>, ResolveErrorKind> {
        let plans = self.plans();
        let index = plan.select(args, plans).map_err(|err| {
            error!("{}", err);
            ResolveErrorKind::from(err)
        })?;
        let constructor = &plan.constructors[index];
        let sources = plan.sources(index, args.len());

        let mut values = Vec::with_capacity(constructor.params.len());
        for (param, source) in constructor.params.iter().zip(sources.iter()) {
            let value = match *source {
                ArgumentSource::Explicit(position) => match args[position].coerce(&param.dependency, plans) {
                    Some(value) => value,
                    None => {
                        let err = ResolveErrorKind::from(ConfigurationErrorKind::NoMatchingConstructor {
                            target: plan.type_info,
                            arguments: vec![args[position].type_info().map_or("null", |type_info| type_info.name)],
                        });
                        error!("{}", err);
                        return Err(err);
                    }
                },
                ArgumentSource::Resolved => {
                    let view = MemberView::new(
                        plan.type_info,
                        owner,
                        ElementKind::Constructor,
                        &param.name,
                        &param.dependency.annotations,
                    );
                    self.resolve(&param.dependency, &view)?
                }
            };
            values.push(value);
        }

        let instance = (constructor.build)(&Args::new(plan.type_info, values)).map_err(|err| {
            let err = ResolveErrorKind::from_instantiate(err, |source| ProvisionErrorKind::Constructor {
                target: plan.type_info,
                constructor: constructor.name.to_string(),
                source,
            });
            error!("{}", err);
            err
        })?;
        let instance = Arc::new(instance);
        debug!(class = plan.type_info.name, constructor = %constructor.name, "Constructed");

        if defer {
            self.defer_injection(plan.clone(), instance.clone());
        } else {
            plan.run_hooks(Phase::PostConstruct, &instance)?;
            self.inject_members(plan, &instance, owner)?;
            plan.run_hooks(Phase::PostInject, &instance)?;
        }
        Ok(instance)
    }

    /// Injects fields, then methods, of an instance built elsewhere and runs its post-inject hooks
    pub(crate) fn inject<C: Injectable>(&mut self, instance: &Arc<C>) -> Result<(), ResolveErrorKind> {
        let plan = self.plans().get::<C>()?;
        let owner = Owner::of(instance);

        let entered = self.enter(owner);
        let result = self
            .inject_members(&plan, instance, owner)
            .and_then(|()| plan.run_hooks(Phase::PostInject, instance));
        if entered {
            self.scopes.pop();
        }
        result
    }

    fn inject_members<C: Injectable>(&mut self, plan: &ClassPlan<C>, instance: &C, owner: Owner) -> Result<(), ResolveErrorKind> {
        for field in &plan.fields {
            let view = MemberView::new(
                field.declaring,
                owner,
                ElementKind::Field,
                &field.name,
                &field.dependency.annotations,
            );
            let value = self.resolve(&field.dependency, &view)?;
            (field.assign)(instance, value.as_ref()).map_err(|err| {
                let err = ResolveErrorKind::from_instantiate(err, |source| ProvisionErrorKind::Member {
                    target: field.declaring,
                    member: field.name.to_string(),
                    source,
                });
                error!("{}", err);
                err
            })?;
            debug!(field = %field.name, "Field injected");
        }

        for method in &plan.methods {
            let mut values = Vec::with_capacity(method.params.len());
            for param in &method.params {
                let view = MemberView::new(
                    method.declaring,
                    owner,
                    ElementKind::Method,
                    &method.name,
                    &param.dependency.annotations,
                );
                values.push(self.resolve(&param.dependency, &view)?);
            }

            (method.call)(instance, &Args::new(method.declaring, values)).map_err(|err| {
                let err = ResolveErrorKind::from_instantiate(err, |source| ProvisionErrorKind::Member {
                    target: method.declaring,
                    member: method.name.to_string(),
                    source,
                });
                error!("{}", err);
                err
            })?;
            debug!(method = %method.name, "Method injected");
        }
        Ok(())
    }

    fn defer_injection<C: Injectable>(&mut self, plan: Arc<ClassPlan<C>>, instance: Arc<C>) {
        let hooks = plan
            .hooks(Phase::PostInject)
            .iter()
            .map(|hook| {
                let hook = hook.clone();
                let instance = instance.clone();
                DeferredHook {
                    priority: hook.priority,
                    run: Box::new(move || hook.call(Phase::PostInject, &instance)),
                }
            })
            .collect();

        self.deferred.push(Deferred {
            type_info: plan.type_info,
            inject: Box::new(move |resolution: &mut Resolution<'_>| {
                plan.run_hooks(Phase::PostConstruct, &instance)?;

                let owner = Owner::of(&instance);
                let entered = resolution.enter(owner);
                let result = resolution.inject_members(&plan, &instance, owner);
                if entered {
                    resolution.scopes.pop();
                }
                result
            }),
            hooks,
        });
        debug!("Member injection deferred");
    }

    /// Brings up eager bindings in three passes: construction of all instances,
    /// then post-construct hooks and member injection per instance,
    /// then post-inject hooks of all instances ordered by priority
    pub(crate) fn bring_up(&mut self, bindings: &[Arc<Binding>]) -> Result<(), ResolveErrorKind> {
        let injector = self.injector;
        for binding in bindings {
            let key = binding.key();
            let view = MemberView::new(key.type_info, Owner::Root, ElementKind::Eager, "", MANDATORY);
            if self.provide_binding(injector, binding, &view, true)?.is_none() {
                let err = ResolveErrorKind::from(ProvisionErrorKind::EmptySingleton { key: key.clone() });
                error!("{}", err);
                return Err(err);
            }
        }

        let deferred = std::mem::take(&mut self.deferred);
        debug!(count = deferred.len(), "Injecting eager instances");

        let mut hooks = Vec::new();
        for Deferred {
            type_info,
            inject,
            hooks: own,
        } in deferred
        {
            inject(self)?;
            debug!(class = type_info.name, "Eager instance injected");
            hooks.extend(own);
        }

        hooks.sort_by_key(|hook| hook.priority);
        for hook in hooks {
            (hook.run)()?;
        }
        Ok(())
    }

    pub(crate) fn scope_state(&self, scope: &crate::scope::BindingScope) -> Option<Arc<ScopeState>> {
        self.injector.activations().state_for(scope)
    }
}
