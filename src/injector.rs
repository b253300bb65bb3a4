use std::{
    any::{type_name, TypeId},
    borrow::Cow,
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{debug, debug_span, error, info_span};

use crate::{
    any::TypeInfo,
    binding::Binding,
    cache::{AbsentCache, Resolved, ResolvedSet},
    config::Config,
    constructor::Arg,
    context::{Context, ContextView, Owner},
    errors::{ConfigurationErrorKind, ProvisionErrorKind, ResolveErrorKind},
    module::{merge, Module},
    plan::{Injectable, PlanCache, Resolvable},
    qualifier::BindingQualifier,
    registry::BindingRegistry,
    resolution::Resolution,
    scope::{Activations, BindingScope, ScopeHandle, ScopeId, ScopeRegistration, ScopeRegistry},
};

/// Parts shared by an injector and all of its children
struct Shared {
    config: Config,
    scopes: ScopeRegistry,
    plans: PlanCache,
}

struct InjectorInner {
    registry: BindingRegistry,
    parent: Option<Injector>,
    shared: Arc<Shared>,
    resolved: Mutex<ResolvedSet>,
    absent: Mutex<AbsentCache>,
}

impl InjectorInner {
    /// Runs pre-destroy work of tracked values, most recently created first.
    /// Stops at the first failure.
    fn destroy_own(&self) -> Result<(), ResolveErrorKind> {
        let tracked: Vec<Resolved> = self.resolved.lock().drain_reversed().collect();
        debug!(count = tracked.len(), "Destroying tracked values");

        for Resolved { key, teardown } in tracked {
            let Some(teardown) = teardown else {
                continue;
            };
            if let Err(err) = teardown.run() {
                error!(%key, "{}", err);
                return Err(err);
            }
            debug!(%key, "Destroyed");
        }
        Ok(())
    }
}

impl Drop for InjectorInner {
    fn drop(&mut self) {
        let span = debug_span!("drop_injector");
        let _guard = span.enter();

        if self.destroy_own().is_err() {
            return;
        }
        if self.parent.is_none() && self.shared.scopes.shutdown().is_ok() {
            debug!("Scopes shut down");
        }
    }
}

/// Resolves values for the bindings of its modules, falling back to its parent.
///
/// Cloning is cheap, clones share bindings, singletons and tracked values.
#[derive(Clone)]
pub struct Injector {
    inner: Arc<InjectorInner>,
    activations: Activations,
}

impl Injector {
    #[inline]
    #[must_use]
    pub fn builder<'m>() -> InjectorBuilder<'m> {
        InjectorBuilder::new()
    }

    /// Injector with the default configuration and scopes
    ///
    /// # Errors
    /// Returns an error if the bindings are invalid or an eager singleton can't be brought up
    pub fn new(modules: &[&dyn Module]) -> Result<Self, ResolveErrorKind> {
        Self::builder().modules(modules).build()
    }

    /// Injector whose lookups fall back to this one.
    /// Bindings of the child may override the parent's.
    ///
    /// # Errors
    /// Returns an error if the bindings are invalid or an eager singleton can't be brought up
    pub fn child(&self, modules: &[&dyn Module]) -> Result<Self, ResolveErrorKind> {
        let span = info_span!("build_child_injector");
        let _guard = span.enter();

        Self::assemble(
            merge(modules),
            Some(self.clone()),
            self.inner.shared.clone(),
            self.activations.clone(),
        )
    }

    fn assemble(
        bindings: Vec<Binding>,
        parent: Option<Injector>,
        shared: Arc<Shared>,
        activations: Activations,
    ) -> Result<Self, ResolveErrorKind> {
        let decorated = bindings
            .into_iter()
            .map(|binding| shared.scopes.decorate(binding))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                error!("{}", err);
                ResolveErrorKind::from(err)
            })?;

        let registry = BindingRegistry::new();
        registry.add_all(decorated)?;
        debug!(count = registry.len(), "Bindings registered");

        let injector = Self {
            inner: Arc::new(InjectorInner {
                registry,
                parent,
                absent: Mutex::new(AbsentCache::new(shared.config.absent_cache_capacity)),
                resolved: Mutex::new(ResolvedSet::new()),
                shared,
            }),
            activations,
        };
        injector.bring_up()?;
        Ok(injector)
    }

    fn bring_up(&self) -> Result<(), ResolveErrorKind> {
        let eager: Vec<_> = self
            .inner
            .registry
            .all()
            .into_iter()
            .filter(|binding| self.scopes().is_eager(&binding.key().scope))
            .collect();
        if eager.is_empty() {
            return Ok(());
        }

        let span = info_span!("bring_up", count = eager.len());
        let _guard = span.enter();

        Resolution::new(self).bring_up(&eager)?;
        debug!("Eager bindings brought up");
        Ok(())
    }

    /// Value for the type and qualifier the context describes.
    /// Returns `None` only for optional contexts.
    ///
    /// # Errors
    /// Returns an error if a mandatory value can't be provided
    pub fn provide<T: ?Sized + Resolvable>(&self, context: &dyn ContextView) -> Result<Option<Arc<T>>, ResolveErrorKind> {
        let span = info_span!("provide", dependency = type_name::<T>());
        let _guard = span.enter();

        Resolution::new(self).provide::<T>(context)
    }

    /// Value requested on behalf of `calling`.
    /// Unscoped values are shared between requests of the same calling object within one call.
    ///
    /// # Errors
    /// Returns an error if the value can't be provided
    pub fn provide_for<T, O>(&self, calling: &Arc<O>) -> Result<Arc<T>, ResolveErrorKind>
    where
        T: ?Sized + Resolvable,
        O: ?Sized + 'static,
    {
        let context = Context::of::<O>().with_owner(Owner::of(calling));
        self.get_with::<T>(&context)
    }

    /// # Errors
    /// Returns an error if the value can't be provided
    #[inline]
    pub fn get<T: ?Sized + Resolvable>(&self) -> Result<Arc<T>, ResolveErrorKind> {
        self.get_with::<T>(&Context::of::<T>())
    }

    /// # Errors
    /// Returns an error if the value can't be provided
    #[inline]
    pub fn get_named<T: ?Sized + Resolvable>(&self, name: impl Into<Cow<'static, str>>) -> Result<Arc<T>, ResolveErrorKind> {
        self.get_with::<T>(&Context::of::<T>().named(name))
    }

    /// Value if something is bound for it, `None` for an unbound optional.
    ///
    /// # Errors
    /// Returns an error if a bound value can't be provided
    #[inline]
    pub fn get_optional<T: ?Sized + Resolvable>(&self) -> Result<Option<Arc<T>>, ResolveErrorKind> {
        self.provide::<T>(&Context::of::<T>().optional())
    }

    fn get_with<T: ?Sized + Resolvable>(&self, context: &dyn ContextView) -> Result<Arc<T>, ResolveErrorKind> {
        match self.provide::<T>(context)? {
            Some(value) => Ok(value),
            None => {
                let err = ResolveErrorKind::from(ProvisionErrorKind::Absent {
                    type_info: TypeInfo::of::<T>(),
                });
                error!("{}", err);
                Err(err)
            }
        }
    }

    /// Constructs a new `C` ignoring bindings for it.
    /// Explicit arguments select the constructor, remaining parameters are resolved.
    ///
    /// # Errors
    /// Returns an error if no constructor accepts the arguments or construction fails
    pub fn construct<C: Injectable>(&self, args: &[Arg]) -> Result<Arc<C>, ResolveErrorKind> {
        let span = info_span!("construct", class = type_name::<C>(), args = args.len());
        let _guard = span.enter();

        Resolution::new(self).construct::<C>(args)
    }

    /// Injects members of an instance created elsewhere and runs its post-inject hooks
    ///
    /// # Errors
    /// Returns an error if a member can't be injected
    pub fn inject<C: Injectable>(&self, instance: &Arc<C>) -> Result<(), ResolveErrorKind> {
        let span = info_span!("inject", class = type_name::<C>());
        let _guard = span.enter();

        Resolution::new(self).inject(instance)
    }

    /// Handle that provides values of the binding for `T`, looked up once
    ///
    /// # Errors
    /// Returns an error if nothing is bound for `T` or the binding is ambiguous
    pub fn get_provider<T: ?Sized + Resolvable>(&self) -> Result<BoundProvider<T>, ResolveErrorKind> {
        self.get_provider_for::<T>(BindingQualifier::None)
    }

    /// # Errors
    /// Returns an error if nothing is bound for `T` with the qualifier or the binding is ambiguous
    pub fn get_provider_for<T: ?Sized + Resolvable>(&self, qualifier: BindingQualifier) -> Result<BoundProvider<T>, ResolveErrorKind> {
        let type_info = TypeInfo::of::<T>();
        let Some((owner, mut bindings)) = self.lookup(type_info.id, &qualifier) else {
            let err = ResolveErrorKind::from(ConfigurationErrorKind::NoBinding { type_info, qualifier });
            error!("{}", err);
            return Err(err);
        };
        if bindings.len() > 1 {
            let err = ResolveErrorKind::from(ConfigurationErrorKind::AmbiguousBinding {
                type_info,
                qualifier,
                count: bindings.len(),
            });
            error!("{}", err);
            return Err(err);
        }

        Ok(BoundProvider {
            injector: self.clone(),
            owner: owner.clone(),
            binding: bindings.remove(0),
            _marker: PhantomData,
        })
    }

    /// Runs pre-destroy work of every tracked value, most recently created first, then the parent's.
    /// The root injector also closes every open scope activation.
    ///
    /// # Errors
    /// Returns the first pre-destroy error, remaining work of that pass is skipped
    pub fn destroy(&self) -> Result<(), ResolveErrorKind> {
        let span = info_span!("destroy");
        let _guard = span.enter();

        self.inner.destroy_own()?;
        match &self.inner.parent {
            Some(parent) => parent.destroy(),
            None => self.scopes().shutdown(),
        }
    }

    /// Opens an activation of `scope`.
    /// Values of the scope resolved through the returned handle live until it's closed.
    ///
    /// # Errors
    /// Returns an error if the scope isn't registered, can't be activated, or needs an identifier
    pub fn open_scope(&self, scope: BindingScope, identifier: Option<ScopeId>) -> Result<ScopeHandle, ResolveErrorKind> {
        let activator = self.scopes().activator(&scope).map_err(|err| {
            error!("{}", err);
            ResolveErrorKind::from(err)
        })?;
        let state = activator.open(&scope, identifier.as_ref()).map_err(|err| {
            error!("{}", err);
            ResolveErrorKind::from(err)
        })?;
        debug!(%scope, "Scope opened");

        let injector = Self {
            inner: self.inner.clone(),
            activations: self.activations.push(scope.clone(), state.clone()),
        };
        Ok(ScopeHandle::new(injector, scope, identifier, state, activator))
    }

    /// # Errors
    /// Returns an error if the request scope isn't activatable
    #[inline]
    pub fn open_request(&self) -> Result<ScopeHandle, ResolveErrorKind> {
        self.open_scope(BindingScope::REQUEST, None)
    }

    /// Joins the session with the identifier, opening it if needed
    ///
    /// # Errors
    /// Returns an error if the session scope isn't activatable
    #[inline]
    pub fn open_session(&self, identifier: impl Into<ScopeId>) -> Result<ScopeHandle, ResolveErrorKind> {
        self.open_scope(BindingScope::SESSION, Some(identifier.into()))
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<&Injector> {
        self.inner.parent.as_ref()
    }

    /// Own bindings, not including the parent's
    #[inline]
    #[must_use]
    pub fn bindings(&self) -> &BindingRegistry {
        &self.inner.registry
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.shared.config
    }

    /// Scopes active for this handle, innermost first
    #[inline]
    #[must_use]
    pub fn active_scopes(&self) -> Vec<BindingScope> {
        self.activations.scopes()
    }

    #[inline]
    pub(crate) fn plans(&self) -> &PlanCache {
        &self.inner.shared.plans
    }

    #[inline]
    pub(crate) fn scopes(&self) -> &ScopeRegistry {
        &self.inner.shared.scopes
    }

    #[inline]
    pub(crate) const fn activations(&self) -> &Activations {
        &self.activations
    }

    /// Bindings of the closest injector, starting from this one, that binds the type with the qualifier
    pub(crate) fn lookup(&self, type_id: TypeId, qualifier: &BindingQualifier) -> Option<(&Injector, Vec<Arc<Binding>>)> {
        let mut current = Some(self);
        while let Some(injector) = current {
            let bindings = injector.inner.registry.find(type_id, qualifier, &BindingScope::ANY);
            if !bindings.is_empty() {
                return Some((injector, bindings));
            }
            current = injector.inner.parent.as_ref();
        }
        None
    }

    pub(crate) fn track(&self, resolved: Resolved) {
        self.inner.resolved.lock().push(resolved);
    }

    pub(crate) fn is_known_absent(&self, type_id: TypeId, qualifier: &BindingQualifier) -> bool {
        self.inner.absent.lock().contains(type_id, qualifier)
    }

    pub(crate) fn remember_absent(&self, type_id: TypeId, qualifier: BindingQualifier) {
        self.inner.absent.lock().insert(type_id, qualifier);
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.inner.resolved.lock().len()
    }
}

impl Resolvable for Injector {}

impl Debug for Injector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("bindings", &self.inner.registry.len())
            .field("parent", &self.inner.parent)
            .field("active_scopes", &self.activations.scopes())
            .finish_non_exhaustive()
    }
}

/// Configures and builds a root [`Injector`]
#[must_use]
pub struct InjectorBuilder<'m> {
    config: Config,
    scopes: ScopeRegistry,
    modules: Vec<&'m dyn Module>,
}

impl<'m> InjectorBuilder<'m> {
    #[inline]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            scopes: ScopeRegistry::default(),
            modules: Vec::new(),
        }
    }

    #[inline]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Registers a custom scope or replaces a builtin one
    #[inline]
    pub fn register_scope(mut self, scope: BindingScope, registration: ScopeRegistration) -> Self {
        self.scopes.register(scope, registration);
        self
    }

    #[inline]
    pub fn module(mut self, module: &'m dyn Module) -> Self {
        self.modules.push(module);
        self
    }

    #[inline]
    pub fn modules(mut self, modules: &[&'m dyn Module]) -> Self {
        self.modules.extend_from_slice(modules);
        self
    }

    /// # Errors
    /// Returns an error if the bindings are invalid or an eager singleton can't be brought up
    pub fn build(self) -> Result<Injector, ResolveErrorKind> {
        let span = info_span!("build_injector", modules = self.modules.len());
        let _guard = span.enter();

        let shared = Arc::new(Shared {
            config: self.config,
            scopes: self.scopes,
            plans: PlanCache::default(),
        });
        Injector::assemble(merge(&self.modules), None, shared, Activations::default())
    }
}

impl Default for InjectorBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Provides values of one binding without looking it up again
pub struct BoundProvider<T: ?Sized> {
    injector: Injector,
    owner: Injector,
    binding: Arc<Binding>,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Resolvable> BoundProvider<T> {
    /// # Errors
    /// Returns an error if the value can't be provided
    pub fn get(&self) -> Result<Arc<T>, ResolveErrorKind> {
        let span = info_span!("bound_provide", key = %self.binding.key());
        let _guard = span.enter();

        let context = Context::of::<T>();
        let mut resolution = Resolution::new(&self.injector);
        let provided = resolution.provide_binding(&self.owner, &self.binding, &context, false)?;

        let type_info = TypeInfo::of::<T>();
        let Some(provided) = provided else {
            let err = ResolveErrorKind::from(ProvisionErrorKind::Absent { type_info });
            error!("{}", err);
            return Err(err);
        };
        provided.get::<T>().ok_or_else(|| {
            let err = ResolveErrorKind::from(ProvisionErrorKind::IncorrectType {
                expected: type_info,
                actual: provided.type_info(),
            });
            error!("{}", err);
            err
        })
    }

    #[inline]
    #[must_use]
    pub fn binding(&self) -> &Binding {
        &self.binding
    }
}

impl<T: ?Sized> Clone for BoundProvider<T> {
    fn clone(&self) -> Self {
        Self {
            injector: self.injector.clone(),
            owner: self.owner.clone(),
            binding: self.binding.clone(),
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Injector;
    use crate::{
        binding::Binding,
        errors::{ConfigurationErrorKind, ResolveErrorKind},
        module::Binder,
        plan::{ClassBuilder, Constructor, Injectable},
        scope::BindingScope,
    };

    use std::sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    };
    use tracing_test::traced_test;

    struct Counted;

    static CREATED: AtomicU8 = AtomicU8::new(0);
    static DESTROYED: AtomicU8 = AtomicU8::new(0);

    impl Injectable for Counted {
        fn describe(class: &mut ClassBuilder<Self>) {
            class
                .constructor(Constructor::new("new", |_| {
                    CREATED.fetch_add(1, Ordering::SeqCst);
                    Ok(Counted)
                }))
                .pre_destroy("close", 0, |_| {
                    DESTROYED.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
        }
    }

    #[test]
    #[traced_test]
    fn test_singleton_tracked_and_destroyed() {
        let injector = Injector::new(&[&|binder: &mut Binder| binder.bind::<Counted>().to_singleton()]).unwrap();

        let first = injector.get::<Counted>().unwrap();
        let second = injector.get::<Counted>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(CREATED.load(Ordering::SeqCst), 1);
        assert_eq!(injector.tracked(), 1);

        injector.destroy().unwrap();
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);
        assert_eq!(injector.tracked(), 0);

        injector.destroy().unwrap();
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[traced_test]
    fn test_child_falls_back_to_parent() {
        let parent = Injector::new(&[&|binder: &mut Binder| {
            binder.bind::<String>().to_immutable_instance(Arc::new("parent".to_owned()));
            binder.bind::<u32>().to_immutable_instance(Arc::new(1));
        }])
        .unwrap();
        let child = parent
            .child(&[&|binder: &mut Binder| {
                binder.bind::<String>().to_immutable_instance(Arc::new("child".to_owned()));
            }])
            .unwrap();

        assert_eq!(*child.get::<String>().unwrap(), "child");
        assert_eq!(*parent.get::<String>().unwrap(), "parent");
        assert_eq!(*child.get::<u32>().unwrap(), 1);
        assert!(child.parent().is_some());
    }

    #[test]
    #[traced_test]
    fn test_injector_resolves_itself() {
        let injector = Injector::new(&[]).unwrap();
        let resolved = injector.get::<Injector>().unwrap();

        assert_eq!(resolved.bindings().len(), injector.bindings().len());
    }

    #[test]
    #[traced_test]
    fn test_unknown_scope() {
        let custom = BindingScope::named("conversation");
        let result = Injector::new(&[&move |binder: &mut Binder| {
            binder.bind::<u8>().in_scope(custom.clone()).to_provider(|| Ok::<_, std::convert::Infallible>(1u8));
        }]);

        assert!(matches!(
            result,
            Err(ResolveErrorKind::Configuration(ConfigurationErrorKind::UnknownScope { .. }))
        ));
    }

    #[test]
    #[traced_test]
    fn test_optional_absent_is_cached() {
        let injector = Injector::new(&[]).unwrap();

        assert!(injector.get_optional::<u64>().unwrap().is_none());
        assert!(injector.get_optional::<u64>().unwrap().is_none());
        assert!(injector.inner.absent.lock().contains(std::any::TypeId::of::<u64>(), &Default::default()));
        assert!(matches!(
            injector.get::<u64>(),
            Err(ResolveErrorKind::Configuration(ConfigurationErrorKind::NoBinding { .. }))
        ));
    }

    #[test]
    #[traced_test]
    fn test_bound_provider() {
        let injector = Injector::new(&[&|binder: &mut Binder| {
            binder.add(Binding::new(
                crate::key::BindingKey::new(
                    crate::any::TypeInfo::of::<u16>(),
                    Default::default(),
                    BindingScope::UNSCOPED,
                ),
                Arc::new(|_: &mut crate::resolution::Resolution<'_>, _: &dyn crate::context::ContextView| {
                    Ok::<_, ResolveErrorKind>(Some(crate::provider::Provided::new(Arc::new(7u16))))
                }),
            ));
        }])
        .unwrap();

        let provider = injector.get_provider::<u16>().unwrap();
        assert_eq!(*provider.get().unwrap(), 7);
        assert!(injector.get_provider::<u32>().is_err());
    }
}
