use std::{
    borrow::Cow,
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
    sync::Arc,
};

use crate::{
    any::{Implements, TypeInfo},
    dependency_resolver::DependencyResolver,
    finalizer::{FinalizedProvider, Finalizer},
    instantiator::{Instantiator, InstantiatorProvider},
    key::BindingKey,
    module::Binder,
    plan::{Injectable, Resolvable},
    provider::{BoxedProvider, ConstructProvider, ImmutableInstanceProvider, InstanceProvider, Provider},
    qualifier::BindingQualifier,
    scope::BindingScope,
};

/// Rule telling the injector how to produce values for a key
#[derive(Clone)]
pub struct Binding {
    key: BindingKey,
    provider: BoxedProvider,
    collection: bool,
}

impl Binding {
    #[inline]
    #[must_use]
    pub fn new(key: BindingKey, provider: BoxedProvider) -> Self {
        Self {
            key,
            provider,
            collection: false,
        }
    }

    /// Binding allowed to coexist with other collection contributions for the same key
    #[inline]
    #[must_use]
    pub const fn into_collection(mut self) -> Self {
        self.collection = true;
        self
    }

    #[inline]
    #[must_use]
    pub const fn key(&self) -> &BindingKey {
        &self.key
    }

    #[inline]
    #[must_use]
    pub const fn provider(&self) -> &BoxedProvider {
        &self.provider
    }

    #[inline]
    #[must_use]
    pub const fn is_collection(&self) -> bool {
        self.collection
    }

    #[inline]
    #[must_use]
    pub(crate) fn with_provider(self, provider: BoxedProvider) -> Self {
        Self { provider, ..self }
    }
}

impl Debug for Binding {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("key", &self.key)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

/// Builds a binding for `T`, finished by one of the `to_*` methods
#[must_use = "the binding is only registered by a `to_*` method"]
pub struct BindingBuilder<'b, T: ?Sized> {
    binder: &'b mut Binder,
    qualifier: BindingQualifier,
    scope: BindingScope,
    collection: bool,
    finalizer: Option<Arc<dyn Finalizer<T>>>,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<'b, T: ?Sized + Resolvable> BindingBuilder<'b, T> {
    #[inline]
    pub(crate) fn new(binder: &'b mut Binder) -> Self {
        Self {
            binder,
            qualifier: BindingQualifier::None,
            scope: BindingScope::UNSCOPED,
            collection: false,
            finalizer: None,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn named(self, name: impl Into<Cow<'static, str>>) -> Self {
        self.qualified_by(BindingQualifier::named(name))
    }

    #[inline]
    pub fn qualified_by(mut self, qualifier: BindingQualifier) -> Self {
        self.qualifier = qualifier;
        self
    }

    /// Scope of the binding. [`BindingScope::ANY`] can't be stored and means unscoped.
    #[inline]
    pub fn in_scope(mut self, scope: BindingScope) -> Self {
        self.scope = if scope.is_any() { BindingScope::UNSCOPED } else { scope };
        self
    }

    #[inline]
    pub fn request_scoped(self) -> Self {
        self.in_scope(BindingScope::REQUEST)
    }

    #[inline]
    pub fn session_scoped(self) -> Self {
        self.in_scope(BindingScope::SESSION)
    }

    #[inline]
    pub fn into_collection(mut self) -> Self {
        self.collection = true;
        self
    }

    /// Called with every value this binding creates when its scope tears the value down
    #[inline]
    pub fn finalizer(mut self, finalizer: impl Finalizer<T>) -> Self {
        self.finalizer = Some(Arc::new(finalizer));
        self
    }

    /// Values are constructed as `C`
    pub fn to<C>(self)
    where
        C: Injectable + Implements<T>,
    {
        self.finish(Arc::new(ConstructProvider::<C, T>::new()), None);
    }

    pub fn to_singleton_of<C>(self)
    where
        C: Injectable + Implements<T>,
    {
        self.finish(Arc::new(ConstructProvider::<C, T>::new()), Some(BindingScope::SINGLETON));
    }

    /// Constructed when the injector is built
    pub fn to_eager_singleton_of<C>(self)
    where
        C: Injectable + Implements<T>,
    {
        self.finish(Arc::new(ConstructProvider::<C, T>::new()), Some(BindingScope::EAGER_SINGLETON));
    }

    /// Members of the instance are injected the first time it's provided
    pub fn to_instance<C>(self, instance: Arc<C>)
    where
        C: Injectable + Implements<T>,
    {
        self.finish(Arc::new(InstanceProvider::<C, T>::new(instance)), Some(BindingScope::INSTANCE));
    }

    /// Instance is provided as is
    pub fn to_immutable_instance(self, instance: Arc<T>) {
        self.finish(
            Arc::new(ImmutableInstanceProvider::new(instance)),
            Some(BindingScope::IMMUTABLE_INSTANCE),
        );
    }

    /// Values are produced by `instantiator`, its arguments are resolved with [`DependencyResolver`]
    pub fn to_provider<Inst, Deps>(self, instantiator: Inst)
    where
        Inst: Instantiator<Deps>,
        Inst::Provides: Implements<T>,
        Deps: DependencyResolver + 'static,
    {
        self.finish(Arc::new(InstantiatorProvider::<Inst, Deps, T>::new(instantiator)), None);
    }

    pub fn to_raw_provider(self, provider: impl Provider) {
        self.finish(Arc::new(provider), None);
    }

    fn finish(self, provider: BoxedProvider, forced_scope: Option<BindingScope>) {
        let provider: BoxedProvider = match self.finalizer {
            Some(finalizer) => Arc::new(FinalizedProvider::<T>::new(provider, finalizer)),
            None => provider,
        };
        let key = BindingKey::new(TypeInfo::of::<T>(), self.qualifier, forced_scope.unwrap_or(self.scope));

        let binding = Binding::new(key, provider);
        self.binder.add(if self.collection { binding.into_collection() } else { binding });
    }
}

impl<T: Injectable> BindingBuilder<'_, T> {
    pub fn to_self(self) {
        self.to::<T>();
    }

    pub fn to_singleton(self) {
        self.to_singleton_of::<T>();
    }

    pub fn to_eager_singleton(self) {
        self.to_eager_singleton_of::<T>();
    }

    pub fn to_request_scoped(self) {
        self.request_scoped().to::<T>();
    }

    pub fn to_session_scoped(self) {
        self.session_scoped().to::<T>();
    }
}
