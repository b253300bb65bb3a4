mod activation;
mod memoizing;
mod state;

pub use activation::{KeyedActivator, ScopeActivator, ScopeHandle, ScopeId, StackActivator};
pub(crate) use activation::Activations;
pub use memoizing::MemoizingProvider;
pub use state::ScopeState;

use std::{
    borrow::Cow,
    collections::HashMap,
    fmt::{self, Display, Formatter},
    sync::Arc,
};

use tracing::{debug, error};

use crate::{
    binding::Binding,
    context::ContextView,
    errors::{ConfigurationErrorKind, ResolveErrorKind},
    key::BindingKey,
    provider::{BoxedProvider, Provided, Provider},
    resolution::Resolution,
};

/// Name of a lifetime policy
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingScope(Cow<'static, str>);

impl BindingScope {
    pub const UNSCOPED: Self = Self(Cow::Borrowed("unscoped"));
    pub const INSTANCE: Self = Self(Cow::Borrowed("instance"));
    pub const IMMUTABLE_INSTANCE: Self = Self(Cow::Borrowed("immutable_instance"));
    pub const SINGLETON: Self = Self(Cow::Borrowed("singleton"));
    pub const EAGER_SINGLETON: Self = Self(Cow::Borrowed("eager_singleton"));
    pub const REQUEST: Self = Self(Cow::Borrowed("request"));
    pub const SESSION: Self = Self(Cow::Borrowed("session"));
    /// Lookup wildcard, never stored on a binding
    pub const ANY: Self = Self(Cow::Borrowed("*"));

    const BUILTIN: [Self; 8] = [
        Self::UNSCOPED,
        Self::INSTANCE,
        Self::IMMUTABLE_INSTANCE,
        Self::SINGLETON,
        Self::EAGER_SINGLETON,
        Self::REQUEST,
        Self::SESSION,
        Self::ANY,
    ];

    /// Scope with the given name. Names are case insensitive, an empty name is [`Self::UNSCOPED`].
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        let name = name.into();
        let name = name.trim();
        if name.is_empty() {
            return Self::UNSCOPED;
        }

        let name = name.to_ascii_lowercase();
        Self::BUILTIN
            .into_iter()
            .find(|scope| scope.name() == name)
            .unwrap_or(Self(Cow::Owned(name)))
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn is_any(&self) -> bool {
        *self == Self::ANY
    }
}

impl Default for BindingScope {
    #[inline]
    fn default() -> Self {
        Self::UNSCOPED
    }
}

impl Display for BindingScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns a raw provider into one that follows a scope's reuse policy
pub trait ScopeWrapper: Send + Sync + 'static {
    fn wrap(&self, key: &BindingKey, provider: BoxedProvider) -> BoxedProvider;
}

impl<F> ScopeWrapper for F
where
    F: Fn(&BindingKey, BoxedProvider) -> BoxedProvider + Send + Sync + 'static,
{
    #[inline]
    fn wrap(&self, key: &BindingKey, provider: BoxedProvider) -> BoxedProvider {
        self(key, provider)
    }
}

/// Provider is used as is
#[derive(Debug, Default, Clone, Copy)]
pub struct Unscoped;

impl ScopeWrapper for Unscoped {
    #[inline]
    fn wrap(&self, _key: &BindingKey, provider: BoxedProvider) -> BoxedProvider {
        provider
    }
}

/// Provider is called once, its value is reused by every later request
#[derive(Debug, Default, Clone, Copy)]
pub struct Memoized;

impl ScopeWrapper for Memoized {
    #[inline]
    fn wrap(&self, key: &BindingKey, provider: BoxedProvider) -> BoxedProvider {
        Arc::new(MemoizingProvider::new(key.clone(), provider))
    }
}

/// Values are stored in the [`ScopeState`] of the innermost open activation of the binding's scope
#[derive(Debug, Default, Clone, Copy)]
pub struct StateBacked;

impl ScopeWrapper for StateBacked {
    #[inline]
    fn wrap(&self, key: &BindingKey, provider: BoxedProvider) -> BoxedProvider {
        Arc::new(StateBackedProvider {
            key: key.clone(),
            delegate: provider,
        })
    }
}

struct StateBackedProvider {
    key: BindingKey,
    delegate: BoxedProvider,
}

impl StateBackedProvider {
    fn state(&self, resolution: &Resolution<'_>) -> Result<Arc<ScopeState>, ResolveErrorKind> {
        resolution.scope_state(&self.key.scope).ok_or_else(|| {
            let err = ResolveErrorKind::from(ConfigurationErrorKind::ScopeNotActive {
                scope: self.key.scope.clone(),
                key: self.key.clone(),
            });
            error!("{}", err);
            err
        })
    }
}

impl Provider for StateBackedProvider {
    fn provide(&self, resolution: &mut Resolution<'_>, context: &dyn ContextView) -> Result<Option<Provided>, ResolveErrorKind> {
        let state = self.state(resolution)?;
        state.get_or_compute(&self.key, || self.delegate.provide(resolution, context))
    }
}

/// How a scope decorates providers and how its activations are opened
#[derive(Clone)]
pub struct ScopeRegistration {
    wrapper: Arc<dyn ScopeWrapper>,
    activator: Option<Arc<dyn ScopeActivator>>,
    trackable: bool,
    eager: bool,
}

impl ScopeRegistration {
    #[inline]
    #[must_use]
    pub fn new(wrapper: impl ScopeWrapper) -> Self {
        Self {
            wrapper: Arc::new(wrapper),
            activator: None,
            trackable: false,
            eager: false,
        }
    }

    /// Scope whose activations each get a fresh state, like request scope
    #[inline]
    #[must_use]
    pub fn state_backed() -> Self {
        Self::new(StateBacked).with_activator(StackActivator)
    }

    /// Scope whose activations share state by identifier, like session scope
    #[inline]
    #[must_use]
    pub fn keyed() -> Self {
        Self::new(StateBacked).with_activator(KeyedActivator::new())
    }

    #[inline]
    #[must_use]
    pub fn with_activator(mut self, activator: impl ScopeActivator) -> Self {
        self.activator = Some(Arc::new(activator));
        self
    }

    /// Created values are recorded by the injector and torn down by [`crate::Injector::destroy`]
    #[inline]
    #[must_use]
    pub const fn tracked(mut self) -> Self {
        self.trackable = true;
        self
    }

    /// Bindings in this scope are instantiated when the injector is built
    #[inline]
    #[must_use]
    pub const fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    #[inline]
    #[must_use]
    pub const fn is_trackable(&self) -> bool {
        self.trackable
    }

    #[inline]
    #[must_use]
    pub const fn is_eager(&self) -> bool {
        self.eager
    }
}

pub(crate) struct ScopeRegistry {
    scopes: HashMap<BindingScope, ScopeRegistration>,
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        let mut scopes = HashMap::new();
        scopes.insert(BindingScope::UNSCOPED, ScopeRegistration::new(Unscoped));
        scopes.insert(BindingScope::INSTANCE, ScopeRegistration::new(Unscoped));
        scopes.insert(BindingScope::IMMUTABLE_INSTANCE, ScopeRegistration::new(Unscoped));
        scopes.insert(BindingScope::SINGLETON, ScopeRegistration::new(Memoized).tracked());
        scopes.insert(BindingScope::EAGER_SINGLETON, ScopeRegistration::new(Memoized).tracked().eager());
        scopes.insert(BindingScope::REQUEST, ScopeRegistration::state_backed());
        scopes.insert(BindingScope::SESSION, ScopeRegistration::keyed());
        Self { scopes }
    }
}

impl ScopeRegistry {
    pub(crate) fn register(&mut self, scope: BindingScope, registration: ScopeRegistration) {
        if self.scopes.insert(scope.clone(), registration).is_some() {
            debug!(%scope, "Scope registration replaced");
        }
    }

    fn get(&self, scope: &BindingScope) -> Result<&ScopeRegistration, ConfigurationErrorKind> {
        self.scopes
            .get(scope)
            .ok_or_else(|| ConfigurationErrorKind::UnknownScope { scope: scope.clone() })
    }

    /// Binding with its provider wrapped by the binding's scope
    pub(crate) fn decorate(&self, binding: Binding) -> Result<Binding, ConfigurationErrorKind> {
        let registration = self.get(&binding.key().scope)?;
        let provider = registration.wrapper.wrap(binding.key(), binding.provider().clone());
        Ok(binding.with_provider(provider))
    }

    #[must_use]
    pub(crate) fn is_trackable(&self, scope: &BindingScope) -> bool {
        self.scopes.get(scope).is_some_and(ScopeRegistration::is_trackable)
    }

    #[must_use]
    pub(crate) fn is_eager(&self, scope: &BindingScope) -> bool {
        self.scopes.get(scope).is_some_and(ScopeRegistration::is_eager)
    }

    pub(crate) fn activator(&self, scope: &BindingScope) -> Result<Arc<dyn ScopeActivator>, ConfigurationErrorKind> {
        self.get(scope)?
            .activator
            .clone()
            .ok_or_else(|| ConfigurationErrorKind::ScopeNotActivatable { scope: scope.clone() })
    }

    /// Shuts down every activator, continuing past failures. Returns the first error.
    pub(crate) fn shutdown(&self) -> Result<(), ResolveErrorKind> {
        let mut result = Ok(());
        for (scope, registration) in &self.scopes {
            let Some(activator) = &registration.activator else {
                continue;
            };
            if let Err(err) = activator.shutdown() {
                error!(%scope, "{}", err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::{BindingScope, ScopeRegistry};
    use crate::errors::ConfigurationErrorKind;

    #[test]
    fn test_named_scopes() {
        assert_eq!(BindingScope::named("Singleton"), BindingScope::SINGLETON);
        assert_eq!(BindingScope::named("REQUEST"), BindingScope::REQUEST);
        assert_eq!(BindingScope::named(""), BindingScope::UNSCOPED);
        assert_eq!(BindingScope::named("*"), BindingScope::ANY);
        assert!(BindingScope::ANY.is_any());

        let custom = BindingScope::named("Tenant");
        assert_eq!(custom.name(), "tenant");
        assert_eq!(custom, BindingScope::named(String::from("tenant")));
        assert_eq!(custom.to_string(), "tenant");
    }

    #[test]
    fn test_default_registrations() {
        let scopes = ScopeRegistry::default();

        assert!(scopes.is_trackable(&BindingScope::SINGLETON));
        assert!(scopes.is_trackable(&BindingScope::EAGER_SINGLETON));
        assert!(!scopes.is_trackable(&BindingScope::REQUEST));
        assert!(!scopes.is_trackable(&BindingScope::UNSCOPED));

        assert!(scopes.is_eager(&BindingScope::EAGER_SINGLETON));
        assert!(!scopes.is_eager(&BindingScope::SINGLETON));

        assert!(scopes.activator(&BindingScope::REQUEST).is_ok());
        assert!(scopes.activator(&BindingScope::SESSION).is_ok());
        assert!(matches!(
            scopes.activator(&BindingScope::SINGLETON),
            Err(ConfigurationErrorKind::ScopeNotActivatable { .. })
        ));
        assert!(matches!(
            scopes.activator(&BindingScope::named("tenant")),
            Err(ConfigurationErrorKind::UnknownScope { .. })
        ));
    }
}
