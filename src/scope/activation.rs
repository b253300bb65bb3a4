use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
    ops::Deref,
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{debug, error};

use super::{state::ScopeState, BindingScope};
use crate::{
    errors::{ConfigurationErrorKind, ResolveErrorKind},
    injector::Injector,
};

/// Identifier of a keyed scope activation, like a session id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeId(Arc<str>);

impl ScopeId {
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ScopeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScopeId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for ScopeId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

/// Opens and closes states of a scope
pub trait ScopeActivator: Send + Sync + 'static {
    /// # Errors
    /// Returns an error if the scope can't be opened with the given identifier
    fn open(&self, scope: &BindingScope, identifier: Option<&ScopeId>) -> Result<Arc<ScopeState>, ConfigurationErrorKind>;

    /// # Errors
    /// Returns the first pre-destroy error of the state
    fn close(&self, _scope: &BindingScope, _identifier: Option<&ScopeId>, state: &Arc<ScopeState>) -> Result<(), ResolveErrorKind> {
        if state.release() {
            state.destroy()?;
        }
        Ok(())
    }

    /// Called when the root injector is destroyed
    ///
    /// # Errors
    /// Returns the first pre-destroy error of the remaining states
    fn shutdown(&self) -> Result<(), ResolveErrorKind> {
        Ok(())
    }
}

/// Every activation gets a fresh state, destroyed when its handle closes
#[derive(Debug, Default, Clone, Copy)]
pub struct StackActivator;

impl ScopeActivator for StackActivator {
    fn open(&self, _scope: &BindingScope, _identifier: Option<&ScopeId>) -> Result<Arc<ScopeState>, ConfigurationErrorKind> {
        let state = Arc::new(ScopeState::new());
        state.retain();
        Ok(state)
    }
}

/// Activations with the same identifier share a state.
/// The state is destroyed when the last handle for its identifier closes.
#[derive(Default)]
pub struct KeyedActivator {
    states: Mutex<HashMap<ScopeId, Arc<ScopeState>>>,
}

impl KeyedActivator {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn active(&self) -> usize {
        self.states.lock().len()
    }
}

impl ScopeActivator for KeyedActivator {
    fn open(&self, scope: &BindingScope, identifier: Option<&ScopeId>) -> Result<Arc<ScopeState>, ConfigurationErrorKind> {
        let Some(identifier) = identifier else {
            return Err(ConfigurationErrorKind::MissingScopeIdentifier { scope: scope.clone() });
        };

        let mut states = self.states.lock();
        let state = states
            .entry(identifier.clone())
            .or_insert_with(|| Arc::new(ScopeState::new()))
            .clone();
        state.retain();
        Ok(state)
    }

    fn close(&self, _scope: &BindingScope, identifier: Option<&ScopeId>, state: &Arc<ScopeState>) -> Result<(), ResolveErrorKind> {
        {
            let mut states = self.states.lock();
            if !state.release() {
                return Ok(());
            }
            if let Some(identifier) = identifier {
                states.remove(identifier);
            }
        }
        state.destroy()
    }

    fn shutdown(&self) -> Result<(), ResolveErrorKind> {
        let states: Vec<_> = self.states.lock().drain().map(|(_, state)| state).collect();
        for state in states {
            state.destroy()?;
        }
        Ok(())
    }
}

struct ActivationNode {
    scope: BindingScope,
    state: Arc<ScopeState>,
    parent: Activations,
}

/// Scope states visible to an injector handle, innermost first
#[derive(Clone, Default)]
pub(crate) struct Activations(Option<Arc<ActivationNode>>);

impl Activations {
    #[must_use]
    pub(crate) fn push(&self, scope: BindingScope, state: Arc<ScopeState>) -> Self {
        Self(Some(Arc::new(ActivationNode {
            scope,
            state,
            parent: self.clone(),
        })))
    }

    #[must_use]
    pub(crate) fn state_for(&self, scope: &BindingScope) -> Option<Arc<ScopeState>> {
        let mut current = self.0.as_ref();
        while let Some(node) = current {
            if node.scope == *scope {
                return Some(node.state.clone());
            }
            current = node.parent.0.as_ref();
        }
        None
    }

    #[must_use]
    pub(crate) fn scopes(&self) -> Vec<BindingScope> {
        let mut scopes = Vec::new();
        let mut current = self.0.as_ref();
        while let Some(node) = current {
            scopes.push(node.scope.clone());
            current = node.parent.0.as_ref();
        }
        scopes
    }
}

/// Open activation of a scope.
///
/// Derefs to an injector that resolves values of this activation.
/// Closing runs pre-destroy work of everything the activation created, dropping the handle closes it too.
pub struct ScopeHandle {
    injector: Injector,
    scope: BindingScope,
    identifier: Option<ScopeId>,
    state: Arc<ScopeState>,
    activator: Arc<dyn ScopeActivator>,
    closed: bool,
}

impl ScopeHandle {
    #[inline]
    #[must_use]
    pub(crate) fn new(
        injector: Injector,
        scope: BindingScope,
        identifier: Option<ScopeId>,
        state: Arc<ScopeState>,
        activator: Arc<dyn ScopeActivator>,
    ) -> Self {
        Self {
            injector,
            scope,
            identifier,
            state,
            activator,
            closed: false,
        }
    }

    #[inline]
    #[must_use]
    pub const fn injector(&self) -> &Injector {
        &self.injector
    }

    #[inline]
    #[must_use]
    pub const fn scope(&self) -> &BindingScope {
        &self.scope
    }

    #[inline]
    #[must_use]
    pub const fn identifier(&self) -> Option<&ScopeId> {
        self.identifier.as_ref()
    }

    #[inline]
    #[must_use]
    pub const fn state(&self) -> &Arc<ScopeState> {
        &self.state
    }

    /// # Errors
    /// Returns the first pre-destroy error of the activation
    pub fn close(mut self) -> Result<(), ResolveErrorKind> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<(), ResolveErrorKind> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Err(err) = self.activator.close(&self.scope, self.identifier.as_ref(), &self.state) {
            error!("{}", err);
            return Err(err);
        }
        debug!(scope = %self.scope, "Scope closed");
        Ok(())
    }
}

impl Deref for ScopeHandle {
    type Target = Injector;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.injector
    }
}

impl Drop for ScopeHandle {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if self.close_inner().is_ok() {
            debug!("Scope closed on drop");
        }
    }
}
