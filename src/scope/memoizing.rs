use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::{
    context::ContextView,
    errors::{ProvisionErrorKind, ResolveErrorKind},
    key::BindingKey,
    provider::{BoxedProvider, Provided, Provider},
    resolution::Resolution,
};

/// Computes its delegate's value once and returns it afterwards.
/// Reads after initialization never block.
pub struct MemoizingProvider {
    key: BindingKey,
    delegate: BoxedProvider,
    value: OnceLock<Provided>,
    lock: Mutex<()>,
}

impl MemoizingProvider {
    #[inline]
    #[must_use]
    pub fn new(key: BindingKey, delegate: BoxedProvider) -> Self {
        Self {
            key,
            delegate,
            value: OnceLock::new(),
            lock: Mutex::new(()),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.value.get().is_some()
    }

    fn get_or_create<F>(&self, create: F) -> Result<Option<Provided>, ResolveErrorKind>
    where
        F: FnOnce() -> Result<Option<Provided>, ResolveErrorKind>,
    {
        if let Some(provided) = self.value.get() {
            debug!("Found memoized");
            return Ok(Some(provided.cached()));
        }

        let _guard = self.lock.lock();
        if let Some(provided) = self.value.get() {
            debug!("Found memoized after waiting");
            return Ok(Some(provided.cached()));
        }

        let Some(provided) = create()? else {
            let err = ResolveErrorKind::from(ProvisionErrorKind::EmptySingleton { key: self.key.clone() });
            error!("{}", err);
            return Err(err);
        };
        let _ = self.value.set(provided.cached());
        debug!("Memoized");

        Ok(Some(provided))
    }
}

impl Provider for MemoizingProvider {
    fn provide(&self, resolution: &mut Resolution<'_>, context: &dyn ContextView) -> Result<Option<Provided>, ResolveErrorKind> {
        self.get_or_create(|| self.delegate.provide(resolution, context))
    }

    fn provide_deferred(&self, resolution: &mut Resolution<'_>, context: &dyn ContextView) -> Result<Option<Provided>, ResolveErrorKind> {
        self.get_or_create(|| self.delegate.provide_deferred(resolution, context))
    }
}
