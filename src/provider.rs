use std::{marker::PhantomData, sync::Arc};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    any::{downcast, erase, Erased, Implements, TypeInfo},
    context::ContextView,
    errors::ResolveErrorKind,
    finalizer::Teardown,
    plan::Injectable,
    resolution::Resolution,
};

/// Produces values for a binding.
///
/// Scope wrappers decorate raw providers, so implementations don't have to care about reuse.
pub trait Provider: Send + Sync + 'static {
    /// # Errors
    /// Returns an error if the value or one of its dependencies can't be produced
    fn provide(&self, resolution: &mut Resolution<'_>, context: &dyn ContextView) -> Result<Option<Provided>, ResolveErrorKind>;

    /// Provides a value whose member injection and hooks may be postponed.
    /// Used by eager bring-up, the postponed work is queued on the resolution.
    ///
    /// # Errors
    /// Returns an error if the value or one of its dependencies can't be produced
    #[inline]
    fn provide_deferred(&self, resolution: &mut Resolution<'_>, context: &dyn ContextView) -> Result<Option<Provided>, ResolveErrorKind> {
        self.provide(resolution, context)
    }
}

impl<F> Provider for F
where
    F: Fn(&mut Resolution<'_>, &dyn ContextView) -> Result<Option<Provided>, ResolveErrorKind> + Send + Sync + 'static,
{
    #[inline]
    fn provide(&self, resolution: &mut Resolution<'_>, context: &dyn ContextView) -> Result<Option<Provided>, ResolveErrorKind> {
        self(resolution, context)
    }
}

pub type BoxedProvider = Arc<dyn Provider>;

/// Value returned by a provider
#[derive(Clone, Debug)]
pub struct Provided {
    pub(crate) value: Erased,
    pub(crate) type_info: TypeInfo,
    pub(crate) concrete: TypeInfo,
    pub(crate) concrete_value: Erased,
    pub(crate) teardown: Option<Teardown>,
    pub(crate) created: bool,
}

impl Provided {
    /// Newly created value
    #[must_use]
    pub fn new<T>(value: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let value = erase(value);
        Self {
            concrete_value: value.clone(),
            value,
            type_info: TypeInfo::of::<T>(),
            concrete: TypeInfo::of::<T>(),
            teardown: None,
            created: true,
        }
    }

    /// Newly created value of concrete type `C` provided as `T`
    #[must_use]
    pub fn upcast<C, T>(value: Arc<C>) -> Self
    where
        C: Implements<T>,
        T: ?Sized + Send + Sync + 'static,
    {
        Self {
            value: erase(C::upcast(value.clone())),
            type_info: TypeInfo::of::<T>(),
            concrete: TypeInfo::of::<C>(),
            concrete_value: erase(value),
            teardown: None,
            created: true,
        }
    }

    /// Adds work to run when the value is destroyed, after already attached work
    #[must_use]
    pub fn with_teardown(mut self, teardown: Teardown) -> Self {
        self.teardown = Some(match self.teardown.take() {
            Some(current) => current.then(teardown),
            None => teardown,
        });
        self
    }

    /// Same value marked as reused
    #[inline]
    #[must_use]
    pub fn cached(&self) -> Self {
        Self {
            created: false,
            ..self.clone()
        }
    }

    #[inline]
    #[must_use]
    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        downcast(&self.value)
    }

    #[inline]
    #[must_use]
    pub const fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    #[inline]
    #[must_use]
    pub const fn concrete(&self) -> TypeInfo {
        self.concrete
    }

    #[inline]
    #[must_use]
    pub const fn teardown(&self) -> Option<&Teardown> {
        self.teardown.as_ref()
    }

    /// Whether this call created the value, as opposed to reusing one
    #[inline]
    #[must_use]
    pub const fn is_created(&self) -> bool {
        self.created
    }
}

/// Constructs `C` through its plan and provides it as `T`
pub(crate) struct ConstructProvider<C, T: ?Sized> {
    _marker: PhantomData<fn() -> (Arc<C>, Arc<T>)>,
}

impl<C, T: ?Sized> ConstructProvider<C, T> {
    #[inline]
    #[must_use]
    pub(crate) const fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<C, T> ConstructProvider<C, T>
where
    C: Injectable + Implements<T>,
    T: ?Sized + Send + Sync + 'static,
{
    fn construct(resolution: &mut Resolution<'_>, defer: bool) -> Result<Option<Provided>, ResolveErrorKind> {
        let constructed = resolution.construct_class::<C>(&[], defer)?;
        let provided = Provided::upcast::<C, T>(constructed.instance);
        Ok(Some(match constructed.teardown {
            Some(teardown) => provided.with_teardown(teardown),
            None => provided,
        }))
    }
}

impl<C, T> Provider for ConstructProvider<C, T>
where
    C: Injectable + Implements<T>,
    T: ?Sized + Send + Sync + 'static,
{
    fn provide(&self, resolution: &mut Resolution<'_>, _context: &dyn ContextView) -> Result<Option<Provided>, ResolveErrorKind> {
        Self::construct(resolution, false)
    }

    fn provide_deferred(&self, resolution: &mut Resolution<'_>, _context: &dyn ContextView) -> Result<Option<Provided>, ResolveErrorKind> {
        Self::construct(resolution, true)
    }
}

/// Provides an externally created value, injecting its members on first use
pub(crate) struct InstanceProvider<C, T: ?Sized> {
    instance: Arc<C>,
    injected: Mutex<bool>,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<C, T: ?Sized> InstanceProvider<C, T> {
    #[inline]
    #[must_use]
    pub(crate) fn new(instance: Arc<C>) -> Self {
        Self {
            instance,
            injected: Mutex::new(false),
            _marker: PhantomData,
        }
    }
}

impl<C, T> Provider for InstanceProvider<C, T>
where
    C: Injectable + Implements<T>,
    T: ?Sized + Send + Sync + 'static,
{
    fn provide(&self, resolution: &mut Resolution<'_>, _context: &dyn ContextView) -> Result<Option<Provided>, ResolveErrorKind> {
        let mut injected = self.injected.lock();
        if !*injected {
            resolution.inject(&self.instance)?;
            *injected = true;
            debug!("Instance injected");
        }
        Ok(Some(Provided::upcast::<C, T>(self.instance.clone()).cached()))
    }
}

/// Provides an externally created value as is
pub(crate) struct ImmutableInstanceProvider {
    provided: Provided,
}

impl ImmutableInstanceProvider {
    #[inline]
    #[must_use]
    pub(crate) fn new<T: ?Sized + Send + Sync + 'static>(instance: Arc<T>) -> Self {
        Self {
            provided: Provided::new(instance).cached(),
        }
    }
}

impl Provider for ImmutableInstanceProvider {
    #[inline]
    fn provide(&self, _resolution: &mut Resolution<'_>, _context: &dyn ContextView) -> Result<Option<Provided>, ResolveErrorKind> {
        Ok(Some(self.provided.clone()))
    }
}
