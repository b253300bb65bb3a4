use std::{
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
    sync::Arc,
};

use tracing::debug;

use crate::{
    any::TypeInfo,
    context::ContextView,
    errors::ResolveErrorKind,
    provider::{BoxedProvider, Provided, Provider},
    resolution::Resolution,
};

pub trait Finalizer<Dep: ?Sized>: Send + Sync + 'static {
    fn finalize(&self, dependency: Arc<Dep>);
}

impl<F, Dep> Finalizer<Dep> for F
where
    F: Fn(Arc<Dep>) + Send + Sync + 'static,
    Dep: ?Sized,
{
    #[inline]
    fn finalize(&self, dependency: Arc<Dep>) {
        self(dependency);
    }
}

type TeardownFn = dyn Fn() -> Result<(), ResolveErrorKind> + Send + Sync;

/// Pre-destroy work recorded for a created instance
#[derive(Clone)]
pub struct Teardown {
    type_info: TypeInfo,
    run: Arc<TeardownFn>,
}

impl Teardown {
    #[inline]
    #[must_use]
    pub fn new(type_info: TypeInfo, run: impl Fn() -> Result<(), ResolveErrorKind> + Send + Sync + 'static) -> Self {
        Self {
            type_info,
            run: Arc::new(run),
        }
    }

    #[inline]
    #[must_use]
    pub const fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    /// # Errors
    /// Returns the first error raised by a pre-destroy hook or finalizer
    #[inline]
    pub fn run(&self) -> Result<(), ResolveErrorKind> {
        (self.run)()
    }

    #[must_use]
    pub fn then(self, next: Teardown) -> Self {
        let type_info = self.type_info;
        Self::new(type_info, move || {
            self.run()?;
            next.run()
        })
    }
}

impl Debug for Teardown {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Teardown").field("type_info", &self.type_info).finish_non_exhaustive()
    }
}

/// Calls a finalizer for every value its delegate creates, after the value's own pre-destroy hooks
pub(crate) struct FinalizedProvider<Dep: ?Sized> {
    delegate: BoxedProvider,
    finalizer: Arc<dyn Finalizer<Dep>>,
    _marker: PhantomData<fn() -> Arc<Dep>>,
}

impl<Dep: ?Sized + Send + Sync + 'static> FinalizedProvider<Dep> {
    #[inline]
    #[must_use]
    pub(crate) fn new(delegate: BoxedProvider, finalizer: Arc<dyn Finalizer<Dep>>) -> Self {
        Self {
            delegate,
            finalizer,
            _marker: PhantomData,
        }
    }

    fn attach(&self, provided: Option<Provided>) -> Option<Provided> {
        let provided = provided?;
        if !provided.is_created() {
            return Some(provided);
        }
        let Some(dependency) = provided.get::<Dep>() else {
            return Some(provided);
        };

        let finalizer = self.finalizer.clone();
        Some(provided.with_teardown(Teardown::new(TypeInfo::of::<Dep>(), move || {
            finalizer.finalize(dependency.clone());
            debug!("Finalizer called");
            Ok(())
        })))
    }
}

impl<Dep: ?Sized + Send + Sync + 'static> Provider for FinalizedProvider<Dep> {
    fn provide(&self, resolution: &mut Resolution<'_>, context: &dyn ContextView) -> Result<Option<Provided>, ResolveErrorKind> {
        self.delegate.provide(resolution, context).map(|provided| self.attach(provided))
    }

    fn provide_deferred(&self, resolution: &mut Resolution<'_>, context: &dyn ContextView) -> Result<Option<Provided>, ResolveErrorKind> {
        self.delegate
            .provide_deferred(resolution, context)
            .map(|provided| self.attach(provided))
    }
}
