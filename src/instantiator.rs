use std::{any::type_name, marker::PhantomData, sync::Arc};

use tracing::{debug, debug_span, error};

use crate::{
    any::{Implements, TypeInfo},
    context::{ContextView, ElementKind, MemberView, MANDATORY},
    dependency_resolver::DependencyResolver,
    errors::{InstantiateErrorKind, ProvisionErrorKind, ResolveErrorKind},
    provider::{Provided, Provider},
    resolution::Resolution,
};

/// Closure producing a value from resolved dependencies
pub trait Instantiator<Deps>: Clone + Send + Sync + 'static
where
    Deps: DependencyResolver,
{
    type Provides: Send + Sync + 'static;
    type Error: Into<InstantiateErrorKind>;

    /// # Errors
    /// Returns the error of the closure
    fn instantiate(&mut self, dependencies: Deps) -> Result<Self::Provides, Self::Error>;
}

macro_rules! impl_instantiator {
    (
        [$($ty:ident),*]
    ) => {
        #[allow(non_snake_case)]
        impl<F, Response, Err, $($ty,)*> Instantiator<($($ty,)*)> for F
        where
            F: FnMut($($ty,)*) -> Result<Response, Err> + Clone + Send + Sync + 'static,
            Response: Send + Sync + 'static,
            Err: Into<InstantiateErrorKind>,
            $( $ty: DependencyResolver, )*
        {
            type Provides = Response;
            type Error = Err;

            fn instantiate(&mut self, ($($ty,)*): ($($ty,)*)) -> Result<Self::Provides, Self::Error> {
                self($($ty,)*)
            }
        }
    };
}

all_the_tuples!(impl_instantiator);

/// Provides `T` by calling an instantiator with its resolved dependencies
pub(crate) struct InstantiatorProvider<Inst, Deps, T: ?Sized> {
    instantiator: Inst,
    _marker: PhantomData<fn() -> (Deps, Arc<T>)>,
}

impl<Inst, Deps, T: ?Sized> InstantiatorProvider<Inst, Deps, T> {
    #[inline]
    #[must_use]
    pub(crate) const fn new(instantiator: Inst) -> Self {
        Self {
            instantiator,
            _marker: PhantomData,
        }
    }
}

impl<Inst, Deps, T> Provider for InstantiatorProvider<Inst, Deps, T>
where
    Inst: Instantiator<Deps>,
    Inst::Provides: Implements<T>,
    Deps: DependencyResolver + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    fn provide(&self, resolution: &mut Resolution<'_>, context: &dyn ContextView) -> Result<Option<Provided>, ResolveErrorKind> {
        let span = debug_span!("instantiate", dependency = type_name::<T>());
        let _guard = span.enter();

        let view = MemberView::new(TypeInfo::of::<T>(), context.owner(), ElementKind::Provider, "", MANDATORY);
        let dependencies = Deps::resolve(resolution, &view)?;

        let provides = self.instantiator.clone().instantiate(dependencies).map_err(|err| {
            let err = ResolveErrorKind::from_instantiate(err.into(), |source| ProvisionErrorKind::Provider {
                type_info: TypeInfo::of::<T>(),
                source,
            });
            error!("{}", err);
            err
        })?;
        debug!("Instantiated");

        Ok(Some(Provided::upcast::<Inst::Provides, T>(Arc::new(provides))))
    }
}

#[cfg(test)]
mod tests {
    use super::Instantiator;
    use crate::{
        dependency_resolver::{DependencyResolver, Inject, InjectOptional},
        errors::{InstantiateErrorKind, ProvisionErrorKind, ResolveErrorKind},
        injector::Injector,
        module::Binder,
    };

    use std::sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    };
    use tracing::debug;
    use tracing_test::traced_test;

    struct Request(bool);
    struct Response(bool);
    struct Missing;

    crate::resolvable!(Request, Response, Missing);

    #[test]
    #[allow(dead_code)]
    fn test_instantiator_helper() {
        fn resolver<Deps: DependencyResolver, F: Instantiator<Deps>>(_f: F) {}
        fn resolver_with_dep() {
            resolver(|| Ok::<_, InstantiateErrorKind>(()));
            resolver(|Inject(_): Inject<Request>| Ok::<_, InstantiateErrorKind>(()));
        }
    }

    #[test]
    #[traced_test]
    fn test_instantiator_provider() {
        let request_call_count = Arc::new(AtomicU8::new(0));
        let response_call_count = Arc::new(AtomicU8::new(0));

        let module = |binder: &mut Binder| {
            binder.bind::<Request>().to_provider({
                let request_call_count = request_call_count.clone();
                move || {
                    request_call_count.fetch_add(1, Ordering::SeqCst);

                    debug!("Call instantiator request");
                    Ok::<_, InstantiateErrorKind>(Request(true))
                }
            });
            binder.bind::<Response>().to_provider({
                let response_call_count = response_call_count.clone();
                move |Inject(first): Inject<Request>, Inject(second): Inject<Request>, InjectOptional(missing): InjectOptional<Missing>| {
                    assert!(Arc::ptr_eq(&first, &second));
                    assert!(missing.is_none());

                    response_call_count.fetch_add(1, Ordering::SeqCst);

                    debug!("Call instantiator response");
                    Ok::<_, InstantiateErrorKind>(Response(first.0))
                }
            });
        };
        let injector = Injector::new(&[&module]).unwrap();

        let response = injector.get::<Response>().unwrap();
        assert!(response.0);
        assert_eq!(request_call_count.load(Ordering::SeqCst), 1);
        assert_eq!(response_call_count.load(Ordering::SeqCst), 1);

        injector.get::<Response>().unwrap();
        assert_eq!(request_call_count.load(Ordering::SeqCst), 2);
        assert_eq!(response_call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    #[traced_test]
    fn test_instantiator_error() {
        let module = |binder: &mut Binder| {
            binder
                .bind::<Request>()
                .to_provider(|| Err::<Request, _>(InstantiateErrorKind::Custom(anyhow::anyhow!("unavailable"))));
            binder
                .bind::<Response>()
                .to_provider(|Inject(_): Inject<Missing>| Ok::<_, InstantiateErrorKind>(Response(true)));
        };
        let injector = Injector::new(&[&module]).unwrap();

        assert!(matches!(
            injector.get::<Request>(),
            Err(ResolveErrorKind::Provision(ProvisionErrorKind::Provider { .. }))
        ));
        assert!(matches!(
            injector.get::<Response>(),
            Err(ResolveErrorKind::Configuration(_))
        ));
    }
}
