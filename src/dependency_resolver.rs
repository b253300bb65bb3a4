use std::{any::type_name, sync::Arc};

use tracing::{debug, debug_span, error};

use crate::{
    any::TypeInfo,
    context::{ContextView, ElementKind, MemberView, MANDATORY, OPTIONAL},
    errors::{ProvisionErrorKind, ResolveErrorKind},
    plan::Resolvable,
    resolution::Resolution,
};

/// Argument of a provider closure, resolved before the closure is called
pub trait DependencyResolver: Sized {
    /// # Errors
    /// Returns an error if the dependency can't be resolved
    fn resolve(resolution: &mut Resolution<'_>, context: &dyn ContextView) -> Result<Self, ResolveErrorKind>;
}

/// Mandatory dependency
pub struct Inject<Dep: ?Sized>(pub Arc<Dep>);

impl<Dep: ?Sized + Resolvable> DependencyResolver for Inject<Dep> {
    fn resolve(resolution: &mut Resolution<'_>, context: &dyn ContextView) -> Result<Self, ResolveErrorKind> {
        let span = debug_span!("resolve", dependency = type_name::<Dep>());
        let _guard = span.enter();

        let view = MemberView::new(
            context.target(),
            context.owner(),
            ElementKind::Provider,
            TypeInfo::of::<Dep>().short_name(),
            MANDATORY,
        );
        match resolution.provide::<Dep>(&view)? {
            Some(dependency) => Ok(Self(dependency)),
            None => {
                let err = ResolveErrorKind::from(ProvisionErrorKind::Absent {
                    type_info: TypeInfo::of::<Dep>(),
                });
                error!("{}", err);
                Err(err)
            }
        }
    }
}

/// Dependency resolved to `None` when nothing is bound for it
pub struct InjectOptional<Dep: ?Sized>(pub Option<Arc<Dep>>);

impl<Dep: ?Sized + Resolvable> DependencyResolver for InjectOptional<Dep> {
    fn resolve(resolution: &mut Resolution<'_>, context: &dyn ContextView) -> Result<Self, ResolveErrorKind> {
        let span = debug_span!("resolve", dependency = type_name::<Dep>());
        let _guard = span.enter();

        let view = MemberView::new(
            context.target(),
            context.owner(),
            ElementKind::Provider,
            TypeInfo::of::<Dep>().short_name(),
            OPTIONAL,
        );
        let dependency = resolution.provide::<Dep>(&view)?;
        if dependency.is_none() {
            debug!("Resolved to nothing");
        }
        Ok(Self(dependency))
    }
}

macro_rules! impl_dependency_resolver {
    (
        [$($ty:ident),*]
    ) => {
        #[allow(non_snake_case)]
        impl<$($ty,)*> DependencyResolver for ($($ty,)*)
        where
            $( $ty: DependencyResolver, )*
        {
            #[inline]
            #[allow(unused_variables)]
            fn resolve(resolution: &mut Resolution<'_>, context: &dyn ContextView) -> Result<Self, ResolveErrorKind> {
                Ok(($($ty::resolve(resolution, context)?,)*))
            }
        }
    };
}

all_the_tuples!(impl_dependency_resolver);
