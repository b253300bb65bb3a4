use std::{
    borrow::Cow,
    fmt::{self, Debug, Formatter},
};

use crate::{
    any::TypeInfo,
    context::Annotation,
    plan::{ImplicitConstruction, Resolvable},
    qualifier::BindingQualifier,
};

/// Declared dependency of a constructor parameter, method parameter or field
#[derive(Clone)]
pub struct Dependency {
    pub(crate) type_info: TypeInfo,
    pub(crate) implicit: Option<ImplicitConstruction>,
    pub(crate) annotations: Vec<Annotation>,
    pub(crate) primitive: bool,
    pub(crate) always_inject: bool,
}

impl Dependency {
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + Resolvable>() -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            implicit: T::implicit(),
            annotations: vec![Annotation::Inject { optional: false }],
            primitive: false,
            always_inject: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn named(self, name: impl Into<Cow<'static, str>>) -> Self {
        self.qualified_by(BindingQualifier::named(name))
    }

    #[inline]
    #[must_use]
    pub fn qualified_by(self, qualifier: BindingQualifier) -> Self {
        self.annotated(Annotation::Qualifier(qualifier))
    }

    /// Absent values are injected as `None` instead of failing
    #[must_use]
    pub fn optional(mut self) -> Self {
        for annotation in &mut self.annotations {
            if let Annotation::Inject { optional } = annotation {
                *optional = true;
            }
        }
        self
    }

    /// Target can't represent an absent value, so it can't be optional or receive a null argument
    #[inline]
    #[must_use]
    pub const fn primitive(mut self) -> Self {
        self.primitive = true;
        self
    }

    /// Constructor parameter is resolved even when an explicit argument is passed at its position
    #[inline]
    #[must_use]
    pub const fn always_injected(mut self) -> Self {
        self.always_inject = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    #[inline]
    #[must_use]
    pub const fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    #[inline]
    #[must_use]
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.annotations
            .iter()
            .any(|annotation| matches!(annotation, Annotation::Inject { optional: true }))
    }

    #[inline]
    #[must_use]
    pub const fn is_primitive(&self) -> bool {
        self.primitive
    }
}

impl Debug for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("type_info", &self.type_info)
            .field("implicit", &self.implicit.is_some())
            .field("annotations", &self.annotations)
            .field("primitive", &self.primitive)
            .field("always_inject", &self.always_inject)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Dependency;
    use crate::{context::Annotation, qualifier::BindingQualifier};

    #[test]
    fn test_annotations() {
        let dependency = Dependency::of::<String>().named("greeting").optional();

        assert!(dependency.is_optional());
        assert!(!dependency.is_primitive());
        assert!(dependency.implicit.is_none());
        assert_eq!(
            dependency.annotations(),
            &[
                Annotation::Inject { optional: true },
                Annotation::Qualifier(BindingQualifier::named("greeting")),
            ]
        );
        assert!(!Dependency::of::<u32>().primitive().is_optional());
    }
}
