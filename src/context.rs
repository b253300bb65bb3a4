use std::{
    borrow::Cow,
    fmt::{self, Display, Formatter},
    sync::Arc,
};

use crate::{any::TypeInfo, errors::ConfigurationErrorKind, qualifier::BindingQualifier};

/// Kind of element a value is injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Direct,
    Field,
    Constructor,
    Method,
    Provider,
    Eager,
}

impl Display for ElementKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ElementKind::Direct => "direct request",
            ElementKind::Field => "field",
            ElementKind::Constructor => "constructor parameter",
            ElementKind::Method => "method",
            ElementKind::Provider => "provider argument",
            ElementKind::Eager => "eager bring-up",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    Inject { optional: bool },
    Qualifier(BindingQualifier),
    Marker(Cow<'static, str>),
}

/// Object an injection is performed for.
/// Values resolved for the same owner are reused while the owner is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Root,
    Object(usize),
    Construction(u64),
}

impl Owner {
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized>(object: &Arc<T>) -> Self {
        Self::Object(Arc::as_ptr(object).cast::<()>() as usize)
    }
}

pub(crate) const OPTIONAL: &[Annotation] = &[Annotation::Inject { optional: true }];
pub(crate) const MANDATORY: &[Annotation] = &[Annotation::Inject { optional: false }];

/// Read access to where a value is being injected.
pub trait ContextView {
    /// Type receiving the injection
    fn target(&self) -> TypeInfo;

    fn owner(&self) -> Owner;

    fn element(&self) -> ElementKind;

    /// Name of the field, method or parameter
    fn name(&self) -> &str;

    fn annotations(&self) -> &[Annotation];

    /// # Errors
    /// Returns [`ConfigurationErrorKind::MultipleQualifiers`] if more than one qualifier is declared
    fn qualifier(&self) -> Result<BindingQualifier, ConfigurationErrorKind> {
        let mut qualifiers = self.annotations().iter().filter_map(|annotation| match annotation {
            Annotation::Qualifier(qualifier) => Some(qualifier),
            _ => None,
        });
        let Some(qualifier) = qualifiers.next() else {
            return Ok(BindingQualifier::None);
        };
        if qualifiers.next().is_some() {
            return Err(ConfigurationErrorKind::MultipleQualifiers {
                target: self.target(),
                element: self.element(),
                name: self.name().to_owned(),
            });
        }
        Ok(qualifier.clone())
    }

    fn is_optional(&self) -> bool {
        self.annotations()
            .iter()
            .any(|annotation| matches!(annotation, Annotation::Inject { optional: true }))
    }

    fn has_marker(&self, marker: &str) -> bool {
        self.annotations()
            .iter()
            .any(|annotation| matches!(annotation, Annotation::Marker(name) if name == marker))
    }

    /// Owned copy that can outlive the resolution call
    fn detach(&self) -> Context {
        Context {
            target: self.target(),
            owner: self.owner(),
            element: self.element(),
            name: Cow::Owned(self.name().to_owned()),
            annotations: self.annotations().to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    target: TypeInfo,
    owner: Owner,
    element: ElementKind,
    name: Cow<'static, str>,
    annotations: Vec<Annotation>,
}

impl Context {
    #[inline]
    #[must_use]
    pub fn new(target: TypeInfo) -> Self {
        Self {
            target,
            owner: Owner::Root,
            element: ElementKind::Direct,
            name: Cow::Borrowed(""),
            annotations: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(TypeInfo::of::<T>())
    }

    #[inline]
    #[must_use]
    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = owner;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_element(mut self, element: ElementKind, name: impl Into<Cow<'static, str>>) -> Self {
        self.element = element;
        self.name = name.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    #[inline]
    #[must_use]
    pub fn named(self, name: impl Into<Cow<'static, str>>) -> Self {
        self.with_annotation(Annotation::Qualifier(BindingQualifier::named(name)))
    }

    #[inline]
    #[must_use]
    pub fn optional(self) -> Self {
        self.with_annotation(Annotation::Inject { optional: true })
    }
}

impl ContextView for Context {
    fn target(&self) -> TypeInfo {
        self.target
    }

    fn owner(&self) -> Owner {
        self.owner
    }

    fn element(&self) -> ElementKind {
        self.element
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

/// Context borrowing member metadata from a cached plan
#[derive(Clone, Copy)]
pub(crate) struct MemberView<'a> {
    pub(crate) target: TypeInfo,
    pub(crate) owner: Owner,
    pub(crate) element: ElementKind,
    pub(crate) name: &'a str,
    pub(crate) annotations: &'a [Annotation],
}

impl<'a> MemberView<'a> {
    #[inline]
    #[must_use]
    pub(crate) const fn new(
        target: TypeInfo,
        owner: Owner,
        element: ElementKind,
        name: &'a str,
        annotations: &'a [Annotation],
    ) -> Self {
        Self {
            target,
            owner,
            element,
            name,
            annotations,
        }
    }
}

impl ContextView for MemberView<'_> {
    fn target(&self) -> TypeInfo {
        self.target
    }

    fn owner(&self) -> Owner {
        self.owner
    }

    fn element(&self) -> ElementKind {
        self.element
    }

    fn name(&self) -> &str {
        self.name
    }

    fn annotations(&self) -> &[Annotation] {
        self.annotations
    }
}

/// Where a request came from, kept for cycle reports
#[derive(Debug, Clone)]
pub struct Origin {
    pub element: ElementKind,
    pub name: String,
    pub declaring: TypeInfo,
}

impl Origin {
    #[must_use]
    pub(crate) fn of(view: &dyn ContextView) -> Self {
        Self {
            element: view.element(),
            name: view.name().to_owned(),
            declaring: view.target(),
        }
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.element {
            ElementKind::Direct | ElementKind::Eager => write!(f, "{} of {}", self.element, self.declaring),
            element => write!(f, "{element} '{}' of {}", self.name, self.declaring),
        }
    }
}
