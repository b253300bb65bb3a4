use std::{any::type_name, borrow::Cow, sync::Arc};

use super::{Hook, HookFn, Injectable, Supertype};
use crate::{
    any::{downcast, upcast_erased, Erased, Implements, TypeInfo},
    constructor::Args,
    context::{Annotation, ElementKind},
    dependency::Dependency,
    errors::{ConfigurationErrorKind, InstantiateErrorKind},
    plan::Resolvable,
    qualifier::BindingQualifier,
    slot::Slot,
};

/// Named parameter of a constructor or method
#[derive(Debug, Clone)]
pub struct Param {
    pub(crate) name: Cow<'static, str>,
    pub(crate) dependency: Dependency,
}

impl Param {
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub const fn dependency(&self) -> &Dependency {
        &self.dependency
    }
}

type BuildFn<T> = dyn Fn(&Args) -> Result<T, InstantiateErrorKind> + Send + Sync;

pub struct Constructor<T> {
    pub(crate) name: Cow<'static, str>,
    pub(crate) params: Vec<Param>,
    pub(crate) injectable: bool,
    pub(crate) build: Arc<BuildFn<T>>,
}

impl<T> Constructor<T> {
    /// Constructor building the value from its arguments, in the order params are declared
    #[inline]
    #[must_use]
    pub fn new<F>(name: impl Into<Cow<'static, str>>, build: F) -> Self
    where
        F: Fn(&Args) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: Vec::new(),
            injectable: false,
            build: Arc::new(build),
        }
    }

    #[inline]
    #[must_use]
    pub fn param(mut self, name: impl Into<Cow<'static, str>>, dependency: Dependency) -> Self {
        self.params.push(Param {
            name: name.into(),
            dependency,
        });
        self
    }

    /// Marks the constructor as the one the injector uses. At most one per class.
    #[inline]
    #[must_use]
    pub const fn injectable(mut self) -> Self {
        self.injectable = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }
}

type AssignFn<T> = dyn Fn(&T, Option<&Erased>) -> Result<(), InstantiateErrorKind> + Send + Sync;

/// Injected field, backed by a [`Slot`]
pub struct Field<T> {
    pub(crate) name: Cow<'static, str>,
    pub(crate) declaring: TypeInfo,
    pub(crate) dependency: Dependency,
    pub(crate) assign: Arc<AssignFn<T>>,
}

impl<T: 'static> Field<T> {
    #[must_use]
    pub fn new<R>(name: impl Into<Cow<'static, str>>, slot: fn(&T) -> &Slot<R>) -> Self
    where
        R: ?Sized + Resolvable,
    {
        Self {
            name: name.into(),
            declaring: TypeInfo::of::<T>(),
            dependency: Dependency::of::<R>(),
            assign: Arc::new(move |this: &T, value: Option<&Erased>| {
                let Some(value) = value else {
                    return Ok(());
                };
                let value = downcast::<R>(value).ok_or(InstantiateErrorKind::IncorrectArgument {
                    index: 0,
                    expected: type_name::<R>(),
                })?;
                slot(this).set(value);
                Ok(())
            }),
        }
    }
}

impl<T> Field<T> {
    #[inline]
    #[must_use]
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.dependency = self.dependency.named(name);
        self
    }

    #[inline]
    #[must_use]
    pub fn qualified_by(mut self, qualifier: BindingQualifier) -> Self {
        self.dependency = self.dependency.qualified_by(qualifier);
        self
    }

    #[inline]
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.dependency = self.dependency.optional();
        self
    }

    #[inline]
    #[must_use]
    pub fn primitive(mut self) -> Self {
        self.dependency = self.dependency.primitive();
        self
    }

    #[inline]
    #[must_use]
    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.dependency = self.dependency.annotated(annotation);
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub const fn dependency(&self) -> &Dependency {
        &self.dependency
    }
}

type CallFn<T> = dyn Fn(&T, &Args) -> Result<(), InstantiateErrorKind> + Send + Sync;

/// Injected method, called with its resolved parameters after field injection
pub struct Method<T> {
    pub(crate) name: Cow<'static, str>,
    pub(crate) declaring: TypeInfo,
    pub(crate) params: Vec<Param>,
    pub(crate) call: Arc<CallFn<T>>,
}

impl<T: 'static> Method<T> {
    #[inline]
    #[must_use]
    pub fn new<F>(name: impl Into<Cow<'static, str>>, call: F) -> Self
    where
        F: Fn(&T, &Args) -> Result<(), InstantiateErrorKind> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            declaring: TypeInfo::of::<T>(),
            params: Vec::new(),
            call: Arc::new(call),
        }
    }
}

impl<T> Method<T> {
    #[inline]
    #[must_use]
    pub fn param(mut self, name: impl Into<Cow<'static, str>>, dependency: Dependency) -> Self {
        self.params.push(Param {
            name: name.into(),
            dependency,
        });
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }
}

/// Collects the members of a class, see [`Injectable::describe`]
pub struct ClassBuilder<T> {
    pub(super) type_info: TypeInfo,
    pub(super) constructors: Vec<Constructor<T>>,
    pub(super) fields: Vec<Field<T>>,
    pub(super) methods: Vec<Method<T>>,
    pub(super) post_construct: Vec<Hook<T>>,
    pub(super) post_inject: Vec<Hook<T>>,
    pub(super) pre_destroy: Vec<Hook<T>>,
    pub(super) supertypes: Vec<Supertype>,
}

impl<T: Send + Sync + 'static> ClassBuilder<T> {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            constructors: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            post_construct: Vec::new(),
            post_inject: Vec::new(),
            pre_destroy: Vec::new(),
            supertypes: Vec::new(),
        }
    }

    pub fn constructor(&mut self, constructor: Constructor<T>) -> &mut Self {
        self.constructors.push(constructor);
        self
    }

    pub fn field(&mut self, field: Field<T>) -> &mut Self {
        self.fields.push(field);
        self
    }

    pub fn method(&mut self, method: Method<T>) -> &mut Self {
        self.methods.push(method);
        self
    }

    /// Hook called right after construction, before members are injected
    pub fn post_construct<F>(&mut self, name: impl Into<String>, priority: i32, hook: F) -> &mut Self
    where
        F: Fn(&T) -> Result<(), InstantiateErrorKind> + Send + Sync + 'static,
    {
        let hook = self.hook(name, priority, Arc::new(hook));
        self.post_construct.push(hook);
        self
    }

    /// Hook called once fields and methods are injected
    pub fn post_inject<F>(&mut self, name: impl Into<String>, priority: i32, hook: F) -> &mut Self
    where
        F: Fn(&T) -> Result<(), InstantiateErrorKind> + Send + Sync + 'static,
    {
        let hook = self.hook(name, priority, Arc::new(hook));
        self.post_inject.push(hook);
        self
    }

    /// Hook called when the scope owning the instance is torn down
    pub fn pre_destroy<F>(&mut self, name: impl Into<String>, priority: i32, hook: F) -> &mut Self
    where
        F: Fn(&T) -> Result<(), InstantiateErrorKind> + Send + Sync + 'static,
    {
        let hook = self.hook(name, priority, Arc::new(hook));
        self.pre_destroy.push(hook);
        self
    }

    /// Declares a type instances can be passed as when they're explicit constructor arguments.
    /// Declare supertypes nearest first.
    pub fn supertype<S>(&mut self) -> &mut Self
    where
        S: ?Sized + Send + Sync + 'static,
        T: Implements<S>,
    {
        self.supertypes.push(Supertype {
            type_info: TypeInfo::of::<S>(),
            upcast: upcast_erased::<T, S>,
        });
        self
    }

    /// Merges fields, methods and hooks of an embedded base after the members declared so far
    pub fn extends<B: Injectable>(&mut self, project: fn(&T) -> &B) -> &mut Self {
        let mut base = ClassBuilder::<B>::new();
        B::describe(&mut base);

        self.fields.extend(base.fields.into_iter().map(|field| {
            let assign = field.assign;
            Field {
                name: field.name,
                declaring: field.declaring,
                dependency: field.dependency,
                assign: Arc::new(move |this: &T, value: Option<&Erased>| assign(project(this), value)),
            }
        }));
        self.methods.extend(base.methods.into_iter().map(|method| {
            let call = method.call;
            Method {
                name: method.name,
                declaring: method.declaring,
                params: method.params,
                call: Arc::new(move |this: &T, args: &Args| call(project(this), args)),
            }
        }));
        self.post_construct.extend(base.post_construct.into_iter().map(|hook| project_hook(hook, project)));
        self.post_inject.extend(base.post_inject.into_iter().map(|hook| project_hook(hook, project)));
        self.pre_destroy.extend(base.pre_destroy.into_iter().map(|hook| project_hook(hook, project)));
        self
    }

    fn hook(&self, name: impl Into<String>, priority: i32, run: Arc<HookFn<T>>) -> Hook<T> {
        Hook {
            name: name.into(),
            priority,
            declaring: self.type_info,
            run,
        }
    }

    pub(super) fn validate(&self) -> Result<(), ConfigurationErrorKind> {
        if self.constructors.iter().filter(|constructor| constructor.injectable).count() > 1 {
            return Err(ConfigurationErrorKind::MultipleInjectableConstructors { target: self.type_info });
        }

        let constructor_params = self
            .constructors
            .iter()
            .flat_map(|constructor| constructor.params.iter().map(|param| (ElementKind::Constructor, param)));
        let method_params = self
            .methods
            .iter()
            .flat_map(|method| method.params.iter().map(|param| (ElementKind::Method, param)));
        for (element, param) in constructor_params.chain(method_params) {
            check_optional_primitive(self.type_info, element, &param.name, &param.dependency)?;
        }
        for field in &self.fields {
            check_optional_primitive(self.type_info, ElementKind::Field, &field.name, &field.dependency)?;
        }
        Ok(())
    }
}

fn project_hook<T: 'static, B: 'static>(hook: Hook<B>, project: fn(&T) -> &B) -> Hook<T> {
    let run = hook.run;
    Hook {
        name: hook.name,
        priority: hook.priority,
        declaring: hook.declaring,
        run: Arc::new(move |this: &T| run(project(this))),
    }
}

fn check_optional_primitive(
    target: TypeInfo,
    element: ElementKind,
    name: &str,
    dependency: &Dependency,
) -> Result<(), ConfigurationErrorKind> {
    if dependency.is_primitive() && dependency.is_optional() {
        return Err(ConfigurationErrorKind::OptionalPrimitive {
            target,
            element,
            name: name.to_owned(),
            type_info: dependency.type_info(),
        });
    }
    Ok(())
}
