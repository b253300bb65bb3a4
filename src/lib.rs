#[macro_use]
pub(crate) mod macros;

pub(crate) mod any;
pub(crate) mod binding;
pub(crate) mod cache;
pub(crate) mod config;
pub(crate) mod constructor;
pub(crate) mod context;
pub(crate) mod dependency;
pub(crate) mod dependency_resolver;
pub(crate) mod errors;
pub(crate) mod finalizer;
pub(crate) mod injector;
pub(crate) mod instantiator;
pub(crate) mod key;
pub(crate) mod module;
pub(crate) mod plan;
pub(crate) mod provider;
pub(crate) mod qualifier;
pub(crate) mod registry;
pub(crate) mod resolution;
pub(crate) mod slot;

pub mod scan;
pub mod scope;

pub use any::{Implements, TypeInfo};
pub use binding::{Binding, BindingBuilder};
pub use config::Config;
pub use constructor::{Arg, Args};
pub use context::{Annotation, Context, ContextView, ElementKind, Origin, Owner};
pub use dependency::Dependency;
pub use dependency_resolver::{DependencyResolver, Inject, InjectOptional};
pub use errors::{
    ConfigurationErrorKind, CycleError, CycleStep, InstantiateErrorKind, ProvisionErrorKind, ResolveErrorKind, StepSource,
};
pub use finalizer::{Finalizer, Teardown};
pub use injector::{BoundProvider, Injector, InjectorBuilder};
pub use instantiator::Instantiator;
pub use key::BindingKey;
pub use module::{Binder, Module};
pub use plan::{ClassBuilder, Constructor, Field, ImplicitConstruction, Injectable, Method, Param, Phase, Resolvable};
pub use provider::{BoxedProvider, Provided, Provider};
pub use qualifier::{BindingQualifier, QualifierValue};
pub use registry::BindingRegistry;
pub use resolution::Resolution;
pub use scope::{BindingScope, ScopeHandle, ScopeId};
pub use slot::Slot;
