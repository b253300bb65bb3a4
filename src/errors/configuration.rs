use crate::{any::TypeInfo, context::ElementKind, key::BindingKey, qualifier::BindingQualifier, scope::BindingScope};

#[derive(thiserror::Error, Debug)]
pub enum ConfigurationErrorKind {
    #[error("Duplicate binding registered for {key}")]
    DuplicateBinding { key: BindingKey },
    #[error("More than one qualifier declared on {element} '{name}' of {target}")]
    MultipleQualifiers {
        target: TypeInfo,
        element: ElementKind,
        name: String,
    },
    #[error("More than one injectable constructor declared on {target}")]
    MultipleInjectableConstructors { target: TypeInfo },
    #[error("{target} declares no injectable, zero-argument or single constructor")]
    NoConstructor { target: TypeInfo },
    #[error("No constructor of {target} accepts the explicit arguments [{}]", arguments.join(", "))]
    NoMatchingConstructor {
        target: TypeInfo,
        arguments: Vec<&'static str>,
    },
    #[error("Ambiguous binding for {type_info} ({qualifier}): {count} bindings match")]
    AmbiguousBinding {
        type_info: TypeInfo,
        qualifier: BindingQualifier,
        count: usize,
    },
    #[error("Collection injection isn't supported yet: {count} contributions are bound for {type_info} ({qualifier})")]
    CollectionInjectionUnsupported {
        type_info: TypeInfo,
        qualifier: BindingQualifier,
        count: usize,
    },
    #[error("Optional {element} '{name}' of {target} targets primitive type {type_info}")]
    OptionalPrimitive {
        target: TypeInfo,
        element: ElementKind,
        name: String,
        type_info: TypeInfo,
    },
    #[error("No {scope} scope is active to resolve {key}")]
    ScopeNotActive { scope: BindingScope, key: BindingKey },
    #[error("Scope {scope} has no activator and can't be opened")]
    ScopeNotActivatable { scope: BindingScope },
    #[error("Scope {scope} requires an identifier to be opened")]
    MissingScopeIdentifier { scope: BindingScope },
    #[error("Scope {scope} isn't registered")]
    UnknownScope { scope: BindingScope },
    #[error("No binding found for {type_info} ({qualifier}) and it can't be constructed implicitly")]
    NoBinding {
        type_info: TypeInfo,
        qualifier: BindingQualifier,
    },
}
