use super::InstantiateErrorKind;
use crate::{any::TypeInfo, key::BindingKey, plan::Phase};

#[derive(thiserror::Error, Debug)]
pub enum ProvisionErrorKind {
    #[error("Constructor '{constructor}' of {target} failed: {source}")]
    Constructor {
        target: TypeInfo,
        constructor: String,
        #[source]
        source: InstantiateErrorKind,
    },
    #[error("Provider of {type_info} failed: {source}")]
    Provider {
        type_info: TypeInfo,
        #[source]
        source: InstantiateErrorKind,
    },
    #[error("Injecting member '{member}' of {target} failed: {source}")]
    Member {
        target: TypeInfo,
        member: String,
        #[source]
        source: InstantiateErrorKind,
    },
    #[error("{phase} hook '{hook}' of {target} failed: {source}")]
    Hook {
        target: TypeInfo,
        hook: String,
        phase: Phase,
        #[source]
        source: InstantiateErrorKind,
    },
    #[error("Mandatory dependency {type_info} resolved to nothing")]
    Absent { type_info: TypeInfo },
    #[error("Incorrect provided type. Actual: {actual}, expected: {expected}")]
    IncorrectType { expected: TypeInfo, actual: TypeInfo },
    #[error("Provider for {key} produced no value")]
    EmptySingleton { key: BindingKey },
}
