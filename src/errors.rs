mod configuration;
mod cycle;
mod instantiate;
mod provision;
mod resolve;

pub use configuration::ConfigurationErrorKind;
pub use cycle::{CycleError, CycleStep, StepSource};
pub use instantiate::InstantiateErrorKind;
pub use provision::ProvisionErrorKind;
pub use resolve::ResolveErrorKind;
