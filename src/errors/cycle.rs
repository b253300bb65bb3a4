use std::fmt::{self, Display, Formatter};

use crate::{any::TypeInfo, context::Origin, qualifier::BindingQualifier, scope::BindingScope};

/// How an in-progress value is being produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSource {
    Binding { scope: BindingScope },
    Implicit,
}

impl Display for StepSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StepSource::Binding { scope } => write!(f, "bound in scope {scope}"),
            StepSource::Implicit => f.write_str("implicit construction"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleStep {
    pub type_info: TypeInfo,
    pub qualifier: BindingQualifier,
    pub source: StepSource,
    pub origin: Origin,
}

impl Display for CycleStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_info)?;
        if !self.qualifier.is_default() {
            write!(f, " qualified by {}", self.qualifier)?;
        }
        write!(f, " ({}) requested by {}", self.source, self.origin)
    }
}

#[derive(thiserror::Error, Debug)]
pub struct CycleError {
    pub requested: TypeInfo,
    /// Steps from the first occurrence of the repeated request up to and including the repeat.
    pub path: Vec<CycleStep>,
}

impl Display for CycleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Dependency cycle detected while resolving {}. Cycle path:", self.requested)?;
        for (index, step) in self.path.iter().enumerate() {
            if index == 0 {
                write!(f, "\n    {step}")?;
            } else {
                write!(f, "\n -> {step}")?;
            }
        }
        Ok(())
    }
}
