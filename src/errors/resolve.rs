use super::{ConfigurationErrorKind, CycleError, InstantiateErrorKind, ProvisionErrorKind};

#[derive(thiserror::Error, Debug)]
pub enum ResolveErrorKind {
    #[error(transparent)]
    Configuration(#[from] ConfigurationErrorKind),
    #[error(transparent)]
    Provision(#[from] ProvisionErrorKind),
    #[error(transparent)]
    Cycle(#[from] CycleError),
}

impl ResolveErrorKind {
    /// Wraps an error raised by user code.
    /// Engine errors that travelled through the user code are returned unchanged.
    pub(crate) fn from_instantiate(err: InstantiateErrorKind, wrap: impl FnOnce(InstantiateErrorKind) -> ProvisionErrorKind) -> Self {
        match err {
            InstantiateErrorKind::Resolve(err) => *err,
            err => wrap(err).into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle(_))
    }

    #[inline]
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    #[inline]
    #[must_use]
    pub fn is_provision(&self) -> bool {
        matches!(self, Self::Provision(_))
    }
}
