use super::ResolveErrorKind;

/// Error returned by user-supplied constructors, providers, member setters and lifecycle hooks.
#[derive(thiserror::Error, Debug)]
pub enum InstantiateErrorKind {
    #[error("Argument {index} is missing")]
    MissingArgument { index: usize },
    #[error("Argument {index} is not of type {expected}")]
    IncorrectArgument { index: usize, expected: &'static str },
    #[error(transparent)]
    Resolve(Box<ResolveErrorKind>),
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
}

impl From<ResolveErrorKind> for InstantiateErrorKind {
    #[inline]
    fn from(err: ResolveErrorKind) -> Self {
        Self::Resolve(Box::new(err))
    }
}

impl From<std::convert::Infallible> for InstantiateErrorKind {
    #[inline]
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}
