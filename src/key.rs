use std::fmt::{self, Display, Formatter};

use crate::{any::TypeInfo, qualifier::BindingQualifier, scope::BindingScope};

/// Identity of a binding. Equality is structural on all three parts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingKey {
    pub type_info: TypeInfo,
    pub qualifier: BindingQualifier,
    pub scope: BindingScope,
}

impl BindingKey {
    #[inline]
    #[must_use]
    pub const fn new(type_info: TypeInfo, qualifier: BindingQualifier, scope: BindingScope) -> Self {
        Self {
            type_info,
            qualifier,
            scope,
        }
    }

    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(TypeInfo::of::<T>(), BindingQualifier::None, BindingScope::UNSCOPED)
    }

    #[must_use]
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl Display for BindingKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_info)?;
        if !self.qualifier.is_default() {
            write!(f, " qualified by {}", self.qualifier)?;
        }
        if self.scope != BindingScope::UNSCOPED {
            write!(f, " in scope {}", self.scope)?;
        }
        Ok(())
    }
}
