use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

use parking_lot::RwLock;

/// Cell an injected field is written into once the owning instance is shared
pub struct Slot<T: ?Sized>(RwLock<Option<Arc<T>>>);

impl<T: ?Sized> Slot<T> {
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self(RwLock::new(None))
    }

    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<Arc<T>> {
        self.0.read().clone()
    }

    #[inline]
    pub fn set(&self, value: Arc<T>) {
        *self.0.write() = Some(value);
    }

    #[inline]
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.read().is_some()
    }
}

impl<T: ?Sized> Default for Slot<T> {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> Debug for Slot<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot").field("set", &self.is_set()).finish()
    }
}
