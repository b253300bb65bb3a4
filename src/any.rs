use std::{
    any::{type_name, Any, TypeId},
    cmp::Ordering,
    fmt::{self, Display, Formatter},
    hash::{Hash, Hasher},
    sync::Arc,
};

#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub name: &'static str,
    pub id: TypeId,
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl PartialOrd for TypeInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Display for TypeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl TypeInfo {
    #[inline]
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self {
            name: type_name::<T>(),
            id: TypeId::of::<T>(),
        }
    }

    #[inline]
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit_once("::").map_or(self.name, |(_, name)| name)
    }
}

/// Type-erased shared value. The box always holds an `Arc<T>` so unsized targets
/// (trait objects) can be stored next to concrete types.
pub(crate) type Erased = Arc<dyn Any + Send + Sync>;

#[inline]
#[must_use]
pub(crate) fn erase<T>(value: Arc<T>) -> Erased
where
    T: ?Sized + Send + Sync + 'static,
{
    Arc::new(value)
}

#[inline]
#[must_use]
pub(crate) fn downcast<T>(value: &Erased) -> Option<Arc<T>>
where
    T: ?Sized + Send + Sync + 'static,
{
    value.downcast_ref::<Arc<T>>().cloned()
}

/// Upcast capability from a concrete type to a type it can be injected as.
///
/// Every type implements it for itself. Use [`crate::implements!`] for trait objects.
pub trait Implements<T: ?Sized>: Send + Sync + 'static {
    fn upcast(this: Arc<Self>) -> Arc<T>;
}

impl<T: Send + Sync + 'static> Implements<T> for T {
    #[inline]
    fn upcast(this: Arc<Self>) -> Arc<T> {
        this
    }
}

pub(crate) fn upcast_erased<C, T>(value: &Erased) -> Option<Erased>
where
    C: Implements<T>,
    T: ?Sized + Send + Sync + 'static,
{
    downcast::<C>(value).map(|value| erase(C::upcast(value)))
}
