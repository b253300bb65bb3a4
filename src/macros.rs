macro_rules! all_the_tuples {
    ($name:ident) => {
        $name!([]);
        $name!([T1]);
        $name!([T1, T2]);
        $name!([T1, T2, T3]);
        $name!([T1, T2, T3, T4]);
        $name!([T1, T2, T3, T4, T5]);
        $name!([T1, T2, T3, T4, T5, T6]);
        $name!([T1, T2, T3, T4, T5, T6, T7]);
        $name!([T1, T2, T3, T4, T5, T6, T7, T8]);
        $name!([T1, T2, T3, T4, T5, T6, T7, T8, T9]);
        $name!([T1, T2, T3, T4, T5, T6, T7, T8, T9, T10]);
        $name!([T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11]);
        $name!([T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12]);
    };
}

/// Implements [`crate::Implements`] for a concrete type, letting bindings and explicit
/// constructor arguments use it where one of the listed types is expected.
///
/// # Examples
/// ```rust
/// use tincture::implements;
///
/// trait UserRepo: Send + Sync {}
///
/// struct PostgresUserRepo;
///
/// impl UserRepo for PostgresUserRepo {}
///
/// implements!(PostgresUserRepo => dyn UserRepo);
/// ```
#[macro_export]
macro_rules! implements {
    ($ty:ty => $($target:ty),+ $(,)?) => {
        $(
            impl $crate::Implements<$target> for $ty {
                #[inline]
                fn upcast(this: ::std::sync::Arc<Self>) -> ::std::sync::Arc<$target> {
                    this
                }
            }
        )+
    };
}

/// Marks types (usually trait objects) as requestable from an injector.
/// Such types are only provided through bindings, they are never constructed implicitly.
///
/// # Examples
/// ```rust
/// use tincture::resolvable;
///
/// trait Clock: Send + Sync {}
///
/// resolvable!(dyn Clock);
/// ```
#[macro_export]
macro_rules! resolvable {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Resolvable for $ty {}
        )+
    };
}
