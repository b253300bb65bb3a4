//! Discovery of injectable classes and rules that bind them.
//!
//! Classes register themselves with [`discoverable!`](crate::discoverable), a module then binds
//! every class found under a module path with [`Binder::scan`].

use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

use tracing::debug;

use crate::{
    any::TypeInfo,
    module::Binder,
    plan::{Injectable, PlanCache},
    scope::BindingScope,
};

pub use linkme::{self, distributed_slice};

/// Entries of every class registered with [`discoverable!`](crate::discoverable)
#[distributed_slice]
pub static CLASS_ENTRIES: [fn() -> ClassEntry];

/// Registers a class for discovery, optionally with markers the binding rules look at.
///
/// # Examples
/// ```rust
/// use tincture::{discoverable, scan::Marker, ClassBuilder, Constructor, Injectable};
///
/// struct Cache;
///
/// impl Injectable for Cache {
///     fn describe(class: &mut ClassBuilder<Self>) {
///         class.constructor(Constructor::new("new", |_| Ok(Cache)));
///     }
/// }
///
/// discoverable!(Cache => [Marker::singleton()]);
/// ```
#[macro_export]
macro_rules! discoverable {
    ($ty:ty $(=> [$($marker:expr),* $(,)?])?) => {
        const _: () = {
            #[$crate::scan::distributed_slice($crate::scan::CLASS_ENTRIES)]
            #[linkme(crate = $crate::scan::linkme)]
            static ENTRY: fn() -> $crate::scan::ClassEntry = || {
                $crate::scan::ClassEntry::of::<$ty>(::std::module_path!(), ::std::vec![$($($marker),*)?])
            };
        };
    };
}

/// Marker a discovered class carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Singleton {
        lazy: bool,
    },
    /// Custom scope marker. Without a name the scope is derived from the annotation,
    /// `RequestScoped` is bound in the `request` scope.
    Scope {
        annotation: &'static str,
        name: Option<&'static str>,
        eager: bool,
    },
    Annotation(&'static str),
}

impl Marker {
    #[inline]
    #[must_use]
    pub const fn singleton() -> Self {
        Self::Singleton { lazy: true }
    }

    #[inline]
    #[must_use]
    pub const fn eager_singleton() -> Self {
        Self::Singleton { lazy: false }
    }

    #[inline]
    #[must_use]
    pub const fn scope(annotation: &'static str) -> Self {
        Self::Scope {
            annotation,
            name: None,
            eager: false,
        }
    }

    #[inline]
    #[must_use]
    pub const fn named_scope(annotation: &'static str, name: &'static str) -> Self {
        Self::Scope {
            annotation,
            name: Some(name),
            eager: false,
        }
    }

    #[inline]
    #[must_use]
    pub const fn annotation(name: &'static str) -> Self {
        Self::Annotation(name)
    }

    /// Marks a scope marker as eager. No effect on other markers.
    #[inline]
    #[must_use]
    pub const fn eager(self) -> Self {
        match self {
            Self::Scope { annotation, name, .. } => Self::Scope {
                annotation,
                name,
                eager: true,
            },
            marker => marker,
        }
    }

    fn annotation_name(&self) -> &'static str {
        match self {
            Self::Singleton { .. } => "Singleton",
            Self::Scope { annotation, .. } => annotation,
            Self::Annotation(name) => name,
        }
    }
}

/// Discovered class, able to bind itself
#[derive(Clone)]
pub struct ClassEntry {
    type_info: TypeInfo,
    module_path: &'static str,
    markers: Vec<Marker>,
    has_lifecycle: fn() -> bool,
    bind: fn(&mut Binder, BindingScope),
}

impl ClassEntry {
    #[must_use]
    pub fn of<T: Injectable>(module_path: &'static str, markers: Vec<Marker>) -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            module_path,
            markers,
            has_lifecycle: has_lifecycle::<T>,
            bind: bind_class::<T>,
        }
    }

    #[inline]
    #[must_use]
    pub const fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    #[inline]
    #[must_use]
    pub const fn module_path(&self) -> &'static str {
        self.module_path
    }

    #[inline]
    #[must_use]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    #[must_use]
    pub fn is_annotated_with(&self, annotation: &str) -> bool {
        self.markers.iter().any(|marker| marker.annotation_name() == annotation)
    }

    /// Whether the class declares post-construct, post-inject or pre-destroy hooks
    #[inline]
    #[must_use]
    pub fn has_lifecycle(&self) -> bool {
        (self.has_lifecycle)()
    }

    /// Binds the class to itself in the scope
    #[inline]
    pub fn bind(&self, binder: &mut Binder, scope: BindingScope) {
        (self.bind)(binder, scope);
    }

    fn is_under(&self, module_path: &str, recursive: bool) -> bool {
        if self.module_path == module_path {
            return true;
        }
        recursive
            && self
                .module_path
                .strip_prefix(module_path)
                .is_some_and(|rest| rest.starts_with("::"))
    }
}

impl Debug for ClassEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassEntry")
            .field("type_info", &self.type_info)
            .field("module_path", &self.module_path)
            .field("markers", &self.markers)
            .finish_non_exhaustive()
    }
}

fn has_lifecycle<T: Injectable>() -> bool {
    PlanCache::default().get::<T>().is_ok_and(|plan| plan.has_lifecycle())
}

fn bind_class<T: Injectable>(binder: &mut Binder, scope: BindingScope) {
    binder.bind::<T>().in_scope(scope).to_self();
}

/// Yields classes found under a module path
pub trait ClassScanner {
    fn scan(&self, module_path: &str, recursive: bool) -> Vec<ClassEntry>;
}

/// Scanner over classes registered with [`discoverable!`](crate::discoverable)
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkedScanner;

impl ClassScanner for LinkedScanner {
    fn scan(&self, module_path: &str, recursive: bool) -> Vec<ClassEntry> {
        let mut entries: Vec<_> = CLASS_ENTRIES
            .iter()
            .map(|entry| entry())
            .filter(|entry| entry.is_under(module_path, recursive))
            .collect();
        // Link order isn't stable across builds
        entries.sort_by(|a, b| (a.module_path, a.type_info.name).cmp(&(b.module_path, b.type_info.name)));
        entries
    }
}

/// Scanner over an explicit list, in list order
#[derive(Debug, Default, Clone)]
pub struct StaticScanner {
    entries: Vec<ClassEntry>,
}

impl StaticScanner {
    #[inline]
    #[must_use]
    pub const fn new(entries: Vec<ClassEntry>) -> Self {
        Self { entries }
    }

    #[inline]
    #[must_use]
    pub fn with(mut self, entry: ClassEntry) -> Self {
        self.entries.push(entry);
        self
    }
}

impl ClassScanner for StaticScanner {
    fn scan(&self, module_path: &str, recursive: bool) -> Vec<ClassEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.is_under(module_path, recursive))
            .cloned()
            .collect()
    }
}

/// Rule that may bind a discovered class.
/// Returns `true` if it bound the class, later rules are skipped then.
pub trait PackageBindingRule: Send + Sync + 'static {
    fn apply(&self, binder: &mut Binder, entry: &ClassEntry) -> bool;
}

impl<F> PackageBindingRule for F
where
    F: Fn(&mut Binder, &ClassEntry) -> bool + Send + Sync + 'static,
{
    #[inline]
    fn apply(&self, binder: &mut Binder, entry: &ClassEntry) -> bool {
        self(binder, entry)
    }
}

pub mod rules {
    use super::{ClassEntry, Marker, PackageBindingRule};
    use crate::{module::Binder, scope::BindingScope};

    /// Rules applied when no other rules are configured: [`singleton`], [`scoped`], [`lifecycle`]
    #[must_use]
    pub fn defaults() -> Vec<Box<dyn PackageBindingRule>> {
        vec![Box::new(singleton()), Box::new(scoped()), Box::new(lifecycle())]
    }

    /// Binds classes marked [`Marker::Singleton`], eagerly unless lazy
    #[must_use]
    pub fn singleton() -> impl PackageBindingRule {
        |binder: &mut Binder, entry: &ClassEntry| {
            let Some(lazy) = entry.markers().iter().find_map(|marker| match marker {
                Marker::Singleton { lazy } => Some(*lazy),
                _ => None,
            }) else {
                return false;
            };
            entry.bind(binder, singleton_scope(!lazy));
            true
        }
    }

    /// Binds classes marked [`Marker::Scope`] in the scope the marker names
    #[must_use]
    pub fn scoped() -> impl PackageBindingRule {
        |binder: &mut Binder, entry: &ClassEntry| {
            let Some((annotation, name, eager)) = entry.markers().iter().find_map(|marker| match marker {
                Marker::Scope { annotation, name, eager } => Some((*annotation, *name, *eager)),
                _ => None,
            }) else {
                return false;
            };

            let scope = match name {
                Some(name) => BindingScope::named(name),
                None => BindingScope::named(derive_scope_name(annotation)),
            };
            if scope == BindingScope::SINGLETON || scope == BindingScope::EAGER_SINGLETON {
                entry.bind(binder, singleton_scope(eager || scope == BindingScope::EAGER_SINGLETON));
            } else {
                entry.bind(binder, scope);
            }
            true
        }
    }

    /// Binds classes declaring lifecycle hooks to themselves
    #[must_use]
    pub fn lifecycle() -> impl PackageBindingRule {
        |binder: &mut Binder, entry: &ClassEntry| {
            if !entry.has_lifecycle() {
                return false;
            }
            entry.bind(binder, BindingScope::UNSCOPED);
            true
        }
    }

    /// Binds every class to itself, useful as the last rule
    #[must_use]
    pub fn self_binding() -> impl PackageBindingRule {
        |binder: &mut Binder, entry: &ClassEntry| {
            entry.bind(binder, BindingScope::UNSCOPED);
            true
        }
    }

    #[must_use]
    pub fn annotated_with<B>(annotation: &'static str, bind: B) -> impl PackageBindingRule
    where
        B: Fn(&mut Binder, &ClassEntry) + Send + Sync + 'static,
    {
        predicate(move |entry| entry.is_annotated_with(annotation), bind)
    }

    #[must_use]
    pub fn predicate<P, B>(predicate: P, bind: B) -> impl PackageBindingRule
    where
        P: Fn(&ClassEntry) -> bool + Send + Sync + 'static,
        B: Fn(&mut Binder, &ClassEntry) + Send + Sync + 'static,
    {
        move |binder: &mut Binder, entry: &ClassEntry| {
            if !predicate(entry) {
                return false;
            }
            bind(binder, entry);
            true
        }
    }

    const fn singleton_scope(eager: bool) -> BindingScope {
        if eager {
            BindingScope::EAGER_SINGLETON
        } else {
            BindingScope::SINGLETON
        }
    }

    /// `RequestScoped` -> `request`, `ConversationScope` -> `conversation`, `UserSession` -> `user_session`
    pub(super) fn derive_scope_name(annotation: &str) -> String {
        let name = annotation
            .strip_suffix("Scoped")
            .or_else(|| annotation.strip_suffix("Scope"))
            .unwrap_or(annotation);

        let mut derived = String::with_capacity(name.len() + 4);
        for (index, char) in name.chars().enumerate() {
            if char.is_uppercase() && index > 0 {
                derived.push('_');
            }
            derived.extend(char.to_lowercase());
        }
        derived
    }
}

type ClassFilter = Arc<dyn Fn(&ClassEntry) -> bool + Send + Sync>;

/// How [`Binder::scan`] discovers and binds classes
pub struct PackageScanOptions {
    recursive: bool,
    filter: Option<ClassFilter>,
    rules: Vec<Box<dyn PackageBindingRule>>,
    include_default_rules: bool,
}

impl PackageScanOptions {
    /// Recursive scan with the default rules
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            recursive: true,
            filter: None,
            rules: Vec::new(),
            include_default_rules: true,
        }
    }

    #[inline]
    #[must_use]
    pub const fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Replaces the filter
    #[must_use]
    pub fn filter(mut self, filter: impl Fn(&ClassEntry) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Combines the filter with the current one, both have to accept a class
    #[must_use]
    pub fn add_filter(mut self, filter: impl Fn(&ClassEntry) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(current) => Arc::new(move |entry: &ClassEntry| current(entry) && filter(entry)),
            None => Arc::new(filter),
        });
        self
    }

    #[inline]
    #[must_use]
    pub const fn include_default_rules(mut self, include: bool) -> Self {
        self.include_default_rules = include;
        self
    }

    /// Removes added rules and the default ones
    #[inline]
    #[must_use]
    pub fn clear_rules(mut self) -> Self {
        self.rules.clear();
        self.include_default_rules = false;
        self
    }

    /// Adds a rule applied after the default ones
    #[inline]
    #[must_use]
    pub fn add_rule(mut self, rule: impl PackageBindingRule) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    fn accepts(&self, entry: &ClassEntry) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(entry))
    }
}

impl Default for PackageScanOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for PackageScanOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageScanOptions")
            .field("recursive", &self.recursive)
            .field("filtered", &self.filter.is_some())
            .field("rules", &self.rules.len())
            .field("include_default_rules", &self.include_default_rules)
            .finish()
    }
}

impl Binder {
    /// Binds classes found under `module_path`, each by the first rule that accepts it
    pub fn scan(&mut self, scanner: &dyn ClassScanner, module_path: &str, options: &PackageScanOptions) -> &mut Self {
        let defaults = if options.include_default_rules {
            rules::defaults()
        } else {
            Vec::new()
        };

        let mut bound = 0usize;
        for entry in scanner.scan(module_path, options.recursive) {
            if !options.accepts(&entry) {
                continue;
            }
            if defaults.iter().chain(&options.rules).any(|rule| rule.apply(self, &entry)) {
                debug!(class = entry.type_info().name, "Discovered class bound");
                bound += 1;
            }
        }
        debug!(module_path, bound, "Package scanned");
        self
    }

    /// Binds classes registered with [`discoverable!`](crate::discoverable) under `module_path`
    /// using the default options
    #[inline]
    pub fn scan_package(&mut self, module_path: &str) -> &mut Self {
        self.scan(&LinkedScanner, module_path, &PackageScanOptions::new())
    }
}
