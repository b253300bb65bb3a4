use std::collections::HashSet;

use tracing::debug;

use crate::{
    binding::{Binding, BindingBuilder},
    key::BindingKey,
    plan::Resolvable,
};

/// Source of bindings
pub trait Module {
    fn configure(&self, binder: &mut Binder);
}

impl<F> Module for F
where
    F: Fn(&mut Binder),
{
    #[inline]
    fn configure(&self, binder: &mut Binder) {
        self(binder);
    }
}

/// Ordered list of bindings a module declares
#[derive(Debug, Default)]
pub struct Binder {
    bindings: Vec<Binding>,
}

impl Binder {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { bindings: Vec::new() }
    }

    #[inline]
    pub fn bind<T: ?Sized + Resolvable>(&mut self) -> BindingBuilder<'_, T> {
        BindingBuilder::new(self)
    }

    #[inline]
    pub fn add(&mut self, binding: Binding) -> &mut Self {
        self.bindings.push(binding);
        self
    }

    /// Adds the bindings of another module after the ones declared so far
    pub fn install(&mut self, module: &dyn Module) -> &mut Self {
        module.configure(self);
        self
    }

    #[inline]
    #[must_use]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    #[inline]
    #[must_use]
    pub fn into_bindings(self) -> Vec<Binding> {
        self.bindings
    }
}

/// Bindings of all modules, each configured once in order.
///
/// A binding of a later module replaces earlier modules' bindings for the same key.
/// Collection contributions only replace earlier non-collection bindings, so contributions accumulate.
pub(crate) fn merge(modules: &[&dyn Module]) -> Vec<Binding> {
    let mut merged: Vec<Binding> = Vec::new();
    for module in modules {
        let mut binder = Binder::new();
        module.configure(&mut binder);

        let bindings = binder.into_bindings();
        let before = merged.len();
        {
            let overriding: HashSet<(&BindingKey, bool)> = bindings
                .iter()
                .map(|binding| (binding.key(), binding.is_collection()))
                .collect();
            merged.retain(|existing| {
                !overriding
                    .iter()
                    .any(|(key, collection)| *key == existing.key() && !(*collection && existing.is_collection()))
            });
        }
        if merged.len() != before {
            debug!(overridden = before - merged.len(), "Bindings overridden by a later module");
        }
        merged.extend(bindings);
    }
    merged
}
