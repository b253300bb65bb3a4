use std::{any::TypeId, collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use tracing::{debug, error};

use crate::{binding::Binding, errors::ConfigurationErrorKind, qualifier::BindingQualifier, scope::BindingScope};

struct ScopeEntry {
    scope: BindingScope,
    bindings: Vec<(u64, Arc<Binding>)>,
}

#[derive(Default)]
struct Index {
    by_type: HashMap<TypeId, HashMap<BindingQualifier, Vec<ScopeEntry>>>,
    ordered: Vec<Arc<Binding>>,
    next: u64,
}

impl Index {
    fn existing(&self, binding: &Binding) -> &[(u64, Arc<Binding>)] {
        let key = binding.key();
        self.by_type
            .get(&key.type_info.id)
            .and_then(|qualifiers| qualifiers.get(&key.qualifier))
            .and_then(|scopes| scopes.iter().find(|entry| entry.scope == key.scope))
            .map_or(&[][..], |entry| entry.bindings.as_slice())
    }

    fn check(&self, binding: &Binding) -> Result<(), ConfigurationErrorKind> {
        let existing = self.existing(binding);
        if existing.is_empty() || (binding.is_collection() && existing.iter().all(|(_, existing)| existing.is_collection())) {
            return Ok(());
        }
        Err(ConfigurationErrorKind::DuplicateBinding {
            key: binding.key().clone(),
        })
    }

    fn insert(&mut self, binding: Binding) {
        let binding = Arc::new(binding);
        let sequence = self.next;
        self.next += 1;

        let key = binding.key();
        let scopes = self
            .by_type
            .entry(key.type_info.id)
            .or_default()
            .entry(key.qualifier.clone())
            .or_default();
        match scopes.iter_mut().find(|entry| entry.scope == key.scope) {
            Some(entry) => entry.bindings.push((sequence, binding.clone())),
            None => scopes.push(ScopeEntry {
                scope: key.scope.clone(),
                bindings: vec![(sequence, binding.clone())],
            }),
        }
        self.ordered.push(binding);
    }
}

/// Bindings indexed by type, then qualifier, then scope
#[derive(Default)]
pub struct BindingRegistry {
    index: RwLock<Index>,
}

impl BindingRegistry {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns [`ConfigurationErrorKind::DuplicateBinding`] if a binding with the same key exists,
    /// unless both are collection contributions
    pub fn add(&self, binding: Binding) -> Result<(), ConfigurationErrorKind> {
        let mut index = self.index.write();
        if let Err(err) = index.check(&binding) {
            error!("{}", err);
            return Err(err);
        }
        debug!(key = %binding.key(), "Binding added");
        index.insert(binding);
        Ok(())
    }

    /// Adds every binding or none of them
    ///
    /// # Errors
    /// Returns [`ConfigurationErrorKind::DuplicateBinding`] for the first conflicting binding
    pub fn add_all(&self, bindings: impl IntoIterator<Item = Binding>) -> Result<(), ConfigurationErrorKind> {
        let mut index = self.index.write();
        let mut staged = Index::default();
        let mut accepted = Vec::new();
        for binding in bindings {
            if let Err(err) = index.check(&binding).and_then(|()| staged.check(&binding)) {
                error!("{}", err);
                return Err(err);
            }
            staged.insert(binding.clone());
            accepted.push(binding);
        }

        let count = accepted.len();
        for binding in accepted {
            index.insert(binding);
        }
        debug!(count, "Bindings added");
        Ok(())
    }

    /// Bindings in insertion order. [`BindingScope::ANY`] matches every scope.
    #[must_use]
    pub fn find(&self, type_id: TypeId, qualifier: &BindingQualifier, scope: &BindingScope) -> Vec<Arc<Binding>> {
        let index = self.index.read();
        let Some(scopes) = index
            .by_type
            .get(&type_id)
            .and_then(|qualifiers| qualifiers.get(qualifier))
        else {
            return Vec::new();
        };

        if !scope.is_any() {
            return scopes
                .iter()
                .find(|entry| entry.scope == *scope)
                .map(|entry| entry.bindings.iter().map(|(_, binding)| binding.clone()).collect())
                .unwrap_or_default();
        }

        let mut found: Vec<_> = scopes.iter().flat_map(|entry| entry.bindings.iter().cloned()).collect();
        found.sort_unstable_by_key(|(sequence, _)| *sequence);
        found.into_iter().map(|(_, binding)| binding).collect()
    }

    /// Every binding in insertion order
    #[must_use]
    pub fn all(&self) -> Vec<Arc<Binding>> {
        self.index.read().ordered.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().ordered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::BindingRegistry;
    use crate::{
        any::TypeInfo,
        binding::Binding,
        errors::ConfigurationErrorKind,
        key::BindingKey,
        provider::{BoxedProvider, ImmutableInstanceProvider},
        qualifier::BindingQualifier,
        scope::BindingScope,
    };

    use std::{any::TypeId, sync::Arc};

    fn binding(qualifier: BindingQualifier, scope: BindingScope) -> Binding {
        let provider: BoxedProvider = Arc::new(ImmutableInstanceProvider::new(Arc::new(0u32)));
        Binding::new(BindingKey::new(TypeInfo::of::<u32>(), qualifier, scope), provider)
    }

    #[test]
    fn test_duplicate_binding() {
        let registry = BindingRegistry::new();
        registry.add(binding(BindingQualifier::None, BindingScope::SINGLETON)).unwrap();

        assert!(matches!(
            registry.add(binding(BindingQualifier::None, BindingScope::SINGLETON)),
            Err(ConfigurationErrorKind::DuplicateBinding { .. })
        ));
        registry.add(binding(BindingQualifier::None, BindingScope::UNSCOPED)).unwrap();
        registry.add(binding(BindingQualifier::named("other"), BindingScope::SINGLETON)).unwrap();
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_collection_contributions() {
        let registry = BindingRegistry::new();
        registry
            .add(binding(BindingQualifier::None, BindingScope::UNSCOPED).into_collection())
            .unwrap();
        registry
            .add(binding(BindingQualifier::None, BindingScope::UNSCOPED).into_collection())
            .unwrap();

        assert!(registry.add(binding(BindingQualifier::None, BindingScope::UNSCOPED)).is_err());
        assert_eq!(
            registry
                .find(TypeId::of::<u32>(), &BindingQualifier::None, &BindingScope::UNSCOPED)
                .len(),
            2
        );
    }

    #[test]
    fn test_add_all_is_atomic() {
        let registry = BindingRegistry::new();
        let result = registry.add_all([
            binding(BindingQualifier::None, BindingScope::UNSCOPED),
            binding(BindingQualifier::named("a"), BindingScope::UNSCOPED),
            binding(BindingQualifier::None, BindingScope::UNSCOPED),
        ]);

        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_find_any_scope() {
        let registry = BindingRegistry::new();
        registry
            .add_all([
                binding(BindingQualifier::None, BindingScope::SINGLETON),
                binding(BindingQualifier::named("a"), BindingScope::UNSCOPED),
                binding(BindingQualifier::None, BindingScope::REQUEST),
                binding(BindingQualifier::None, BindingScope::UNSCOPED),
            ])
            .unwrap();

        let found = registry.find(TypeId::of::<u32>(), &BindingQualifier::None, &BindingScope::ANY);
        let scopes: Vec<_> = found.iter().map(|binding| binding.key().scope.clone()).collect();
        assert_eq!(scopes, [BindingScope::SINGLETON, BindingScope::REQUEST, BindingScope::UNSCOPED]);

        assert!(registry
            .find(TypeId::of::<u8>(), &BindingQualifier::None, &BindingScope::ANY)
            .is_empty());
        assert_eq!(registry.all().len(), 4);
    }
}
