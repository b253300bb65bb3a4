use std::{
    any::TypeId,
    collections::{HashSet, VecDeque},
};

use crate::{finalizer::Teardown, key::BindingKey, qualifier::BindingQualifier};

#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    pub(crate) key: BindingKey,
    pub(crate) teardown: Option<Teardown>,
}

/// Values created by trackable scopes, in creation order
#[derive(Debug, Default)]
pub(crate) struct ResolvedSet(pub(crate) VecDeque<Resolved>);

impl ResolvedSet {
    pub(crate) const fn new() -> Self {
        Self(VecDeque::new())
    }

    pub(crate) fn push(&mut self, resolved: Resolved) {
        self.0.push_back(resolved);
    }

    /// Latest created first
    pub(crate) fn drain_reversed(&mut self) -> impl Iterator<Item = Resolved> {
        std::mem::take(&mut self.0).into_iter().rev()
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

/// Optional lookups known to have no binding, oldest evicted first
#[derive(Debug)]
pub(crate) struct AbsentCache {
    capacity: usize,
    order: VecDeque<(TypeId, BindingQualifier)>,
    entries: HashSet<(TypeId, BindingQualifier)>,
}

impl AbsentCache {
    #[must_use]
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            entries: HashSet::with_capacity(capacity),
        }
    }

    #[must_use]
    pub(crate) fn contains(&self, type_id: TypeId, qualifier: &BindingQualifier) -> bool {
        self.entries.contains(&(type_id, qualifier.clone()))
    }

    pub(crate) fn insert(&mut self, type_id: TypeId, qualifier: BindingQualifier) {
        if self.capacity == 0 || !self.entries.insert((type_id, qualifier.clone())) {
            return;
        }
        self.order.push_back((type_id, qualifier));
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
