use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::{errors::ResolveErrorKind, finalizer::Teardown, key::BindingKey, provider::Provided};

/// Values of one scope activation, keyed by binding
#[derive(Default)]
pub struct ScopeState {
    instances: Mutex<HashMap<BindingKey, Provided>>,
    /// Held while the value of a key is created
    creations: Mutex<HashMap<BindingKey, Arc<Mutex<()>>>>,
    teardowns: Mutex<Vec<Teardown>>,
    references: AtomicUsize,
    destroyed: AtomicBool,
}

impl ScopeState {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &BindingKey) -> Option<Provided> {
        self.instances.lock().get(key).map(Provided::cached)
    }

    /// Returns the value stored for `key`, computing and storing it if absent.
    ///
    /// Creation is serialised per key, concurrent callers for the same key wait for the first one
    /// and share its value. The state lock isn't held while computing, so `compute` may resolve
    /// other values of the same state.
    ///
    /// # Errors
    /// Returns the error of `compute`
    pub fn get_or_compute<F>(&self, key: &BindingKey, compute: F) -> Result<Option<Provided>, ResolveErrorKind>
    where
        F: FnOnce() -> Result<Option<Provided>, ResolveErrorKind>,
    {
        if let Some(provided) = self.get(key) {
            debug!("Found in scope state");
            return Ok(Some(provided));
        }

        let creation = self.creations.lock().entry(key.clone()).or_default().clone();
        let _guard = creation.lock();
        if let Some(provided) = self.get(key) {
            debug!("Found in scope state after waiting");
            return Ok(Some(provided));
        }

        let Some(provided) = compute()? else {
            return Ok(None);
        };

        self.instances.lock().insert(key.clone(), provided.cached());
        if let (true, Some(teardown)) = (provided.is_created(), provided.teardown()) {
            self.teardowns.lock().push(teardown.clone());
        }
        debug!("Stored in scope state");
        Ok(Some(provided))
    }

    #[inline]
    pub fn retain(&self) {
        self.references.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns `true` when the last reference was released
    #[inline]
    pub fn release(&self) -> bool {
        self.references
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| Some(count.saturating_sub(1)))
            .map_or(false, |previous| previous <= 1)
    }

    #[inline]
    #[must_use]
    pub fn references(&self) -> usize {
        self.references.load(Ordering::Acquire)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Runs pre-destroy work in reverse creation order and drops the stored values.
    /// Only the first call has an effect.
    ///
    /// # Errors
    /// Returns the first teardown error, remaining teardowns are skipped
    pub fn destroy(&self) -> Result<(), ResolveErrorKind> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut teardowns = std::mem::take(&mut *self.teardowns.lock());
        let result = loop {
            let Some(teardown) = teardowns.pop() else {
                break Ok(());
            };
            if let Err(err) = teardown.run() {
                error!("{}", err);
                break Err(err);
            }
            debug!(dependency = teardown.type_info().name, "Teardown called");
        };
        self.instances.lock().clear();
        self.creations.lock().clear();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::ScopeState;
    use crate::{any::TypeInfo, finalizer::Teardown, key::BindingKey, provider::Provided};

    use std::{
        sync::{
            atomic::{AtomicU8, Ordering},
            Arc, Barrier,
        },
        thread,
        time::Duration,
    };
    use tracing_test::traced_test;

    struct Request;
    struct Response;

    fn tracked<T: Send + Sync + 'static>(value: T, position: Arc<AtomicU8>, counter: Arc<AtomicU8>) -> Provided {
        Provided::new(Arc::new(value)).with_teardown(Teardown::new(TypeInfo::of::<T>(), move || {
            position.store(counter.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
            Ok(())
        }))
    }

    #[test]
    #[traced_test]
    fn test_get_or_compute_once() {
        let state = ScopeState::new();
        let key = BindingKey::of::<Request>();
        let call_count = AtomicU8::new(0);

        let first = state
            .get_or_compute(&key, || {
                call_count.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Provided::new(Arc::new(Request))))
            })
            .unwrap()
            .unwrap();
        let second = state
            .get_or_compute(&key, || {
                call_count.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Provided::new(Arc::new(Request))))
            })
            .unwrap()
            .unwrap();

        assert!(first.is_created());
        assert!(!second.is_created());
        assert!(Arc::ptr_eq(&first.get::<Request>().unwrap(), &second.get::<Request>().unwrap()));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(logs_contain("Found in scope state"));
    }

    #[test]
    #[traced_test]
    fn test_destroy_in_reverse_order() {
        let state = ScopeState::new();
        let counter = Arc::new(AtomicU8::new(0));
        let request_position = Arc::new(AtomicU8::new(0));
        let response_position = Arc::new(AtomicU8::new(0));

        state
            .get_or_compute(&BindingKey::of::<Request>(), || {
                Ok(Some(tracked(Request, request_position.clone(), counter.clone())))
            })
            .unwrap();
        state
            .get_or_compute(&BindingKey::of::<Response>(), || {
                Ok(Some(tracked(Response, response_position.clone(), counter.clone())))
            })
            .unwrap();

        state.destroy().unwrap();
        state.destroy().unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(response_position.load(Ordering::SeqCst), 1);
        assert_eq!(request_position.load(Ordering::SeqCst), 2);
        assert!(state.is_destroyed());
        assert!(state.is_empty());
    }

    #[test]
    #[traced_test]
    fn test_get_or_compute_once_across_threads() {
        let state = ScopeState::new();
        let key = BindingKey::of::<Request>();
        let call_count = AtomicU8::new(0);
        let barrier = Barrier::new(8);

        let values: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        state
                            .get_or_compute(&key, || {
                                call_count.fetch_add(1, Ordering::SeqCst);
                                thread::sleep(Duration::from_millis(20));
                                Ok(Some(Provided::new(Arc::new(Request))))
                            })
                            .unwrap()
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(values.iter().filter(|provided| provided.is_created()).count(), 1);
        let first = values[0].get::<Request>().unwrap();
        assert!(values
            .iter()
            .all(|provided| Arc::ptr_eq(&first, &provided.get::<Request>().unwrap())));
    }

    #[test]
    fn test_references() {
        let state = ScopeState::new();
        state.retain();
        state.retain();

        assert!(!state.release());
        assert!(state.release());
        assert_eq!(state.references(), 0);
    }
}
