//! Change-tracking registrations for store fields.
//!
//! Every tracked field is covered by an [`Effector`]: a small publish/subscribe
//! registration whose subscribers run when the field changes. Fields present
//! when the store is constructed share one effector; fields first written at
//! runtime each get their own, created lazily and disposed on delete.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Callback run when a tracked field changes. Receives the field name.
pub type Subscriber = Arc<dyn Fn(&str) + Send + Sync>;

/// A change-tracking registration.
///
/// Cloning yields another handle to the same registration.
#[derive(Clone, Default)]
pub struct Effector {
    inner: Arc<EffectorInner>,
}

#[derive(Default)]
struct EffectorInner {
    subscribers: Mutex<Vec<Subscriber>>,
    disposed: AtomicBool,
}

impl Effector {
    /// Creates a registration with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registration with a single subscriber.
    pub fn with_subscriber(subscriber: impl Fn(&str) + Send + Sync + 'static) -> Self {
        let effector = Self::new();
        effector.subscribe(subscriber);
        effector
    }

    /// Adds a subscriber. Ignored once disposed.
    pub fn subscribe(&self, subscriber: impl Fn(&str) + Send + Sync + 'static) {
        if self.is_disposed() {
            return;
        }
        self.subscribers().push(Arc::new(subscriber));
    }

    /// Runs every subscriber for `key`.
    pub fn notify(&self, key: &str) {
        if self.is_disposed() {
            return;
        }
        let subscribers = self.subscribers().clone();
        for subscriber in subscribers {
            subscriber(key);
        }
    }

    /// Drops all subscribers; later notifications are no-ops.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::Release);
        self.subscribers().clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Effector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effector")
            .field("subscribers", &self.subscriber_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Bookkeeping of which store fields are tracked.
///
/// Distinguishes the construction shape (registered once, sharing one
/// effector) from keys added at runtime (one effector each).
#[derive(Debug)]
pub struct FieldsEffector {
    initial_keys: HashSet<String>,
    initial_effector: Effector,
    runtime: HashMap<String, Effector>,
}

impl FieldsEffector {
    /// Seeds tracking for the construction shape.
    pub fn new(
        initial_keys: impl IntoIterator<Item = impl Into<String>>,
        initial_effector: Effector,
    ) -> Self {
        Self {
            initial_keys: initial_keys.into_iter().map(Into::into).collect(),
            initial_effector,
            runtime: HashMap::new(),
        }
    }

    /// True if `key` belongs to the construction shape or has an active
    /// runtime registration.
    pub fn is_tracked_field(&self, key: &str) -> bool {
        self.initial_keys.contains(key) || self.runtime.contains_key(key)
    }

    /// True if `key` was present when the store was built, whether it came
    /// from the template or from a loaded snapshot.
    pub fn is_initial_field(&self, key: &str) -> bool {
        self.initial_keys.contains(key)
    }

    /// Registers tracking for a key first written at runtime.
    ///
    /// # Panics
    ///
    /// Panics if `key` belongs to the construction shape: those keys are
    /// registered exactly once, when the store is built.
    pub fn add_effector(&mut self, key: &str, effector: Effector) {
        assert!(
            !self.initial_keys.contains(key),
            "field `{key}` is already tracked by the initial registration"
        );
        if let Some(previous) = self.runtime.insert(key.to_string(), effector) {
            previous.dispose();
        }
    }

    /// Disposes and forgets the runtime registration for `key`.
    ///
    /// Returns false if `key` had none. Initial keys keep the shared
    /// registration.
    pub fn remove_effector(&mut self, key: &str) -> bool {
        match self.runtime.remove(key) {
            Some(effector) => {
                effector.dispose();
                true
            }
            None => false,
        }
    }

    /// The registration currently covering `key`.
    pub fn effector_for(&self, key: &str) -> Option<&Effector> {
        if self.initial_keys.contains(key) {
            Some(&self.initial_effector)
        } else {
            self.runtime.get(key)
        }
    }

    /// Publishes a change of `key` to its registration, if any.
    pub fn notify(&self, key: &str) -> bool {
        match self.effector_for(key) {
            Some(effector) => {
                effector.notify(key);
                true
            }
            None => false,
        }
    }

    /// Number of keys with a runtime registration.
    pub fn runtime_count(&self) -> usize {
        self.runtime.len()
    }

    /// Disposes every registration, the shared initial one included.
    pub fn dispose_all(&mut self) {
        self.initial_effector.dispose();
        for (_, effector) in self.runtime.drain() {
            effector.dispose();
        }
    }
}
