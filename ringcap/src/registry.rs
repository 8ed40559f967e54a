// ringcap/src/registry.rs
//! The process-wide Device Registry: a mutex-guarded map from interface
//! name to a shared, reference-counted [`DeviceHandle`].
//!
//! A mutex guarding a map of keys to `Arc`-shared contexts, keyed by
//! `HashMap<String, _>` since interface names are the key here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::RingBackend;
use crate::counters::DeviceCounters;
use crate::device::DeviceHandle;
use crate::error::Result;

/// Outcome of [`DeviceRegistry::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The handle's reference count reached zero; it was torn down and
    /// removed from the registry.
    Removed,
    /// The handle is still referenced by other callers.
    StillReferenced,
    /// No handle with that name was open.
    NotFound,
}

/// Process-wide mapping from interface name to an open device handle.
///
/// Device-wide counters are tracked in a separate map, keyed the same way
/// but outliving any one open/release cycle, so reopening an interface
/// doesn't reset its published packet/drop history.
pub struct DeviceRegistry {
    backend: Arc<dyn RingBackend>,
    handles: Mutex<HashMap<String, Arc<DeviceHandle>>>,
    counters: Mutex<HashMap<String, Arc<DeviceCounters>>>,
}

impl DeviceRegistry {
    /// Creates an empty registry over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn RingBackend>) -> Self {
        Self {
            backend,
            handles: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Opens `interface_name`, incrementing its reference count if already
    /// open, or opening it fresh otherwise.
    ///
    /// The registry mutex is held across the underlying I/O on a fresh
    /// open, keeping "lookup-or-create" atomic with respect to other
    /// openers at the cost of serializing concurrent opens of different
    /// interfaces.
    pub fn open(&self, interface_name: &str, promiscuous: bool) -> Result<Arc<DeviceHandle>> {
        let mut handles = self.handles.lock().expect("registry lock poisoned");
        if let Some(handle) = handles.get(interface_name) {
            handle.incref();
            return Ok(handle.clone());
        }
        let handle = Arc::new(DeviceHandle::open(self.backend.clone(), interface_name, promiscuous)?);
        handles.insert(interface_name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Decrements `interface_name`'s reference count; tears the handle
    /// down and removes it from the registry when the count reaches zero.
    pub fn release(&self, interface_name: &str) -> ReleaseOutcome {
        let mut handles = self.handles.lock().expect("registry lock poisoned");
        let Some(handle) = handles.get(interface_name) else {
            return ReleaseOutcome::NotFound;
        };
        if handle.decref() == 0 {
            handle.teardown();
            handles.remove(interface_name);
            ReleaseOutcome::Removed
        } else {
            ReleaseOutcome::StillReferenced
        }
    }

    /// Current reference count for an open interface, or `None` if it's
    /// not open. Exposed for tests asserting refcount invariants.
    #[must_use]
    pub fn ref_count(&self, interface_name: &str) -> Option<usize> {
        self.handles
            .lock()
            .expect("registry lock poisoned")
            .get(interface_name)
            .map(|h| h.ref_count())
    }

    /// The device-wide counters for an interface, created empty on first
    /// request. Counters persist across an open/release/reopen cycle.
    #[must_use]
    pub fn counters_for(&self, interface_name: &str) -> Arc<DeviceCounters> {
        self.counters
            .lock()
            .expect("registry lock poisoned")
            .entry(interface_name.to_string())
            .or_insert_with(|| Arc::new(DeviceCounters::new()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, MockTopology};

    fn registry() -> (DeviceRegistry, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::new());
        backend.provision("eth0", MockTopology::default());
        let registry = DeviceRegistry::new(backend.clone());
        (registry, backend)
    }

    #[test]
    fn open_twice_shares_handle_and_increments_refcount() {
        let (registry, _backend) = registry();
        let a = registry.open("eth0", false).expect("open");
        assert_eq!(registry.ref_count("eth0"), Some(1));
        let b = registry.open("eth0", false).expect("open");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.ref_count("eth0"), Some(2));
    }

    #[test]
    fn release_to_zero_removes_entry() {
        let (registry, _backend) = registry();
        registry.open("eth0", false).expect("open");
        assert_eq!(registry.release("eth0"), ReleaseOutcome::Removed);
        assert_eq!(registry.ref_count("eth0"), None);
    }

    #[test]
    fn release_unknown_returns_not_found() {
        let (registry, _backend) = registry();
        assert_eq!(registry.release("eth9"), ReleaseOutcome::NotFound);
    }

    #[test]
    fn release_while_still_referenced_keeps_entry() {
        let (registry, _backend) = registry();
        registry.open("eth0", false).expect("open");
        registry.open("eth0", false).expect("open");
        assert_eq!(registry.release("eth0"), ReleaseOutcome::StillReferenced);
        assert_eq!(registry.ref_count("eth0"), Some(1));
    }
}
