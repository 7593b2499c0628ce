// SPDX-License-Identifier: Apache-2.0

//! Strongly-typed replacement for the original's raw-pointer-as-hex-string
//! trick (spec.md §9 REDESIGN FLAGS: "Raw pointer serialization is
//! rejected"). Components that need to exchange an in-process object
//! reference at setup time register it here and hand the resulting opaque
//! [`RegistryHandle`] to the Keymaster; a peer resolves the handle back to
//! the `Arc<T>` through the same process-local registry, never through a
//! pointer value.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// An opaque index into a [`SharedRegistry`]. The only thing ever written
/// to the Keymaster on behalf of a shared object — never an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistryHandle(u64);

impl RegistryHandle {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }
}

/// A process-wide table of `Arc<T>` values keyed by [`RegistryHandle`].
/// Typed at the call site: a component registering a `File` and one
/// registering a `Mutex<Socket>` use two distinct `SharedRegistry`
/// instances (or two type-erased entries in [`AnyRegistry`] below) rather
/// than sharing one registry of raw pointers.
pub struct SharedRegistry<T> {
    next: AtomicU64,
    entries: Mutex<HashMap<u64, Arc<T>>>,
}

impl<T> SharedRegistry<T> {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `value`, returning the handle a peer can later exchange
    /// for the same `Arc<T>`.
    pub fn register(&self, value: T) -> RegistryHandle {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().unwrap().insert(id, Arc::new(value));
        RegistryHandle(id)
    }

    pub fn get(&self, handle: RegistryHandle) -> Option<Arc<T>> {
        self.entries.lock().unwrap().get(&handle.0).cloned()
    }

    /// Drops the registry's reference. The object itself lives on until
    /// every `Arc<T>` clone handed out by `get` is also dropped.
    pub fn release(&self, handle: RegistryHandle) {
        self.entries.lock().unwrap().remove(&handle.0);
    }
}

impl<T> Default for SharedRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A type-erased variant for processes that register objects of more than
/// one type under a single table (e.g. a generic setup phase that doesn't
/// know `T` statically). `get` returns `None` on a type mismatch rather
/// than panicking.
#[derive(Default)]
pub struct AnyRegistry {
    next: AtomicU64,
    entries: Mutex<HashMap<u64, Arc<dyn Any + Send + Sync>>>,
}

impl AnyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Send + Sync + 'static>(&self, value: T) -> RegistryHandle {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .unwrap()
            .insert(id, Arc::new(value) as Arc<dyn Any + Send + Sync>);
        RegistryHandle(id)
    }

    pub fn get<T: Send + Sync + 'static>(&self, handle: RegistryHandle) -> Option<Arc<T>> {
        self.entries
            .lock()
            .unwrap()
            .get(&handle.0)
            .and_then(|v| v.clone().downcast::<T>().ok())
    }

    pub fn release(&self, handle: RegistryHandle) {
        self.entries.lock().unwrap().remove(&handle.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_get_round_trip() {
        let registry: SharedRegistry<String> = SharedRegistry::new();
        let handle = registry.register("widget".to_string());
        assert_eq!(*registry.get(handle).unwrap(), "widget");
    }

    #[test]
    fn released_handle_is_not_found() {
        let registry: SharedRegistry<u32> = SharedRegistry::new();
        let handle = registry.register(7);
        registry.release(handle);
        assert!(registry.get(handle).is_none());
    }

    #[test]
    fn handles_are_distinct_per_registration() {
        let registry: SharedRegistry<u32> = SharedRegistry::new();
        let a = registry.register(1);
        let b = registry.register(2);
        assert_ne!(a, b);
    }

    #[test]
    fn any_registry_rejects_type_mismatch() {
        let registry = AnyRegistry::new();
        let handle = registry.register(42u32);
        assert!(registry.get::<String>(handle).is_none());
        assert_eq!(*registry.get::<u32>(handle).unwrap(), 42);
    }
}
