//! Thread-safe registry mapping every live handle of every Vulkan object
//! kind to its wrapper.
//!
//! Readers take a shared lock, mutators take an exclusive one, and lookup
//! failures are reported through a small `thiserror` enum ([`InvalidHandle`])
//! rather than panicking. Handles here are driver pointers/identifiers
//! rather than dense small integers, so each kind's registry is a
//! `parking_lot::RwLock<FastHashMap<RawHandle, Entry>>` rather than a dense
//! slab.

use crate::handle::{HandleKind, RawHandle};
use crate::wrapper::Wrapper;
use crate::FastHashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug, thiserror::Error)]
pub enum InvalidHandle {
    #[error("{kind} handle {handle:#x} is not registered")]
    Unknown { kind: HandleKind, handle: RawHandle },
    #[error("{handle:#x} is registered as {actual}, not {expected}")]
    WrongKind {
        handle: RawHandle,
        expected: HandleKind,
        actual: HandleKind,
    },
    #[error("{kind} handle {handle:#x} is already registered")]
    Exists { kind: HandleKind, handle: RawHandle },
}

struct Entry {
    refcount: usize,
    wrapper: Arc<Wrapper>,
}

#[derive(Default)]
struct KindRegistry {
    entries: FastHashMap<RawHandle, Entry>,
    next_synthetic: AtomicU64,
}

/// Concurrent registry of wrappers, one map per Vulkan object kind.
///
/// Sits on the transform pipeline itself (see [`crate::state_tracker`]) so
/// it observes every create/destroy path without the application's
/// cooperation.
pub struct StateBlock {
    registries: FastHashMap<HandleKind, RwLock<KindRegistry>>,
}

impl StateBlock {
    pub fn new() -> Self {
        let registries = HandleKind::ALL
            .iter()
            .map(|&k| (k, RwLock::new(KindRegistry::default())))
            .collect();
        Self { registries }
    }

    fn registry(&self, kind: HandleKind) -> &RwLock<KindRegistry> {
        self.registries
            .get(&kind)
            .expect("HandleKind::ALL covers every kind")
    }

    /// Insert a freshly-created wrapper; fails with [`InvalidHandle::Exists`]
    /// if `handle` is already registered for this kind.
    pub fn create(&self, kind: HandleKind, handle: RawHandle, wrapper: Wrapper) -> Result<Arc<Wrapper>, InvalidHandle> {
        let mut reg = self.registry(kind).write();
        if reg.entries.contains_key(&handle) {
            return Err(InvalidHandle::Exists { kind, handle });
        }
        let arc = Arc::new(wrapper);
        reg.entries.insert(
            handle,
            Entry {
                refcount: 1,
                wrapper: arc.clone(),
            },
        );
        Ok(arc)
    }

    /// Upsert: return the existing wrapper, or insert and return `make()`'s
    /// result if absent.
    pub fn get_or_create(
        &self,
        kind: HandleKind,
        handle: RawHandle,
        make: impl FnOnce() -> Wrapper,
    ) -> Arc<Wrapper> {
        let mut reg = self.registry(kind).write();
        if let Some(entry) = reg.entries.get(&handle) {
            return entry.wrapper.clone();
        }
        let arc = Arc::new(make());
        reg.entries.insert(
            handle,
            Entry {
                refcount: 1,
                wrapper: arc.clone(),
            },
        );
        arc
    }

    pub fn get(&self, kind: HandleKind, handle: RawHandle) -> Result<Arc<Wrapper>, InvalidHandle> {
        let reg = self.registry(kind).read();
        reg.entries
            .get(&handle)
            .map(|e| e.wrapper.clone())
            .ok_or(InvalidHandle::Unknown { kind, handle })
    }

    /// Additional external reference to an already-registered handle
    /// (shared ownership, e.g. a device-group member referenced from more
    /// than one context).
    pub fn retain(&self, kind: HandleKind, handle: RawHandle) -> Result<(), InvalidHandle> {
        let mut reg = self.registry(kind).write();
        match reg.entries.get_mut(&handle) {
            Some(entry) => {
                entry.refcount += 1;
                Ok(())
            }
            None => Err(InvalidHandle::Unknown { kind, handle }),
        }
    }

    /// Decrement; remove once the refcount reaches zero.
    pub fn erase(&self, kind: HandleKind, handle: RawHandle) -> Result<(), InvalidHandle> {
        let mut reg = self.registry(kind).write();
        match reg.entries.get_mut(&handle) {
            Some(entry) => {
                entry.refcount -= 1;
                if entry.refcount == 0 {
                    reg.entries.remove(&handle);
                }
                Ok(())
            }
            None => Err(InvalidHandle::Unknown { kind, handle }),
        }
    }

    /// Bulk removal under the write lock (e.g. command-pool reset freeing
    /// every command buffer it owns).
    pub fn erase_if(&self, kind: HandleKind, mut pred: impl FnMut(RawHandle, &Wrapper) -> bool) {
        let mut reg = self.registry(kind).write();
        reg.entries.retain(|&h, e| !pred(h, &e.wrapper));
    }

    pub fn contains(&self, kind: HandleKind, handle: RawHandle) -> bool {
        self.registry(kind).read().entries.contains_key(&handle)
    }

    pub fn count(&self, kind: HandleKind) -> usize {
        self.registry(kind).read().entries.len()
    }

    /// Every live handle of `kind` currently registered. Used by
    /// completeness tests and by diagnostics; not on any application-facing
    /// hot path.
    pub fn live_handles(&self, kind: HandleKind) -> Vec<RawHandle> {
        self.registry(kind).read().entries.keys().copied().collect()
    }

    /// Mint a synthetic handle for `kind` that does not collide with any
    /// registered one — used when reconstructing device groups from replay.
    pub fn get_unused(&self, kind: HandleKind) -> RawHandle {
        let reg = self.registry(kind).read();
        loop {
            let candidate = reg.next_synthetic.fetch_add(1, Ordering::Relaxed) | (1 << 63);
            if !reg.entries.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

impl Default for StateBlock {
    fn default() -> Self {
        Self::new()
    }
}
