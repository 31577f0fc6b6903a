//! Deep-copy helpers and trace-space/driver-space handle translation.
//!
//! A transform must not retain a raw parameter pointer past the call that
//! handed it over unless it first clones the pointee into memory it owns.
//! The helpers here do that cloning into a [`TemporaryAllocator`] so a
//! serializer or state tracker can hold on to a string/array after the
//! application's stack frame that produced it is long gone.
//!
//! [`HandleTranslator`] is the companion piece: every handle an application
//! hands in is a *trace-space* handle, but only the driver understands
//! *driver-space* handles. A replayer walks a trace and must mint a fresh
//! driver handle for every trace handle it first sees, then rewrite every
//! later reference.

use crate::arena::TemporaryAllocator;
use crate::handle::{HandleKind, RawHandle};
use crate::FastHashMap;

/// Clone `s` into `arena` and hand back a `'static`-shaped slice borrowed
/// from the arena's backing storage. The caller is responsible for not
/// outliving the arena: these allocations are scoped to one call or one
/// frame.
pub fn clone_str_into<'a>(arena: &'a mut TemporaryAllocator, s: &str) -> &'a str {
    let bytes = arena.alloc_slice_copy(s.as_bytes());
    std::str::from_utf8(bytes).expect("copy of valid utf8 is valid utf8")
}

pub fn clone_bytes_into<'a>(arena: &'a mut TemporaryAllocator, bytes: &[u8]) -> &'a [u8] {
    arena.alloc_slice_copy(bytes)
}

pub fn clone_slice_into<'a, T: Copy>(arena: &'a mut TemporaryAllocator, values: &[T]) -> &'a [T] {
    arena.alloc_slice_copy(values)
}

/// Maps one `HandleKind`'s handles between trace space (what a recorded
/// trace names) and driver space (what the real driver allocated on
/// replay). Capture doesn't need this — trace space and driver space
/// coincide there — but replay does, one instance per `StateBlock`.
#[derive(Default)]
pub struct HandleTranslator {
    to_driver: FastHashMap<(HandleKind, RawHandle), RawHandle>,
    to_trace: FastHashMap<(HandleKind, RawHandle), RawHandle>,
}

impl HandleTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `trace_handle` (as it appears in the recorded stream)
    /// now corresponds to `driver_handle` (as minted by the real driver
    /// during replay).
    pub fn record(&mut self, kind: HandleKind, trace_handle: RawHandle, driver_handle: RawHandle) {
        self.to_driver.insert((kind, trace_handle), driver_handle);
        self.to_trace.insert((kind, driver_handle), trace_handle);
    }

    pub fn to_driver(&self, kind: HandleKind, trace_handle: RawHandle) -> Option<RawHandle> {
        self.to_driver.get(&(kind, trace_handle)).copied()
    }

    pub fn to_trace(&self, kind: HandleKind, driver_handle: RawHandle) -> Option<RawHandle> {
        self.to_trace.get(&(kind, driver_handle)).copied()
    }

    pub fn forget(&mut self, kind: HandleKind, trace_handle: RawHandle) {
        if let Some(driver_handle) = self.to_driver.remove(&(kind, trace_handle)) {
            self.to_trace.remove(&(kind, driver_handle));
        }
    }
}
