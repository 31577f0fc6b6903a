//! Per-handle wrapper record.
//!
//! Template-based per-handle polymorphism collapses to a closed-set enum
//! over Vulkan kinds plus a per-kind wrapper variant. Rather than a generic
//! `Wrapper<K>`, this is one `Wrapper` struct tagged
//! by [`HandleKind`], with the kind-specific creation info and auxiliary
//! state held in closed-set enums (`CreateInfo`, `Aux`). Operations that
//! need "any kind" (the state block, the handle fixer) become small match
//! statements instead of trait-object dispatch tables.

use crate::handle::{HandleKind, RawHandle};
use crate::handle_fixer::TemplateEntry;
use crate::LifeGuard;
use std::collections::VecDeque;
use std::sync::Arc;

/// A deep clone of a `vkMapMemory` call's currently-active mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mapping {
    /// Opaque token standing in for the mapped pointer: `vkMapMemory.ppData`
    /// is encoded as an opaque 64-bit token, never re-used across replays.
    pub location: u64,
    pub offset: u64,
    pub size: u64,
    pub flags: u32,
}

/// A single memory-bind record, as observed by `vkBindBufferMemory`/
/// `vkBindImageMemory`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryBinding {
    pub memory: RawHandle,
    pub offset: u64,
}

/// Closures run immediately before/after a command buffer is submitted.
/// Boxed `FnMut` rather than a
/// generated enum of "kinds of work a hook can do" because the set of hooks
/// is open-ended (a user transform can attach its own).
pub type SubmitHook = Box<dyn FnMut() + Send>;

/// Kind-specific runtime-mutable state that isn't captured by the
/// create/allocate info alone.
pub enum Aux {
    None,
    Buffer {
        required_size: u64,
        bindings: Vec<MemoryBinding>,
    },
    DeviceMemory {
        size: u64,
        is_coherent: bool,
        mapping: Option<Mapping>,
    },
    CommandBuffer {
        pre: VecDeque<SubmitHook>,
        post: VecDeque<SubmitHook>,
    },
    DescriptorUpdateTemplate {
        entries: Vec<TemplateEntry>,
    },
}

impl Aux {
    pub fn for_kind(kind: HandleKind) -> Self {
        match kind {
            HandleKind::Buffer => Aux::Buffer {
                required_size: 0,
                bindings: Vec::new(),
            },
            HandleKind::DeviceMemory => Aux::DeviceMemory {
                size: 0,
                is_coherent: false,
                mapping: None,
            },
            HandleKind::CommandBuffer => Aux::CommandBuffer {
                pre: VecDeque::new(),
                post: VecDeque::new(),
            },
            HandleKind::DescriptorUpdateTemplate => Aux::DescriptorUpdateTemplate { entries: Vec::new() },
            _ => Aux::None,
        }
    }
}

/// A deep, arena-independent clone of the observable fields of whatever
/// `pCreateInfo`/`pAllocateInfo`/queue-lookup info produced this wrapper.
///
/// Only the fields this crate's representative `TransformBase` subset
/// (`transform.rs`) actually observes are modeled; a registry-driven
/// generator would instead emit one variant per `vkCreate*`/`vkAllocate*`
/// entry point with every field of its Vulkan info struct.
#[derive(Clone, Debug, Default)]
pub struct CreateInfo {
    pub size: u64,
    pub usage: u32,
    pub flags: u32,
    pub memory_type_index: u32,
    pub queue_family_index: u32,
    pub label: Option<String>,
}

/// Core-owned record shadowing one live Vulkan object.
pub struct Wrapper {
    pub kind: HandleKind,
    /// The underlying driver handle, in driver space.
    pub driver_handle: RawHandle,
    /// Function table for dispatchable kinds; `None` for non-dispatchable
    /// ones. Shared with the parent device/instance so dispatch-slot fixup
    /// is just "use the same `Arc`".
    pub dispatch_table: Option<Arc<DispatchTable>>,
    pub create_info: CreateInfo,
    /// Runtime-mutable state, behind a lock so it can be updated through a
    /// shared `Arc<Wrapper>` (the state block never hands out `&mut
    /// Wrapper`, since a handle may be looked up from several threads at
    /// once).
    pub aux: parking_lot::Mutex<Aux>,
    pub(crate) life: LifeGuard,
}

/// Stand-in for a loader dispatch table: in a real layer this is the
/// `VkDevice`/`VkInstance` function pointer block the loader installs at
/// the handle's first machine word. We only need its *identity* to
/// implement dispatch-slot fixup, not its contents.
#[derive(Debug)]
pub struct DispatchTable {
    pub first_word: u64,
}

impl Wrapper {
    pub fn new(
        kind: HandleKind,
        driver_handle: RawHandle,
        dispatch_table: Option<Arc<DispatchTable>>,
        create_info: CreateInfo,
    ) -> Self {
        Self {
            kind,
            driver_handle,
            dispatch_table,
            create_info,
            aux: parking_lot::Mutex::new(Aux::for_kind(kind)),
            life: LifeGuard::new(),
        }
    }

    pub fn life_guard(&self) -> &LifeGuard {
        &self.life
    }

    /// For every dispatchable handle returned to the application, the first
    /// machine word must equal its parent's.
    pub fn dispatch_matches_parent(&self, parent: &Arc<DispatchTable>) -> bool {
        match &self.dispatch_table {
            Some(table) => Arc::ptr_eq(table, parent) || table.first_word == parent.first_word,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_wrapper_carries_size_from_create_info() {
        let w = Wrapper::new(
            HandleKind::Buffer,
            0x1234,
            None,
            CreateInfo {
                size: 1024,
                ..Default::default()
            },
        );
        assert_eq!(w.create_info.size, 1024);
        assert!(matches!(*w.aux.lock(), Aux::Buffer { required_size: 0, .. }));
    }

    #[test]
    fn dispatchable_wrapper_shares_parent_table() {
        let table = Arc::new(DispatchTable { first_word: 0xABCD });
        let w = Wrapper::new(HandleKind::Queue, 99, Some(table.clone()), CreateInfo::default());
        assert!(w.dispatch_matches_parent(&table));
    }
}
