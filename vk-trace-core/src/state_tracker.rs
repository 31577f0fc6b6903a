//! Transform that keeps a [`StateBlock`] in sync with every create/destroy/
//! bind/map call it observes, and runs the per-command-buffer submit hooks.
//!
//! This is the one transform every pipeline needs near its head: later
//! transforms (the serializer, the handle fixer) query the state block
//! rather than re-deriving object state from the raw call arguments.

use crate::handle::{HandleKind, RawHandle};
use crate::handle_fixer::TemplateEntry;
use crate::state_block::StateBlock;
use crate::transform::{
    BufferCreateInfo, MemoryAllocateInfo, MemoryProperties, TransformBase,
};
use crate::wrapper::{Aux, CreateInfo, DispatchTable, Mapping, Wrapper};
use arrayvec::ArrayVec;
use ash::vk;
use std::sync::Arc;

/// `VK_MAX_MEMORY_TYPES`: Vulkan never reports more memory types than this,
/// so the coherence cache is inline storage rather than a heap allocation.
const MAX_MEMORY_TYPES: usize = 32;

/// Memory-type coherence cache populated from
/// `vkGetPhysicalDeviceMemoryProperties`, consulted when
/// `vkMapMemory`/`vkUnmapMemory` need to know whether a flush is implied.
#[derive(Default)]
struct MemoryPropertiesCache {
    is_coherent: ArrayVec<bool, MAX_MEMORY_TYPES>,
}

/// Tracks object creation/destruction and the handful of pieces of runtime
/// state (current mapping, memory-type coherence, submit hooks) the rest of
/// the pipeline needs.
pub struct StateTracker {
    pub state: Arc<StateBlock>,
    pub next: Option<Box<dyn TransformBase>>,
    memory_properties: parking_lot::Mutex<MemoryPropertiesCache>,
    device_table: Arc<DispatchTable>,
}

impl StateTracker {
    pub fn new(state: Arc<StateBlock>, next: Option<Box<dyn TransformBase>>) -> Self {
        Self {
            state,
            next,
            memory_properties: parking_lot::Mutex::new(MemoryPropertiesCache::default()),
            device_table: Arc::new(DispatchTable { first_word: 0 }),
        }
    }

    fn coherent_for_type(&self, memory_type_index: u32) -> bool {
        self.memory_properties
            .lock()
            .is_coherent
            .get(memory_type_index as usize)
            .copied()
            .unwrap_or(false)
    }
}

impl TransformBase for StateTracker {
    fn next_mut(&mut self) -> Option<&mut dyn TransformBase> {
        self.next.as_deref_mut()
    }

    fn get_physical_device_memory_properties(&mut self, physical_device: RawHandle) -> MemoryProperties {
        let properties = match self.next.as_deref_mut() {
            Some(next) => next.get_physical_device_memory_properties(physical_device),
            None => MemoryProperties::default(),
        };
        let cache = properties
            .memory_type_is_coherent
            .iter()
            .copied()
            .take(MAX_MEMORY_TYPES)
            .collect();
        self.memory_properties.lock().is_coherent = cache;
        properties
    }

    fn create_buffer(
        &mut self,
        device: RawHandle,
        info: &BufferCreateInfo,
    ) -> (vk::Result, Option<RawHandle>) {
        let (result, handle) = match self.next.as_deref_mut() {
            Some(next) => next.create_buffer(device, info),
            None => (vk::Result::SUCCESS, None),
        };
        if let (vk::Result::SUCCESS, Some(handle)) = (result, handle) {
            let wrapper = Wrapper::new(
                HandleKind::Buffer,
                handle,
                Some(self.device_table.clone()),
                CreateInfo {
                    size: info.size,
                    usage: info.usage,
                    flags: info.flags,
                    ..Default::default()
                },
            );
            let _ = self.state.create(HandleKind::Buffer, handle, wrapper);
        }
        (result, handle)
    }

    fn destroy_buffer(&mut self, device: RawHandle, buffer: RawHandle) {
        if let Some(next) = self.next.as_deref_mut() {
            next.destroy_buffer(device, buffer);
        }
        let _ = self.state.erase(HandleKind::Buffer, buffer);
    }

    fn allocate_memory(
        &mut self,
        device: RawHandle,
        info: &MemoryAllocateInfo,
    ) -> (vk::Result, Option<RawHandle>) {
        let (result, handle) = match self.next.as_deref_mut() {
            Some(next) => next.allocate_memory(device, info),
            None => (vk::Result::SUCCESS, None),
        };
        if let (vk::Result::SUCCESS, Some(handle)) = (result, handle) {
            let mut wrapper = Wrapper::new(
                HandleKind::DeviceMemory,
                handle,
                None,
                CreateInfo {
                    size: info.allocation_size,
                    memory_type_index: info.memory_type_index,
                    ..Default::default()
                },
            );
            wrapper.aux = parking_lot::Mutex::new(Aux::DeviceMemory {
                size: info.allocation_size,
                is_coherent: self.coherent_for_type(info.memory_type_index),
                mapping: None,
            });
            let _ = self.state.create(HandleKind::DeviceMemory, handle, wrapper);
        }
        (result, handle)
    }

    fn free_memory(&mut self, device: RawHandle, memory: RawHandle) {
        if let Some(next) = self.next.as_deref_mut() {
            next.free_memory(device, memory);
        }
        let _ = self.state.erase(HandleKind::DeviceMemory, memory);
    }

    fn map_memory(
        &mut self,
        device: RawHandle,
        memory: RawHandle,
        offset: u64,
        size: u64,
        flags: u32,
    ) -> (vk::Result, Option<u64>) {
        let (result, token) = match self.next.as_deref_mut() {
            Some(next) => next.map_memory(device, memory, offset, size, flags),
            None => (vk::Result::SUCCESS, None),
        };
        if let (vk::Result::SUCCESS, Some(token)) = (result, token) {
            if let Ok(wrapper) = self.state.get(HandleKind::DeviceMemory, memory) {
                // `VK_WHOLE_SIZE` means "to the end of the allocation"; the
                // wrapper's create-time size is the only place that's known.
                let clamped_size = if size == vk::WHOLE_SIZE {
                    wrapper.create_info.size.saturating_sub(offset)
                } else {
                    size
                };
                if let Aux::DeviceMemory { mapping, .. } = &mut *wrapper.aux.lock() {
                    *mapping = Some(Mapping {
                        location: token,
                        offset,
                        size: clamped_size,
                        flags,
                    });
                }
            }
        }
        (result, token)
    }

    fn unmap_memory(&mut self, device: RawHandle, memory: RawHandle) {
        if let Some(next) = self.next.as_deref_mut() {
            next.unmap_memory(device, memory);
        }
        if let Ok(wrapper) = self.state.get(HandleKind::DeviceMemory, memory) {
            if let Aux::DeviceMemory { mapping, .. } = &mut *wrapper.aux.lock() {
                *mapping = None;
            }
        }
    }

    fn create_descriptor_update_template(
        &mut self,
        device: RawHandle,
        entries: &[TemplateEntry],
    ) -> (vk::Result, Option<RawHandle>) {
        let (result, handle) = match self.next.as_deref_mut() {
            Some(next) => next.create_descriptor_update_template(device, entries),
            None => (vk::Result::SUCCESS, None),
        };
        if let (vk::Result::SUCCESS, Some(handle)) = (result, handle) {
            let wrapper = Wrapper::new(
                HandleKind::DescriptorUpdateTemplate,
                handle,
                None,
                CreateInfo::default(),
            );
            *wrapper.aux.lock() = Aux::DescriptorUpdateTemplate {
                entries: entries.to_vec(),
            };
            let _ = self.state.create(HandleKind::DescriptorUpdateTemplate, handle, wrapper);
        }
        (result, handle)
    }

    fn allocate_command_buffers(
        &mut self,
        device: RawHandle,
        pool: RawHandle,
        count: u32,
    ) -> (vk::Result, Vec<RawHandle>) {
        let (result, handles) = match self.next.as_deref_mut() {
            Some(next) => next.allocate_command_buffers(device, pool, count),
            None => (vk::Result::SUCCESS, Vec::new()),
        };
        if result == vk::Result::SUCCESS {
            for &handle in &handles {
                let wrapper = Wrapper::new(
                    HandleKind::CommandBuffer,
                    handle,
                    Some(self.device_table.clone()),
                    CreateInfo::default(),
                );
                let _ = self.state.create(HandleKind::CommandBuffer, handle, wrapper);
            }
        }
        (result, handles)
    }

    fn free_command_buffers(&mut self, device: RawHandle, pool: RawHandle, buffers: &[RawHandle]) {
        if let Some(next) = self.next.as_deref_mut() {
            next.free_command_buffers(device, pool, buffers);
        }
        for &cb in buffers {
            let _ = self.state.erase(HandleKind::CommandBuffer, cb);
        }
    }

    fn queue_submit(&mut self, queue: RawHandle, command_buffers: &[RawHandle]) -> vk::Result {
        for &cb in command_buffers {
            if let Ok(wrapper) = self.state.get(HandleKind::CommandBuffer, cb) {
                if let Aux::CommandBuffer { pre, .. } = &mut *wrapper.aux.lock() {
                    for hook in pre.iter_mut() {
                        hook();
                    }
                }
            }
        }
        let result = match self.next.as_deref_mut() {
            Some(next) => next.queue_submit(queue, command_buffers),
            None => vk::Result::SUCCESS,
        };
        for &cb in command_buffers {
            if let Ok(wrapper) = self.state.get(HandleKind::CommandBuffer, cb) {
                if let Aux::CommandBuffer { post, .. } = &mut *wrapper.aux.lock() {
                    for hook in post.iter_mut() {
                        hook();
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::NullTerminal;

    #[test]
    fn create_buffer_registers_a_wrapper() {
        let state = Arc::new(StateBlock::new());
        let mut tracker = StateTracker::new(
            state.clone(),
            Some(Box::new(EchoBuffer { next_handle: 0x42 })),
        );
        let (result, handle) = tracker.create_buffer(
            1,
            &BufferCreateInfo {
                size: 2048,
                usage: 1,
                flags: 0,
            },
        );
        assert_eq!(result, vk::Result::SUCCESS);
        assert_eq!(handle, Some(0x42));
        let wrapper = state.get(HandleKind::Buffer, 0x42).unwrap();
        assert_eq!(wrapper.create_info.size, 2048);
    }

    #[test]
    fn destroy_buffer_deregisters_the_wrapper() {
        let state = Arc::new(StateBlock::new());
        let mut tracker = StateTracker::new(
            state.clone(),
            Some(Box::new(EchoBuffer { next_handle: 0x42 })),
        );
        tracker.create_buffer(1, &BufferCreateInfo::default());
        tracker.destroy_buffer(1, 0x42);
        assert!(state.get(HandleKind::Buffer, 0x42).is_err());
    }

    struct EchoBuffer {
        next_handle: RawHandle,
    }

    impl TransformBase for EchoBuffer {
        fn next_mut(&mut self) -> Option<&mut dyn TransformBase> {
            None
        }

        fn create_buffer(
            &mut self,
            _device: RawHandle,
            _info: &BufferCreateInfo,
        ) -> (vk::Result, Option<RawHandle>) {
            (vk::Result::SUCCESS, Some(self.next_handle))
        }
    }

    #[test]
    fn memory_properties_are_cached_for_later_allocations() {
        let state = Arc::new(StateBlock::new());
        struct EchoProps;
        impl TransformBase for EchoProps {
            fn next_mut(&mut self) -> Option<&mut dyn TransformBase> {
                None
            }
            fn get_physical_device_memory_properties(&mut self, _pd: RawHandle) -> MemoryProperties {
                MemoryProperties {
                    memory_type_is_coherent: vec![false, true],
                }
            }
            fn allocate_memory(
                &mut self,
                _device: RawHandle,
                _info: &MemoryAllocateInfo,
            ) -> (vk::Result, Option<RawHandle>) {
                (vk::Result::SUCCESS, Some(0x99))
            }
        }
        let mut tracker = StateTracker::new(state.clone(), Some(Box::new(EchoProps)));
        tracker.get_physical_device_memory_properties(1);
        tracker.allocate_memory(
            1,
            &MemoryAllocateInfo {
                allocation_size: 4096,
                memory_type_index: 1,
            },
        );
        let wrapper = state.get(HandleKind::DeviceMemory, 0x99).unwrap();
        assert!(matches!(*wrapper.aux.lock(), Aux::DeviceMemory { is_coherent: true, .. }));
    }

    #[test]
    fn with_no_downstream_terminal_is_a_no_op() {
        let state = Arc::new(StateBlock::new());
        let mut tracker = StateTracker::new(state, Some(Box::new(NullTerminal)));
        let (result, handle) = tracker.create_buffer(1, &BufferCreateInfo::default());
        assert_eq!(result, vk::Result::SUCCESS);
        assert_eq!(handle, None);
    }

    #[test]
    fn map_then_unmap_clears_the_mapping() {
        struct EchoMap;
        impl TransformBase for EchoMap {
            fn next_mut(&mut self) -> Option<&mut dyn TransformBase> {
                None
            }
            fn allocate_memory(
                &mut self,
                _device: RawHandle,
                _info: &MemoryAllocateInfo,
            ) -> (vk::Result, Option<RawHandle>) {
                (vk::Result::SUCCESS, Some(0x77))
            }
            fn map_memory(
                &mut self,
                _device: RawHandle,
                _memory: RawHandle,
                _offset: u64,
                _size: u64,
                _flags: u32,
            ) -> (vk::Result, Option<u64>) {
                (vk::Result::SUCCESS, Some(0xDEAD))
            }
        }

        let state = Arc::new(StateBlock::new());
        let mut tracker = StateTracker::new(state.clone(), Some(Box::new(EchoMap)));
        tracker.allocate_memory(1, &MemoryAllocateInfo::default());
        tracker.map_memory(1, 0x77, 0, 4096, 0);
        let wrapper = state.get(HandleKind::DeviceMemory, 0x77).unwrap();
        assert!(matches!(
            *wrapper.aux.lock(),
            Aux::DeviceMemory { mapping: Some(Mapping { location: 0xDEAD, .. }), .. }
        ));
        tracker.unmap_memory(1, 0x77);
        assert!(matches!(*wrapper.aux.lock(), Aux::DeviceMemory { mapping: None, .. }));
    }

    #[test]
    fn create_descriptor_update_template_stores_its_entries() {
        use crate::handle_fixer::DescriptorType;

        struct EchoTemplate;
        impl TransformBase for EchoTemplate {
            fn next_mut(&mut self) -> Option<&mut dyn TransformBase> {
                None
            }
            fn create_descriptor_update_template(
                &mut self,
                _device: RawHandle,
                _entries: &[TemplateEntry],
            ) -> (vk::Result, Option<RawHandle>) {
                (vk::Result::SUCCESS, Some(0x55))
            }
        }

        let state = Arc::new(StateBlock::new());
        let mut tracker = StateTracker::new(state.clone(), Some(Box::new(EchoTemplate)));
        let entries = [TemplateEntry {
            descriptor_type: DescriptorType::UniformBuffer,
            descriptor_count: 1,
            offset: 0,
            stride: DescriptorType::UniformBuffer.block_size(),
        }];
        tracker.create_descriptor_update_template(1, &entries);

        let wrapper = state.get(HandleKind::DescriptorUpdateTemplate, 0x55).unwrap();
        assert!(matches!(
            &*wrapper.aux.lock(),
            Aux::DescriptorUpdateTemplate { entries } if entries.len() == 1
        ));
    }

    #[test]
    fn submit_runs_pre_and_post_hooks_in_order() {
        let state = Arc::new(StateBlock::new());
        let wrapper = Wrapper::new(HandleKind::CommandBuffer, 0x5, None, CreateInfo::default());
        state.create(HandleKind::CommandBuffer, 0x5, wrapper).unwrap();

        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        {
            let cb = state.get(HandleKind::CommandBuffer, 0x5).unwrap();
            if let Aux::CommandBuffer { pre, post } = &mut *cb.aux.lock() {
                let order = order.clone();
                pre.push_back(Box::new(move || order.lock().push("pre")));
                let order = order.clone();
                post.push_back(Box::new(move || order.lock().push("post")));
            }
        }

        let mut tracker = StateTracker::new(state, Some(Box::new(NullTerminal)));
        tracker.queue_submit(1, &[0x5]);
        assert_eq!(*order.lock(), vec!["pre", "post"]);
    }
}
