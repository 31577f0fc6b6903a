//! `TransformBase`: the polymorphic pipeline every Vulkan entry point flows
//! through.
//!
//! Every method has the Vulkan entry point's signature (narrowed to the
//! fields this crate models, see `wrapper::CreateInfo`) and a default body
//! that forwards to `next_mut()`. A concrete transform overrides whichever
//! methods it cares about and calls `next_mut()` itself where the
//! composition rules require it to keep forwarding.
//!
//! The full ~500-entry-point surface is a registry-driven code-generation
//! problem out of scope for this crate; the methods below are a
//! representative subset chosen to exercise every mechanism this layer
//! needs (object lifetime, queue/device acquisition, memory mapping,
//! command buffer lifecycle and recording, submission, and the named custom
//! hooks). Adding the next entry point is a mechanical repeat of the
//! `forward!` pattern below, which is what a generator would also produce.

use crate::handle::RawHandle;
use ash::vk;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstanceCreateInfo {
    pub application_name: String,
    pub api_version: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceCreateInfo {
    pub queue_family_index: u32,
    pub enabled_extensions: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BufferCreateInfo {
    pub size: u64,
    pub usage: u32,
    pub flags: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImageCreateInfo {
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub usage: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryAllocateInfo {
    pub allocation_size: u64,
    pub memory_type_index: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryProperties {
    pub memory_type_is_coherent: Vec<bool>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhysicalDeviceIdentity {
    pub device_id: u32,
    pub vendor_id: u32,
    pub driver_version: u32,
}

/// Error returned by the hooks that are deliberately left unimplemented
/// below.
#[derive(Clone, Copy, Debug, thiserror::Error)]
#[error("hook not implemented: {0}")]
pub struct HookError(pub &'static str);

/// One virtual method per Vulkan entry point, default body = forward to
/// `next_mut()`.
pub trait TransformBase: Send {
    /// The next collaborator in the chain, or `None` if this transform is
    /// terminal. Overrides that need to keep forwarding call this
    /// themselves; a transform MUST NOT retain the returned reference past
    /// the current call.
    fn next_mut(&mut self) -> Option<&mut dyn TransformBase>;

    fn create_instance(&mut self, info: &InstanceCreateInfo) -> (vk::Result, Option<RawHandle>) {
        log::trace!(target: "vk_trace_core::transform", "vkCreateInstance");
        match self.next_mut() {
            Some(next) => next.create_instance(info),
            None => (vk::Result::SUCCESS, None),
        }
    }

    fn create_device(
        &mut self,
        physical_device: RawHandle,
        info: &DeviceCreateInfo,
    ) -> (vk::Result, Option<RawHandle>) {
        log::trace!(target: "vk_trace_core::transform", "vkCreateDevice");
        match self.next_mut() {
            Some(next) => next.create_device(physical_device, info),
            None => (vk::Result::SUCCESS, None),
        }
    }

    fn get_device_queue(
        &mut self,
        device: RawHandle,
        family_index: u32,
        queue_index: u32,
    ) -> Option<RawHandle> {
        log::trace!(target: "vk_trace_core::transform", "vkGetDeviceQueue");
        match self.next_mut() {
            Some(next) => next.get_device_queue(device, family_index, queue_index),
            None => None,
        }
    }

    fn enumerate_physical_devices(
        &mut self,
        instance: RawHandle,
    ) -> (vk::Result, Vec<(RawHandle, PhysicalDeviceIdentity)>) {
        log::trace!(target: "vk_trace_core::transform", "vkEnumeratePhysicalDevices");
        match self.next_mut() {
            Some(next) => next.enumerate_physical_devices(instance),
            None => (vk::Result::SUCCESS, Vec::new()),
        }
    }

    fn get_physical_device_memory_properties(
        &mut self,
        physical_device: RawHandle,
    ) -> MemoryProperties {
        log::trace!(target: "vk_trace_core::transform", "vkGetPhysicalDeviceMemoryProperties");
        match self.next_mut() {
            Some(next) => next.get_physical_device_memory_properties(physical_device),
            None => MemoryProperties::default(),
        }
    }

    fn create_buffer(
        &mut self,
        device: RawHandle,
        info: &BufferCreateInfo,
    ) -> (vk::Result, Option<RawHandle>) {
        log::trace!(target: "vk_trace_core::transform", "vkCreateBuffer");
        match self.next_mut() {
            Some(next) => next.create_buffer(device, info),
            None => (vk::Result::SUCCESS, None),
        }
    }

    fn destroy_buffer(&mut self, device: RawHandle, buffer: RawHandle) {
        log::trace!(target: "vk_trace_core::transform", "vkDestroyBuffer");
        if let Some(next) = self.next_mut() {
            next.destroy_buffer(device, buffer);
        }
    }

    fn create_image(
        &mut self,
        device: RawHandle,
        info: &ImageCreateInfo,
    ) -> (vk::Result, Option<RawHandle>) {
        log::trace!(target: "vk_trace_core::transform", "vkCreateImage");
        match self.next_mut() {
            Some(next) => next.create_image(device, info),
            None => (vk::Result::SUCCESS, None),
        }
    }

    fn destroy_image(&mut self, device: RawHandle, image: RawHandle) {
        log::trace!(target: "vk_trace_core::transform", "vkDestroyImage");
        if let Some(next) = self.next_mut() {
            next.destroy_image(device, image);
        }
    }

    fn allocate_memory(
        &mut self,
        device: RawHandle,
        info: &MemoryAllocateInfo,
    ) -> (vk::Result, Option<RawHandle>) {
        log::trace!(target: "vk_trace_core::transform", "vkAllocateMemory");
        match self.next_mut() {
            Some(next) => next.allocate_memory(device, info),
            None => (vk::Result::SUCCESS, None),
        }
    }

    fn free_memory(&mut self, device: RawHandle, memory: RawHandle) {
        log::trace!(target: "vk_trace_core::transform", "vkFreeMemory");
        if let Some(next) = self.next_mut() {
            next.free_memory(device, memory);
        }
    }

    fn map_memory(
        &mut self,
        device: RawHandle,
        memory: RawHandle,
        offset: u64,
        size: u64,
        flags: u32,
    ) -> (vk::Result, Option<u64>) {
        log::trace!(target: "vk_trace_core::transform", "vkMapMemory");
        match self.next_mut() {
            Some(next) => next.map_memory(device, memory, offset, size, flags),
            None => (vk::Result::SUCCESS, None),
        }
    }

    fn unmap_memory(&mut self, device: RawHandle, memory: RawHandle) {
        log::trace!(target: "vk_trace_core::transform", "vkUnmapMemory");
        if let Some(next) = self.next_mut() {
            next.unmap_memory(device, memory);
        }
    }

    fn create_descriptor_set_layout(
        &mut self,
        device: RawHandle,
    ) -> (vk::Result, Option<RawHandle>) {
        log::trace!(target: "vk_trace_core::transform", "vkCreateDescriptorSetLayout");
        match self.next_mut() {
            Some(next) => next.create_descriptor_set_layout(device),
            None => (vk::Result::SUCCESS, None),
        }
    }

    fn create_descriptor_update_template(
        &mut self,
        device: RawHandle,
        entries: &[crate::handle_fixer::TemplateEntry],
    ) -> (vk::Result, Option<RawHandle>) {
        log::trace!(target: "vk_trace_core::transform", "vkCreateDescriptorUpdateTemplate");
        match self.next_mut() {
            Some(next) => next.create_descriptor_update_template(device, entries),
            None => (vk::Result::SUCCESS, None),
        }
    }

    /// Payload size is computed by walking the template in the state block;
    /// this method receives the already-sized payload.
    fn update_descriptor_set_with_template(
        &mut self,
        device: RawHandle,
        descriptor_set: RawHandle,
        template: RawHandle,
        data: &[u8],
    ) {
        log::trace!(target: "vk_trace_core::transform", "vkUpdateDescriptorSetWithTemplate");
        if let Some(next) = self.next_mut() {
            next.update_descriptor_set_with_template(device, descriptor_set, template, data);
        }
    }

    fn allocate_command_buffers(
        &mut self,
        device: RawHandle,
        pool: RawHandle,
        count: u32,
    ) -> (vk::Result, Vec<RawHandle>) {
        log::trace!(target: "vk_trace_core::transform", "vkAllocateCommandBuffers");
        match self.next_mut() {
            Some(next) => next.allocate_command_buffers(device, pool, count),
            None => (vk::Result::SUCCESS, Vec::new()),
        }
    }

    fn free_command_buffers(&mut self, device: RawHandle, pool: RawHandle, buffers: &[RawHandle]) {
        log::trace!(target: "vk_trace_core::transform", "vkFreeCommandBuffers");
        if let Some(next) = self.next_mut() {
            next.free_command_buffers(device, pool, buffers);
        }
    }

    fn begin_command_buffer(&mut self, cb: RawHandle) -> vk::Result {
        log::trace!(target: "vk_trace_core::transform", "vkBeginCommandBuffer");
        match self.next_mut() {
            Some(next) => next.begin_command_buffer(cb),
            None => vk::Result::SUCCESS,
        }
    }

    fn end_command_buffer(&mut self, cb: RawHandle) -> vk::Result {
        log::trace!(target: "vk_trace_core::transform", "vkEndCommandBuffer");
        match self.next_mut() {
            Some(next) => next.end_command_buffer(cb),
            None => vk::Result::SUCCESS,
        }
    }

    fn reset_command_buffer(&mut self, cb: RawHandle, flags: u32) -> vk::Result {
        log::trace!(target: "vk_trace_core::transform", "vkResetCommandBuffer");
        match self.next_mut() {
            Some(next) => next.reset_command_buffer(cb, flags),
            None => vk::Result::SUCCESS,
        }
    }

    fn cmd_begin_render_pass(&mut self, cb: RawHandle, render_pass: RawHandle, framebuffer: RawHandle) {
        log::trace!(target: "vk_trace_core::transform", "vkCmdBeginRenderPass");
        if let Some(next) = self.next_mut() {
            next.cmd_begin_render_pass(cb, render_pass, framebuffer);
        }
    }

    fn cmd_end_render_pass(&mut self, cb: RawHandle) {
        log::trace!(target: "vk_trace_core::transform", "vkCmdEndRenderPass");
        if let Some(next) = self.next_mut() {
            next.cmd_end_render_pass(cb);
        }
    }

    fn cmd_draw(
        &mut self,
        cb: RawHandle,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        log::trace!(target: "vk_trace_core::transform", "vkCmdDraw");
        if let Some(next) = self.next_mut() {
            next.cmd_draw(cb, vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    /// Payload length is `dataSize`, taken directly from the sibling
    /// parameter rather than a generic length prefix.
    fn cmd_update_buffer(&mut self, cb: RawHandle, buffer: RawHandle, offset: u64, data: &[u8]) {
        log::trace!(target: "vk_trace_core::transform", "vkCmdUpdateBuffer");
        if let Some(next) = self.next_mut() {
            next.cmd_update_buffer(cb, buffer, offset, data);
        }
    }

    /// Payload length is `size`, taken directly from the sibling parameter.
    fn cmd_push_constants(
        &mut self,
        cb: RawHandle,
        layout: RawHandle,
        stage_flags: u32,
        offset: u32,
        values: &[u8],
    ) {
        log::trace!(target: "vk_trace_core::transform", "vkCmdPushConstants");
        if let Some(next) = self.next_mut() {
            next.cmd_push_constants(cb, layout, stage_flags, offset, values);
        }
    }

    fn queue_submit(&mut self, queue: RawHandle, command_buffers: &[RawHandle]) -> vk::Result {
        log::trace!(target: "vk_trace_core::transform", "vkQueueSubmit");
        match self.next_mut() {
            Some(next) => next.queue_submit(queue, command_buffers),
            None => vk::Result::SUCCESS,
        }
    }

    /// Deliberately unimplemented: invoking this aborts with [`HookError`]
    /// rather than attempting to serialise driver-dependent result bytes.
    fn get_query_pool_results(&mut self, _query_pool: RawHandle) -> Result<(), HookError> {
        Err(HookError("vkGetQueryPoolResults"))
    }

    /// Deliberately unimplemented, for the same reason as
    /// [`Self::get_query_pool_results`].
    fn get_pipeline_cache_data(&mut self, _cache: RawHandle) -> Result<(), HookError> {
        Err(HookError("vkGetPipelineCacheData"))
    }

    /// Deliberately unimplemented, for the same reason as
    /// [`Self::get_query_pool_results`].
    fn get_memory_host_pointer_properties_ext(&mut self, _host_pointer: u64) -> Result<(), HookError> {
        Err(HookError("vkGetMemoryHostPointerPropertiesEXT"))
    }
}

/// A `TransformBase` that is always terminal and never overrides anything:
/// transparency tests check a chain ending in this type behaves exactly as
/// if the chain were one layer shorter.
pub struct NullTerminal;

impl TransformBase for NullTerminal {
    fn next_mut(&mut self) -> Option<&mut dyn TransformBase> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingTerminal {
        draws: u32,
    }

    impl TransformBase for CountingTerminal {
        fn next_mut(&mut self) -> Option<&mut dyn TransformBase> {
            None
        }

        fn cmd_draw(&mut self, _cb: RawHandle, _vc: u32, _ic: u32, _fv: u32, _fi: u32) {
            self.draws += 1;
        }
    }

    struct PassThrough<'a> {
        inner: &'a mut dyn TransformBase,
    }

    impl TransformBase for PassThrough<'_> {
        fn next_mut(&mut self) -> Option<&mut dyn TransformBase> {
            Some(self.inner)
        }
    }

    #[test]
    fn default_forwarding_reaches_the_terminal() {
        let mut terminal = CountingTerminal { draws: 0 };
        {
            let mut pass = PassThrough { inner: &mut terminal };
            pass.cmd_draw(1, 3, 1, 0, 0);
        }
        assert_eq!(terminal.draws, 1);
    }

    #[test]
    fn null_terminal_is_transparent_default() {
        let mut terminal = NullTerminal;
        let (result, handle) = terminal.create_buffer(1, &BufferCreateInfo::default());
        assert_eq!(result, vk::Result::SUCCESS);
        assert_eq!(handle, None);
    }

    #[test]
    fn unimplemented_hooks_fail_fast() {
        let mut terminal = NullTerminal;
        assert!(terminal.get_query_pool_results(1).is_err());
        assert!(terminal.get_pipeline_cache_data(1).is_err());
        assert!(terminal.get_memory_host_pointer_properties_ext(0).is_err());
    }
}
