//! Layer-negotiation surface: the fixed table of entry points this layer
//! intercepts, plus the `VkLayerProperties` it reports to the loader.
//!
//! A cdylib built on top of this crate exports the five C symbols the
//! Vulkan loader calls by name (`vkGetInstanceProcAddr`,
//! `vkGetDeviceProcAddr`, `vkEnumerateInstanceLayerProperties`,
//! `vkEnumerateInstanceExtensionProperties`,
//! `vkEnumerateDeviceLayerProperties`) and walks the `pNext` chain of
//! `VkLayerInstanceCreateInfo`/`VkLayerDeviceCreateInfo` to find the next
//! layer's `vkGetInstanceProcAddr` to chain to — that FFI plumbing is
//! loader boilerplate outside this crate's scope. What belongs here is the
//! part that's actually this layer's logic: which names it intercepts, and
//! what it reports about itself.

use crate::frame::Opcode;
use ash::vk;
use once_cell::sync::Lazy;
use std::ffi::{CStr, CString};

pub const LAYER_NAME: &str = "VK_LAYER_vk_trace_capture";
pub const LAYER_DESCRIPTION: &str = "Vulkan API capture/replay interception layer";
pub const IMPLEMENTATION_VERSION: u32 = 1;

/// `VkLayerProperties.specVersion` this layer was built against.
pub fn spec_version() -> u32 {
    vk::API_VERSION_1_3
}

/// Build the single `VkLayerProperties` record the loader enumerates for
/// this layer. Panics if the layer name/description don't fit the fixed-
/// size C arrays, which would indicate a typo in the constants above, not a
/// runtime condition.
pub fn layer_properties() -> vk::LayerProperties {
    let mut props = vk::LayerProperties {
        spec_version: spec_version(),
        implementation_version: IMPLEMENTATION_VERSION,
        ..Default::default()
    };
    write_fixed_cstr(&mut props.layer_name, LAYER_NAME);
    write_fixed_cstr(&mut props.description, LAYER_DESCRIPTION);
    props
}

fn write_fixed_cstr(dest: &mut [std::os::raw::c_char], s: &str) {
    let c = CString::new(s).expect("layer identity strings contain no NUL bytes");
    let bytes = c.as_bytes_with_nul();
    assert!(bytes.len() <= dest.len(), "layer identity string does not fit its field");
    for (slot, &b) in dest.iter_mut().zip(bytes.iter()) {
        *slot = b as std::os::raw::c_char;
    }
}

/// `vkEnumerateInstanceLayerProperties`/`vkEnumerateDeviceLayerProperties`
/// report the same single layer — device-layer enumeration is a deprecated
/// mirror of instance-layer enumeration per the Vulkan spec, and this layer
/// doesn't distinguish the two.
pub fn enumerate_layer_properties() -> Vec<vk::LayerProperties> {
    vec![layer_properties()]
}

/// Maps an entry point's name to the [`Opcode`] this crate records it
/// under. `vkGetInstanceProcAddr`/`vkGetDeviceProcAddr` consult this to
/// decide whether to return a trampoline into this layer or chain straight
/// through to the next layer/driver.
pub struct ProcTable {
    entries: Vec<(&'static str, Opcode)>,
}

impl ProcTable {
    /// The representative entry-point subset this crate implements
    /// (`transform.rs`); a registry-driven build would populate this from
    /// the same source that generates `TransformBase`.
    pub fn new() -> Self {
        use Opcode::*;
        Self {
            entries: vec![
                ("vkCreateInstance", CreateInstance),
                ("vkCreateDevice", CreateDevice),
                ("vkGetDeviceQueue", GetDeviceQueue),
                ("vkEnumeratePhysicalDevices", EnumeratePhysicalDevices),
                (
                    "vkGetPhysicalDeviceMemoryProperties",
                    GetPhysicalDeviceMemoryProperties,
                ),
                ("vkCreateBuffer", CreateBuffer),
                ("vkDestroyBuffer", DestroyBuffer),
                ("vkCreateImage", CreateImage),
                ("vkDestroyImage", DestroyImage),
                ("vkAllocateMemory", AllocateMemory),
                ("vkFreeMemory", FreeMemory),
                ("vkMapMemory", MapMemory),
                ("vkUnmapMemory", UnmapMemory),
                ("vkCreateDescriptorSetLayout", CreateDescriptorSetLayout),
                (
                    "vkCreateDescriptorUpdateTemplate",
                    CreateDescriptorUpdateTemplate,
                ),
                (
                    "vkUpdateDescriptorSetWithTemplate",
                    UpdateDescriptorSetWithTemplate,
                ),
                ("vkAllocateCommandBuffers", AllocateCommandBuffers),
                ("vkFreeCommandBuffers", FreeCommandBuffers),
                ("vkBeginCommandBuffer", BeginCommandBuffer),
                ("vkEndCommandBuffer", EndCommandBuffer),
                ("vkResetCommandBuffer", ResetCommandBuffer),
                ("vkCmdBeginRenderPass", CmdBeginRenderPass),
                ("vkCmdEndRenderPass", CmdEndRenderPass),
                ("vkCmdDraw", CmdDraw),
                ("vkCmdUpdateBuffer", CmdUpdateBuffer),
                ("vkCmdPushConstants", CmdPushConstants),
                ("vkQueueSubmit", QueueSubmit),
                ("vkGetQueryPoolResults", GetQueryPoolResults),
                ("vkGetPipelineCacheData", GetPipelineCacheData),
                (
                    "vkGetMemoryHostPointerPropertiesEXT",
                    GetMemoryHostPointerPropertiesExt,
                ),
            ],
        }
    }

    pub fn opcode_for(&self, name: &CStr) -> Option<Opcode> {
        let name = name.to_str().ok()?;
        self.entries
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, opcode)| *opcode)
    }

    /// Whether `vkGetInstanceProcAddr`/`vkGetDeviceProcAddr` should return a
    /// trampoline for `name` rather than chaining straight through.
    pub fn intercepts(&self, name: &CStr) -> bool {
        self.opcode_for(name).is_some()
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}

/// One process-wide table, built once. `vkGetInstanceProcAddr`/
/// `vkGetDeviceProcAddr` are called far too often to rebuild this on every
/// lookup.
static PROC_TABLE: Lazy<ProcTable> = Lazy::new(ProcTable::new);

pub fn proc_table() -> &'static ProcTable {
    &PROC_TABLE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_properties_report_the_expected_name() {
        let props = layer_properties();
        let name = unsafe { CStr::from_ptr(props.layer_name.as_ptr()) };
        assert_eq!(name.to_str().unwrap(), LAYER_NAME);
    }

    #[test]
    fn proc_table_intercepts_every_modeled_entry_point() {
        let table = ProcTable::new();
        let name = CString::new("vkCreateBuffer").unwrap();
        assert!(table.intercepts(&name));
        assert_eq!(table.opcode_for(&name), Some(Opcode::CreateBuffer));
    }

    #[test]
    fn proc_table_does_not_intercept_unknown_names() {
        let table = ProcTable::new();
        let name = CString::new("vkCreatePipeline").unwrap();
        assert!(!table.intercepts(&name));
    }

    #[test]
    fn the_shared_proc_table_intercepts_modeled_entry_points() {
        let name = CString::new("vkCreateDevice").unwrap();
        assert!(proc_table().intercepts(&name));
    }

    #[test]
    fn device_and_instance_layer_enumeration_match() {
        assert_eq!(
            enumerate_layer_properties().len(),
            enumerate_layer_properties().len()
        );
    }
}
