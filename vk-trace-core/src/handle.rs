//! Vulkan handle identities.
//!
//! Every Vulkan object kind has a fixed opaque identity. Dispatchable
//! handles (instance, physical device, device, queue, command buffer) carry
//! a driver-owned dispatch slot in their first machine word; non-dispatchable
//! handles are plain 64-bit identifiers. `ash::vk::Handle` already gives us
//! `as_raw`/`from_raw` on every concrete Vulkan handle type, so `RawHandle`
//! is just the `u64` those round-trip through.

use ash::vk;

/// The 64-bit identity underlying every Vulkan handle, dispatchable or not.
pub type RawHandle = u64;

/// Closed set of Vulkan object kinds the state block knows how to track.
///
/// Template-based per-handle polymorphism collapses to a closed-set enum
/// here: operations that need to act on "any kind" dispatch over this enum
/// instead of over a type parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandleKind {
    Instance,
    PhysicalDevice,
    Device,
    Queue,
    CommandBuffer,
    Buffer,
    BufferView,
    Image,
    ImageView,
    DeviceMemory,
    Sampler,
    SamplerYcbcrConversion,
    Fence,
    Semaphore,
    Event,
    Pipeline,
    PipelineLayout,
    PipelineCache,
    DescriptorPool,
    DescriptorSet,
    DescriptorSetLayout,
    DescriptorUpdateTemplate,
    RenderPass,
    Framebuffer,
    QueryPool,
    SwapchainKhr,
    SurfaceKhr,
    ShaderModule,
    CommandPool,
}

impl HandleKind {
    /// Whether this kind's handles carry a driver dispatch slot in their
    /// first machine word.
    pub const fn is_dispatchable(self) -> bool {
        matches!(
            self,
            HandleKind::Instance
                | HandleKind::PhysicalDevice
                | HandleKind::Device
                | HandleKind::Queue
                | HandleKind::CommandBuffer
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            HandleKind::Instance => "VkInstance",
            HandleKind::PhysicalDevice => "VkPhysicalDevice",
            HandleKind::Device => "VkDevice",
            HandleKind::Queue => "VkQueue",
            HandleKind::CommandBuffer => "VkCommandBuffer",
            HandleKind::Buffer => "VkBuffer",
            HandleKind::BufferView => "VkBufferView",
            HandleKind::Image => "VkImage",
            HandleKind::ImageView => "VkImageView",
            HandleKind::DeviceMemory => "VkDeviceMemory",
            HandleKind::Sampler => "VkSampler",
            HandleKind::SamplerYcbcrConversion => "VkSamplerYcbcrConversion",
            HandleKind::Fence => "VkFence",
            HandleKind::Semaphore => "VkSemaphore",
            HandleKind::Event => "VkEvent",
            HandleKind::Pipeline => "VkPipeline",
            HandleKind::PipelineLayout => "VkPipelineLayout",
            HandleKind::PipelineCache => "VkPipelineCache",
            HandleKind::DescriptorPool => "VkDescriptorPool",
            HandleKind::DescriptorSet => "VkDescriptorSet",
            HandleKind::DescriptorSetLayout => "VkDescriptorSetLayout",
            HandleKind::DescriptorUpdateTemplate => "VkDescriptorUpdateTemplate",
            HandleKind::RenderPass => "VkRenderPass",
            HandleKind::Framebuffer => "VkFramebuffer",
            HandleKind::QueryPool => "VkQueryPool",
            HandleKind::SwapchainKhr => "VkSwapchainKHR",
            HandleKind::SurfaceKhr => "VkSurfaceKHR",
            HandleKind::ShaderModule => "VkShaderModule",
            HandleKind::CommandPool => "VkCommandPool",
        }
    }

    /// All kinds the state block maintains a registry for. Used to build a
    /// `StateBlock`'s per-kind map set and by diagnostics that want to walk
    /// every registry (`erase_if`, completeness checks in property tests).
    pub const ALL: &'static [HandleKind] = &[
        HandleKind::Instance,
        HandleKind::PhysicalDevice,
        HandleKind::Device,
        HandleKind::Queue,
        HandleKind::CommandBuffer,
        HandleKind::Buffer,
        HandleKind::BufferView,
        HandleKind::Image,
        HandleKind::ImageView,
        HandleKind::DeviceMemory,
        HandleKind::Sampler,
        HandleKind::SamplerYcbcrConversion,
        HandleKind::Fence,
        HandleKind::Semaphore,
        HandleKind::Event,
        HandleKind::Pipeline,
        HandleKind::PipelineLayout,
        HandleKind::PipelineCache,
        HandleKind::DescriptorPool,
        HandleKind::DescriptorSet,
        HandleKind::DescriptorSetLayout,
        HandleKind::DescriptorUpdateTemplate,
        HandleKind::RenderPass,
        HandleKind::Framebuffer,
        HandleKind::QueryPool,
        HandleKind::SwapchainKhr,
        HandleKind::SurfaceKhr,
        HandleKind::ShaderModule,
        HandleKind::CommandPool,
    ];
}

impl std::fmt::Display for HandleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Convert a concrete `ash` handle type to the raw 64-bit identity we encode
/// and store everywhere.
pub fn raw_of<T: vk::Handle>(handle: T) -> RawHandle {
    handle.as_raw()
}

/// Reconstruct a concrete `ash` handle type from its raw 64-bit identity.
///
/// # Safety
/// The caller must know `raw` was originally produced from a handle of type
/// `T` (or is `T::from_raw(0)`, the null handle).
pub unsafe fn handle_of<T: vk::Handle>(raw: RawHandle) -> T {
    T::from_raw(raw)
}

/// Which namespace a `RawHandle` currently lives in.
///
/// A handle passed into the layer from the application is in trace space; a
/// handle passed to the next layer/driver is in driver space. The mapping
/// between the two is a reversible reinterpretation performed by the
/// `StateBlock`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Space {
    Trace,
    Driver,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatchable_kinds_match_spec() {
        assert!(HandleKind::Instance.is_dispatchable());
        assert!(HandleKind::Device.is_dispatchable());
        assert!(HandleKind::Queue.is_dispatchable());
        assert!(HandleKind::CommandBuffer.is_dispatchable());
        assert!(!HandleKind::Buffer.is_dispatchable());
        assert!(!HandleKind::DeviceMemory.is_dispatchable());
    }

    #[test]
    fn raw_round_trips_through_ash_handle() {
        let buffer = vk::Buffer::from_raw(0xdead_beef);
        let raw = raw_of(buffer);
        let back: vk::Buffer = unsafe { handle_of(raw) };
        assert_eq!(buffer, back);
    }

    #[test]
    fn all_lists_every_kind_exactly_once() {
        let mut seen = FastSet::default();
        for &k in HandleKind::ALL {
            assert!(seen.insert(k), "{k} listed twice in HandleKind::ALL");
        }
        assert_eq!(seen.len(), HandleKind::ALL.len());
    }

    #[derive(Default)]
    struct FastSet(std::collections::HashSet<HandleKind>);
    impl FastSet {
        fn insert(&mut self, k: HandleKind) -> bool {
            self.0.insert(k)
        }
        fn len(&self) -> usize {
            self.0.len()
        }
    }
}
