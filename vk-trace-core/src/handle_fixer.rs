//! Translates handle slots embedded inside opaque payloads between trace
//! space and driver space.
//!
//! The motivating case is `vkUpdateDescriptorSetWithTemplate`: the payload
//! walked by the descriptor update template hook contains raw Vulkan
//! handles (samplers, image views, buffers) at offsets the template
//! describes, not at a fixed schema position. `HandleFixer` knows how to
//! find those offsets for each descriptor type and rewrite them.

use crate::handle::RawHandle;
use smallvec::SmallVec;

/// Vulkan descriptor types relevant to the template-update hook. Only the
/// handle-bearing kinds need entries here; scalar descriptor types (inline
/// uniform blocks) never carry a handle slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorType {
    CombinedImageSampler,
    SampledImage,
    StorageImage,
    UniformBuffer,
    StorageBuffer,
}

/// Byte layout this crate assumes for one descriptor's info block, mirroring
/// `VkDescriptorImageInfo` (sampler, imageView, imageLayout) and
/// `VkDescriptorBufferInfo` (buffer, offset, range): three 8-byte machine
/// words each, the first one or two of which may be handles.
impl DescriptorType {
    pub const fn block_size(self) -> usize {
        24
    }

    /// Byte offsets within one descriptor's block that hold a handle,
    /// relative to the block's start.
    pub const fn handle_slot_offsets(self) -> &'static [usize] {
        match self {
            DescriptorType::CombinedImageSampler => &[0, 8],
            DescriptorType::SampledImage => &[8],
            DescriptorType::StorageImage => &[8],
            DescriptorType::UniformBuffer => &[0],
            DescriptorType::StorageBuffer => &[0],
        }
    }

    /// Stable wire representation, used when a template's entries are
    /// serialized alongside `vkCreateDescriptorUpdateTemplate`.
    pub const fn to_u32(self) -> u32 {
        match self {
            DescriptorType::CombinedImageSampler => 0,
            DescriptorType::SampledImage => 1,
            DescriptorType::StorageImage => 2,
            DescriptorType::UniformBuffer => 3,
            DescriptorType::StorageBuffer => 4,
        }
    }

    pub const fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => DescriptorType::CombinedImageSampler,
            1 => DescriptorType::SampledImage,
            2 => DescriptorType::StorageImage,
            3 => DescriptorType::UniformBuffer,
            4 => DescriptorType::StorageBuffer,
            _ => return None,
        })
    }
}

/// One entry of a `VkDescriptorUpdateTemplateCreateInfo`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TemplateEntry {
    pub descriptor_type: DescriptorType,
    pub descriptor_count: u32,
    /// Byte offset of the first descriptor of this entry within the
    /// template's source buffer.
    pub offset: usize,
    /// Byte stride between consecutive descriptors of this entry in the
    /// source buffer (may exceed `block_size` if the application interleaves
    /// other data).
    pub stride: usize,
}

/// Total payload bytes `vkUpdateDescriptorSetWithTemplate` writes for a
/// template with these entries: `sum(descriptor_count * block_size)`, not
/// `stride` (stride only governs how descriptors are *read* from the
/// application's source buffer).
pub fn payload_size(entries: &[TemplateEntry]) -> usize {
    entries
        .iter()
        .map(|e| e.descriptor_count as usize * e.descriptor_type.block_size())
        .sum()
}

/// A recorded handle slot: byte offset into a serialised payload, kept so a
/// later replay knows where to rewrite without re-deriving it from the
/// template — registered once, at capture time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    pub byte_offset: usize,
}

/// Most templates touch a handful of descriptors; inline storage avoids a
/// heap allocation for the common case.
#[derive(Default)]
pub struct HandleFixer {
    slots: SmallVec<[Slot; 8]>,
}

impl HandleFixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk `entries` and record every handle-bearing byte offset within a
    /// payload of `payload_size(entries)` bytes.
    pub fn register_slots_for_template(&mut self, entries: &[TemplateEntry]) {
        self.slots.clear();
        let mut cursor = 0usize;
        for entry in entries {
            for _ in 0..entry.descriptor_count {
                for &rel in entry.descriptor_type.handle_slot_offsets() {
                    self.slots.push(Slot {
                        byte_offset: cursor + rel,
                    });
                }
                cursor += entry.descriptor_type.block_size();
            }
        }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// For structures with a fixed-size handle array that declares fewer
    /// slots than the array's capacity (e.g. `VkPhysicalDeviceGroupProperties`),
    /// forget slots past `declared_count` so the fixer doesn't try to
    /// translate garbage past the end of valid data.
    pub fn trim_to_declared_count(&mut self, declared_count: usize) {
        self.slots.truncate(declared_count);
    }

    /// Rewrite every registered handle slot in `payload` in place, using
    /// `translate` to map each 8-byte little-endian handle.
    pub fn fix_payload(&self, payload: &mut [u8], translate: impl Fn(RawHandle) -> RawHandle) {
        for slot in &self.slots {
            let bytes = &mut payload[slot.byte_offset..slot.byte_offset + 8];
            let raw = u64::from_le_bytes(bytes.try_into().unwrap());
            let fixed = translate(raw);
            bytes.copy_from_slice(&fixed.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_image_sampler_payload_size_is_count_times_block_size() {
        let entries = [TemplateEntry {
            descriptor_type: DescriptorType::CombinedImageSampler,
            descriptor_count: 2,
            offset: 0,
            stride: DescriptorType::CombinedImageSampler.block_size(),
        }];
        assert_eq!(payload_size(&entries), 2 * 24);
    }

    #[test]
    fn fix_payload_rewrites_every_registered_slot() {
        let entries = [TemplateEntry {
            descriptor_type: DescriptorType::CombinedImageSampler,
            descriptor_count: 2,
            offset: 0,
            stride: 24,
        }];
        let mut fixer = HandleFixer::new();
        fixer.register_slots_for_template(&entries);
        assert_eq!(fixer.slots().len(), 4);

        let mut payload = vec![0u8; payload_size(&entries)];
        for (i, slot) in fixer.slots().to_vec().iter().enumerate() {
            payload[slot.byte_offset..slot.byte_offset + 8]
                .copy_from_slice(&(i as u64 + 1).to_le_bytes());
        }
        fixer.fix_payload(&mut payload, |h| h * 1000);
        for (i, slot) in fixer.slots().to_vec().iter().enumerate() {
            let v = u64::from_le_bytes(payload[slot.byte_offset..slot.byte_offset + 8].try_into().unwrap());
            assert_eq!(v, (i as u64 + 1) * 1000);
        }
    }

    #[test]
    fn trim_forgets_slots_past_declared_count() {
        let mut fixer = HandleFixer::new();
        fixer.register_slots_for_template(&[TemplateEntry {
            descriptor_type: DescriptorType::CombinedImageSampler,
            descriptor_count: 4,
            offset: 0,
            stride: 24,
        }]);
        assert_eq!(fixer.slots().len(), 8);
        fixer.trim_to_declared_count(2);
        assert_eq!(fixer.slots().len(), 2);
    }
}
