//! Per-opcode decode and dispatch: the dual of `serialize.rs`'s marshal-out.
//!
//! `replay` drains a decoded stream, calling the matching `TransformBase`
//! method for each frame it understands, in the same field order
//! `Serializer` wrote them in. An opcode this crate's representative subset
//! doesn't model yet is skipped whole, by its declared payload length, so a
//! stream mixing modeled and unmodeled calls still advances correctly.

use crate::codec::{CodecError, Decoder};
use crate::frame::{read_frame, Opcode};
use crate::handle::RawHandle;
use crate::handle_fixer::{DescriptorType, TemplateEntry};
use crate::transform::{BufferCreateInfo, MemoryAllocateInfo, PhysicalDeviceIdentity, TransformBase};

/// Pair recorded physical devices with a live enumeration by identity
/// triple, falling back to index order for any entry it can't match this
/// way (including when `live` carries no identity information at all, or
/// the recorded tail was missing or short).
pub fn pair_physical_devices(
    recorded: &[(RawHandle, PhysicalDeviceIdentity)],
    live: &[(RawHandle, PhysicalDeviceIdentity)],
) -> Vec<(RawHandle, RawHandle)> {
    let mut used = vec![false; live.len()];
    let mut pairs = Vec::with_capacity(recorded.len());
    for &(recorded_handle, identity) in recorded {
        let by_identity = if identity != PhysicalDeviceIdentity::default() {
            live.iter()
                .position(|&(_, live_identity)| live_identity == identity)
                .filter(|&i| !used[i])
        } else {
            None
        };
        let chosen = by_identity.or_else(|| (0..live.len()).find(|&i| !used[i]));
        if let Some(i) = chosen {
            used[i] = true;
            pairs.push((recorded_handle, live[i].0));
        }
    }
    pairs
}

/// Decode every frame in `decoder`, calling the matching method on `sink`.
pub fn replay(decoder: &mut Decoder, sink: &mut dyn TransformBase) -> Result<(), CodecError> {
    while let Some((opcode, _flags, payload_length)) = read_frame(decoder)? {
        let payload_length = payload_length as usize;
        let start = decoder.data_left();
        decode_one(decoder, opcode, payload_length, sink)?;
        let consumed = start - decoder.data_left();
        if consumed < payload_length {
            decoder.skip(payload_length - consumed)?;
        }
    }
    Ok(())
}

fn decode_one(
    decoder: &mut Decoder,
    opcode: Opcode,
    payload_length: usize,
    sink: &mut dyn TransformBase,
) -> Result<(), CodecError> {
    let frame_start = decoder.data_left();
    match opcode {
        Opcode::CreateBuffer => {
            let device = decoder.decode::<u64>()?;
            let size = decoder.decode::<u64>()?;
            let usage = decoder.decode::<u32>()?;
            let flags = decoder.decode::<u32>()?;
            let _result = decoder.decode::<i32>()?;
            let _handle = decoder.decode_option::<u64>()?;
            sink.create_buffer(device, &BufferCreateInfo { size, usage, flags });
        }
        Opcode::DestroyBuffer => {
            let device = decoder.decode::<u64>()?;
            let buffer = decoder.decode::<u64>()?;
            sink.destroy_buffer(device, buffer);
        }
        Opcode::AllocateMemory => {
            let device = decoder.decode::<u64>()?;
            let allocation_size = decoder.decode::<u64>()?;
            let memory_type_index = decoder.decode::<u32>()?;
            let _result = decoder.decode::<i32>()?;
            let _handle = decoder.decode_option::<u64>()?;
            sink.allocate_memory(device, &MemoryAllocateInfo { allocation_size, memory_type_index });
        }
        Opcode::MapMemory => {
            let device = decoder.decode::<u64>()?;
            let memory = decoder.decode::<u64>()?;
            let offset = decoder.decode::<u64>()?;
            let size = decoder.decode::<u64>()?;
            let flags = decoder.decode::<u32>()?;
            let _result = decoder.decode::<i32>()?;
            let _token = decoder.decode_option::<u64>()?;
            sink.map_memory(device, memory, offset, size, flags);
        }
        Opcode::UnmapMemory => {
            let device = decoder.decode::<u64>()?;
            let memory = decoder.decode::<u64>()?;
            sink.unmap_memory(device, memory);
        }
        Opcode::CmdBeginRenderPass => {
            let cb = decoder.decode::<u64>()?;
            let render_pass = decoder.decode::<u64>()?;
            let framebuffer = decoder.decode::<u64>()?;
            sink.cmd_begin_render_pass(cb, render_pass, framebuffer);
        }
        Opcode::CmdEndRenderPass => {
            let cb = decoder.decode::<u64>()?;
            sink.cmd_end_render_pass(cb);
        }
        Opcode::CmdDraw => {
            let cb = decoder.decode::<u64>()?;
            let vertex_count = decoder.decode::<u32>()?;
            let instance_count = decoder.decode::<u32>()?;
            let first_vertex = decoder.decode::<u32>()?;
            let first_instance = decoder.decode::<u32>()?;
            sink.cmd_draw(cb, vertex_count, instance_count, first_vertex, first_instance);
        }
        Opcode::CmdUpdateBuffer => {
            let cb = decoder.decode::<u64>()?;
            let buffer = decoder.decode::<u64>()?;
            let offset = decoder.decode::<u64>()?;
            let len = decoder.decode::<u64>()? as usize;
            let data = decoder.decode_primitive_array::<u8>(len)?;
            sink.cmd_update_buffer(cb, buffer, offset, &data);
        }
        Opcode::CmdPushConstants => {
            let cb = decoder.decode::<u64>()?;
            let layout = decoder.decode::<u64>()?;
            let stage_flags = decoder.decode::<u32>()?;
            let offset = decoder.decode::<u32>()?;
            let len = decoder.decode::<u64>()? as usize;
            let values = decoder.decode_primitive_array::<u8>(len)?;
            sink.cmd_push_constants(cb, layout, stage_flags, offset, &values);
        }
        Opcode::QueueSubmit => {
            let queue = decoder.decode::<u64>()?;
            let command_buffers = decoder.decode_array::<u64>()?;
            let _result = decoder.decode::<i32>()?;
            sink.queue_submit(queue, &command_buffers);
        }
        Opcode::EnumeratePhysicalDevices => {
            let instance = decoder.decode::<u64>()?;
            let _result = decoder.decode::<i32>()?;
            let recorded_handles = decoder.decode_array::<u64>()?;
            let mut identities = vec![PhysicalDeviceIdentity::default(); recorded_handles.len()];

            let consumed_so_far = frame_start - decoder.data_left();
            if payload_length.saturating_sub(consumed_so_far) >= 8 {
                let tail_count = decoder.decode::<u64>()? as usize;
                for identity in identities.iter_mut().take(tail_count.min(identities.len())) {
                    *identity = PhysicalDeviceIdentity {
                        device_id: decoder.decode::<u32>()?,
                        vendor_id: decoder.decode::<u32>()?,
                        driver_version: decoder.decode::<u32>()?,
                    };
                }
            }

            let recorded: Vec<_> = recorded_handles.into_iter().zip(identities).collect();
            let (_, live) = sink.enumerate_physical_devices(instance);
            let _pairs = pair_physical_devices(&recorded, &live);
        }
        Opcode::CreateDescriptorUpdateTemplate => {
            let device = decoder.decode::<u64>()?;
            let entry_count = decoder.decode::<u64>()? as usize;
            let mut entries = Vec::with_capacity(entry_count);
            for _ in 0..entry_count {
                let descriptor_type_raw = decoder.decode::<u32>()?;
                let descriptor_count = decoder.decode::<u32>()?;
                let offset = decoder.decode::<u64>()? as usize;
                let stride = decoder.decode::<u64>()? as usize;
                let descriptor_type = DescriptorType::from_u32(descriptor_type_raw).unwrap_or(DescriptorType::UniformBuffer);
                entries.push(TemplateEntry { descriptor_type, descriptor_count, offset, stride });
            }
            let _result = decoder.decode::<i32>()?;
            let _handle = decoder.decode_option::<u64>()?;
            sink.create_descriptor_update_template(device, &entries);
        }
        Opcode::UpdateDescriptorSetWithTemplate => {
            let device = decoder.decode::<u64>()?;
            let descriptor_set = decoder.decode::<u64>()?;
            let template = decoder.decode::<u64>()?;
            let len = decoder.decode::<u64>()? as usize;
            let data = decoder.decode_primitive_array::<u8>(len)?;
            sink.update_descriptor_set_with_template(device, descriptor_set, template, &data);
        }
        Opcode::CreateInstance
        | Opcode::CreateDevice
        | Opcode::GetDeviceQueue
        | Opcode::GetPhysicalDeviceMemoryProperties
        | Opcode::CreateImage
        | Opcode::DestroyImage
        | Opcode::FreeMemory
        | Opcode::CreateDescriptorSetLayout
        | Opcode::AllocateCommandBuffers
        | Opcode::FreeCommandBuffers
        | Opcode::BeginCommandBuffer
        | Opcode::EndCommandBuffer
        | Opcode::ResetCommandBuffer
        | Opcode::GetQueryPoolResults
        | Opcode::GetPipelineCacheData
        | Opcode::GetMemoryHostPointerPropertiesExt => {
            // Not yet part of this crate's representative subset; `replay`
            // skips the remainder of the frame by its declared length once
            // this returns.
        }
    }
    Ok(())
}
