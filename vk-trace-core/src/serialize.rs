//! Generated-style per-entry-point marshal to an [`Encoder`].
//!
//! `Serializer<S>` is a `TransformBase` that, for each entry point it
//! overrides: (1) acquires an encoder for the call's key via `S`
//! ([`EncoderSink`]), (2) writes the frame header with a reserved size
//! slot, (3) serialises the in-parameters, (4) forwards to `next`, (5)
//! serialises out-parameters and the result, (6) commits the frame size.
//! Two serialisations of identical inputs and downstream behaviour are
//! required to be bit-identical — nothing here reads wall-clock time,
//! thread id, or memory addresses.

use crate::codec::Encoder;
use crate::frame::{write_frame, FrameFlags, Opcode};
use crate::handle::{HandleKind, RawHandle};
use crate::handle_fixer::{payload_size, TemplateEntry};
use crate::state_block::StateBlock;
use crate::transform::{BufferCreateInfo, MemoryAllocateInfo, PhysicalDeviceIdentity, TransformBase};
use crate::wrapper::Aux;
use ash::vk;
use std::sync::Arc;

/// Where a serialized frame's bytes end up: the global stream (`key == 0`)
/// or a specific command buffer's side stream (`key == command_buffer`).
pub trait EncoderSink: Send {
    fn with_encoder<R>(&self, key: u64, f: impl FnOnce(&mut Encoder) -> R) -> R;
}

/// A reference to a sink is itself a sink — lets `Serializer` borrow a
/// `CommandBufferRecorder` instead of owning it, so the recorder outlives
/// the serializer built on top of it.
impl<T: EncoderSink + ?Sized> EncoderSink for &T {
    fn with_encoder<R>(&self, key: u64, f: impl FnOnce(&mut Encoder) -> R) -> R {
        (**self).with_encoder(key, f)
    }
}

/// The global command stream, shared across threads. Acquisition is the
/// "locked encoder" path: the mutex is held for the duration of one
/// command's writes, which is also what gives the global stream its total
/// order.
pub struct GlobalSink {
    encoder: parking_lot::Mutex<Encoder>,
}

impl GlobalSink {
    pub fn new() -> Self {
        Self {
            encoder: parking_lot::Mutex::new(Encoder::new()),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encoder.lock().to_bytes()
    }
}

impl Default for GlobalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderSink for GlobalSink {
    fn with_encoder<R>(&self, _key: u64, f: impl FnOnce(&mut Encoder) -> R) -> R {
        let mut encoder = self.encoder.lock();
        f(&mut encoder)
    }
}

fn encode_frame_with_result(
    encoder: &mut Encoder,
    opcode: Opcode,
    write_in: impl FnOnce(&mut Encoder),
    write_out: impl FnOnce(&mut Encoder),
) {
    // Header fields are written with a placeholder length, then the whole
    // record is re-assembled once the payload (in- and out-parameters) is
    // known, so `write_frame` only has to see the final bytes once.
    let mut payload = Encoder::new();
    write_in(&mut payload);
    write_out(&mut payload);
    write_frame(encoder, opcode, FrameFlags::empty(), &payload.to_bytes());
}

/// Serializing transform. Generic over where frames land ([`EncoderSink`])
/// so the same code drives both the global stream and, via the recorder's
/// per-buffer sink (`recorder.rs`), command-buffer-scoped streams.
pub struct Serializer<S: EncoderSink> {
    pub sink: S,
    pub next: Option<Box<dyn TransformBase>>,
    /// Consulted by hooks whose payload size depends on create-time state
    /// (`vkUpdateDescriptorSetWithTemplate`'s template entries). `None` until
    /// `with_state` attaches one — the constructor stays two-argument so
    /// existing call sites that don't need the hook are unaffected.
    pub state: Option<Arc<StateBlock>>,
}

impl<S: EncoderSink> Serializer<S> {
    pub fn new(sink: S, next: Option<Box<dyn TransformBase>>) -> Self {
        Self { sink, next, state: None }
    }

    pub fn with_state(mut self, state: Arc<StateBlock>) -> Self {
        self.state = Some(state);
        self
    }
}

impl<S: EncoderSink + Send> TransformBase for Serializer<S> {
    fn next_mut(&mut self) -> Option<&mut dyn TransformBase> {
        self.next.as_deref_mut()
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
        self.sink.with_encoder(0, |encoder| {
            encode_frame_with_result(
                encoder,
                Opcode::CreateBuffer,
                |e| {
                    e.encode(device);
                    e.encode(info.size);
                    e.encode(info.usage);
                    e.encode(info.flags);
                },
                |e| {
                    e.encode(result.as_raw());
                    e.encode_option(handle);
                },
            )
        });
        (result, handle)
    }

    fn destroy_buffer(&mut self, device: RawHandle, buffer: RawHandle) {
        if let Some(next) = self.next.as_deref_mut() {
            next.destroy_buffer(device, buffer);
        }
        self.sink.with_encoder(0, |encoder| {
            encode_frame_with_result(
                encoder,
                Opcode::DestroyBuffer,
                |e| {
                    e.encode(device);
                    e.encode(buffer);
                },
                |_e| {},
            )
        });
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
        self.sink.with_encoder(0, |encoder| {
            encode_frame_with_result(
                encoder,
                Opcode::AllocateMemory,
                |e| {
                    e.encode(device);
                    e.encode(info.allocation_size);
                    e.encode(info.memory_type_index);
                },
                |e| {
                    e.encode(result.as_raw());
                    e.encode_option(handle);
                },
            )
        });
        (result, handle)
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
        // `ppData` is encoded as an opaque 64-bit token; it is never
        // re-used across replays.
        self.sink.with_encoder(0, |encoder| {
            encode_frame_with_result(
                encoder,
                Opcode::MapMemory,
                |e| {
                    e.encode(device);
                    e.encode(memory);
                    e.encode(offset);
                    e.encode(size);
                    e.encode(flags);
                },
                |e| {
                    e.encode(result.as_raw());
                    e.encode_option(token);
                },
            )
        });
        (result, token)
    }

    fn unmap_memory(&mut self, device: RawHandle, memory: RawHandle) {
        if let Some(next) = self.next.as_deref_mut() {
            next.unmap_memory(device, memory);
        }
        self.sink.with_encoder(0, |encoder| {
            encode_frame_with_result(
                encoder,
                Opcode::UnmapMemory,
                |e| {
                    e.encode(device);
                    e.encode(memory);
                },
                |_e| {},
            )
        });
    }

    fn cmd_draw(
        &mut self,
        cb: RawHandle,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        if let Some(next) = self.next.as_deref_mut() {
            next.cmd_draw(cb, vertex_count, instance_count, first_vertex, first_instance);
        }
        self.sink.with_encoder(cb, |encoder| {
            encode_frame_with_result(
                encoder,
                Opcode::CmdDraw,
                |e| {
                    e.encode(cb);
                    e.encode(vertex_count);
                    e.encode(instance_count);
                    e.encode(first_vertex);
                    e.encode(first_instance);
                },
                |_e| {},
            )
        });
    }

    fn cmd_update_buffer(&mut self, cb: RawHandle, buffer: RawHandle, offset: u64, data: &[u8]) {
        if let Some(next) = self.next.as_deref_mut() {
            next.cmd_update_buffer(cb, buffer, offset, data);
        }
        self.sink.with_encoder(cb, |encoder| {
            encode_frame_with_result(
                encoder,
                Opcode::CmdUpdateBuffer,
                |e| {
                    e.encode(cb);
                    e.encode(buffer);
                    e.encode(offset);
                    // length taken from `dataSize`, not a generic array prefix
                    e.encode(data.len() as u64);
                    e.encode_bytes(data);
                },
                |_e| {},
            )
        });
    }

    fn cmd_begin_render_pass(&mut self, cb: RawHandle, render_pass: RawHandle, framebuffer: RawHandle) {
        if let Some(next) = self.next.as_deref_mut() {
            next.cmd_begin_render_pass(cb, render_pass, framebuffer);
        }
        self.sink.with_encoder(cb, |encoder| {
            encode_frame_with_result(
                encoder,
                Opcode::CmdBeginRenderPass,
                |e| {
                    e.encode(cb);
                    e.encode(render_pass);
                    e.encode(framebuffer);
                },
                |_e| {},
            )
        });
    }

    fn cmd_end_render_pass(&mut self, cb: RawHandle) {
        if let Some(next) = self.next.as_deref_mut() {
            next.cmd_end_render_pass(cb);
        }
        self.sink.with_encoder(cb, |encoder| {
            encode_frame_with_result(encoder, Opcode::CmdEndRenderPass, |e| e.encode(cb), |_e| {})
        });
    }

    fn cmd_push_constants(
        &mut self,
        cb: RawHandle,
        layout: RawHandle,
        stage_flags: u32,
        offset: u32,
        values: &[u8],
    ) {
        if let Some(next) = self.next.as_deref_mut() {
            next.cmd_push_constants(cb, layout, stage_flags, offset, values);
        }
        self.sink.with_encoder(cb, |encoder| {
            encode_frame_with_result(
                encoder,
                Opcode::CmdPushConstants,
                |e| {
                    e.encode(cb);
                    e.encode(layout);
                    e.encode(stage_flags);
                    e.encode(offset);
                    // length taken from `size`, not a generic array prefix
                    e.encode(values.len() as u64);
                    e.encode_bytes(values);
                },
                |_e| {},
            )
        });
    }

    fn enumerate_physical_devices(
        &mut self,
        instance: RawHandle,
    ) -> (vk::Result, Vec<(RawHandle, PhysicalDeviceIdentity)>) {
        let (result, devices) = match self.next.as_deref_mut() {
            Some(next) => next.enumerate_physical_devices(instance),
            None => (vk::Result::SUCCESS, Vec::new()),
        };
        self.sink.with_encoder(0, |encoder| {
            encode_frame_with_result(
                encoder,
                Opcode::EnumeratePhysicalDevices,
                |e| e.encode(instance),
                |e| {
                    e.encode(result.as_raw());
                    e.encode_array(&devices.iter().map(|(h, _)| *h).collect::<Vec<_>>());
                    // Trailing identity tail: lets a replayer pair recorded
                    // devices with currently-enumerated ones across vendor
                    // reorderings. Consumers must tolerate its absence.
                    e.encode(devices.len() as u64);
                    for (_, identity) in &devices {
                        e.encode(identity.device_id);
                        e.encode(identity.vendor_id);
                        e.encode(identity.driver_version);
                    }
                },
            )
        });
        (result, devices)
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
        self.sink.with_encoder(0, |encoder| {
            encode_frame_with_result(
                encoder,
                Opcode::CreateDescriptorUpdateTemplate,
                |e| {
                    e.encode(device);
                    e.encode(entries.len() as u64);
                    for entry in entries {
                        e.encode(entry.descriptor_type.to_u32());
                        e.encode(entry.descriptor_count);
                        e.encode(entry.offset as u64);
                        e.encode(entry.stride as u64);
                    }
                },
                |e| {
                    e.encode(result.as_raw());
                    e.encode_option(handle);
                },
            )
        });
        (result, handle)
    }

    fn update_descriptor_set_with_template(
        &mut self,
        device: RawHandle,
        descriptor_set: RawHandle,
        template: RawHandle,
        data: &[u8],
    ) {
        if let Some(next) = self.next.as_deref_mut() {
            next.update_descriptor_set_with_template(device, descriptor_set, template, data);
        }
        // Payload size comes from the template's entries, not `data.len()`
        // verbatim: the application's source buffer may run past what the
        // template actually reads.
        let expected_len = self.state.as_ref().and_then(|state| {
            state
                .get(HandleKind::DescriptorUpdateTemplate, template)
                .ok()
                .and_then(|wrapper| match &*wrapper.aux.lock() {
                    Aux::DescriptorUpdateTemplate { entries } => Some(payload_size(entries)),
                    _ => None,
                })
        });
        let payload: &[u8] = match expected_len {
            Some(len) => &data[..len.min(data.len())],
            None => data,
        };
        self.sink.with_encoder(0, |encoder| {
            encode_frame_with_result(
                encoder,
                Opcode::UpdateDescriptorSetWithTemplate,
                |e| {
                    e.encode(device);
                    e.encode(descriptor_set);
                    e.encode(template);
                    e.encode(payload.len() as u64);
                    e.encode_bytes(payload);
                },
                |_e| {},
            )
        });
    }

    fn queue_submit(&mut self, queue: RawHandle, command_buffers: &[RawHandle]) -> vk::Result {
        let result = match self.next.as_deref_mut() {
            Some(next) => next.queue_submit(queue, command_buffers),
            None => vk::Result::SUCCESS,
        };
        self.sink.with_encoder(0, |encoder| {
            encode_frame_with_result(
                encoder,
                Opcode::QueueSubmit,
                |e| {
                    e.encode(queue);
                    e.encode_array(command_buffers);
                },
                |e| e.encode(result.as_raw()),
            )
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::NullTerminal;

    #[test]
    fn identical_calls_produce_identical_bytes() {
        let mk = || {
            let mut s = Serializer::new(GlobalSink::new(), Some(Box::new(NullTerminal)));
            s.create_buffer(
                1,
                &BufferCreateInfo {
                    size: 1024,
                    usage: 0x10,
                    flags: 0,
                },
            );
            s.destroy_buffer(1, 2);
            s.sink.to_bytes()
        };
        assert_eq!(mk(), mk());
    }

    #[test]
    fn forwards_before_writing_out_params() {
        struct Echo;
        impl TransformBase for Echo {
            fn next_mut(&mut self) -> Option<&mut dyn TransformBase> {
                None
            }
            fn create_buffer(
                &mut self,
                _device: RawHandle,
                _info: &BufferCreateInfo,
            ) -> (vk::Result, Option<RawHandle>) {
                (vk::Result::SUCCESS, Some(0xAAAA))
            }
        }

        let mut s = Serializer::new(GlobalSink::new(), Some(Box::new(Echo)));
        let (result, handle) = s.create_buffer(1, &BufferCreateInfo::default());
        assert_eq!(result, vk::Result::SUCCESS);
        assert_eq!(handle, Some(0xAAAA));
    }

    #[test]
    fn enumerate_physical_devices_writes_an_identity_tail() {
        struct TwoDevices;
        impl TransformBase for TwoDevices {
            fn next_mut(&mut self) -> Option<&mut dyn TransformBase> {
                None
            }
            fn enumerate_physical_devices(
                &mut self,
                _instance: RawHandle,
            ) -> (vk::Result, Vec<(RawHandle, PhysicalDeviceIdentity)>) {
                (
                    vk::Result::SUCCESS,
                    vec![
                        (1, PhysicalDeviceIdentity { device_id: 1, vendor_id: 0x10DE, driver_version: 1 }),
                        (2, PhysicalDeviceIdentity { device_id: 2, vendor_id: 0x1002, driver_version: 1 }),
                    ],
                )
            }
        }

        let mut s = Serializer::new(GlobalSink::new(), Some(Box::new(TwoDevices)));
        s.enumerate_physical_devices(1);
        let bytes = s.sink.to_bytes();

        use crate::codec::Decoder;
        use crate::frame::read_frame;
        let mut decoder = Decoder::new(&bytes);
        let (opcode, _flags, _len) = read_frame(&mut decoder).unwrap().unwrap();
        assert_eq!(opcode, Opcode::EnumeratePhysicalDevices);
        let _instance = decoder.decode::<u64>().unwrap();
        let _result = decoder.decode::<i32>().unwrap();
        let handles = decoder.decode_array::<u64>().unwrap();
        assert_eq!(handles, vec![1, 2]);
        let tail_count = decoder.decode::<u64>().unwrap();
        assert_eq!(tail_count, 2);
        let device_id = decoder.decode::<u32>().unwrap();
        assert_eq!(device_id, 1);
    }
}
