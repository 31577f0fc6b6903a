//! End-to-end scenarios combining several modules, as opposed to the
//! per-module unit tests living alongside their `#[cfg(test)]` blocks.

use std::sync::Arc;

use ash::vk;
use vk_trace_core::codec::Decoder;
use vk_trace_core::deserialize::pair_physical_devices;
use vk_trace_core::frame::{read_frame, Opcode};
use vk_trace_core::handle::{HandleKind, RawHandle};
use vk_trace_core::handle_fixer::{payload_size, DescriptorType, TemplateEntry};
use vk_trace_core::printer::{CommandPrinter, VecPrinter};
use vk_trace_core::recorder::{CommandBufferRecorder, RerecordCommandBuffer};
use vk_trace_core::serialize::{GlobalSink, Serializer};
use vk_trace_core::state_block::StateBlock;
use vk_trace_core::state_tracker::StateTracker;
use vk_trace_core::transform::{BufferCreateInfo, MemoryAllocateInfo, NullTerminal, PhysicalDeviceIdentity, TransformBase};
use vk_trace_core::wrapper::{Aux, Mapping};

/// A fake driver standing in for the real Vulkan ICD: hands out
/// sequentially-increasing handles and ignores everything else. Every
/// scenario below chains real modules (`StateTracker`, `Serializer`, ...)
/// on top of this, so the only thing "fake" is the bottom of the pipeline.
struct FakeDriver {
    next_handle: RawHandle,
    physical_devices: Vec<(RawHandle, PhysicalDeviceIdentity)>,
}

impl FakeDriver {
    fn new() -> Self {
        Self {
            next_handle: 1,
            physical_devices: Vec::new(),
        }
    }

    fn mint(&mut self) -> RawHandle {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }
}

impl TransformBase for FakeDriver {
    fn next_mut(&mut self) -> Option<&mut dyn TransformBase> {
        None
    }

    fn create_buffer(
        &mut self,
        _device: RawHandle,
        _info: &BufferCreateInfo,
    ) -> (vk::Result, Option<RawHandle>) {
        (vk::Result::SUCCESS, Some(self.mint()))
    }

    fn allocate_memory(
        &mut self,
        _device: RawHandle,
        _info: &MemoryAllocateInfo,
    ) -> (vk::Result, Option<RawHandle>) {
        (vk::Result::SUCCESS, Some(self.mint()))
    }

    fn map_memory(
        &mut self,
        _device: RawHandle,
        _memory: RawHandle,
        _offset: u64,
        _size: u64,
        _flags: u32,
    ) -> (vk::Result, Option<u64>) {
        (vk::Result::SUCCESS, Some(0xC0FFEE))
    }

    fn enumerate_physical_devices(
        &mut self,
        _instance: RawHandle,
    ) -> (vk::Result, Vec<(RawHandle, PhysicalDeviceIdentity)>) {
        (vk::Result::SUCCESS, self.physical_devices.clone())
    }
}

fn decode_opcodes(bytes: &[u8]) -> Vec<Opcode> {
    let mut decoder = Decoder::new(bytes);
    let mut opcodes = Vec::new();
    while let Some((opcode, _flags, payload_length)) = read_frame(&mut decoder).unwrap() {
        decoder.skip(payload_length as usize).unwrap();
        opcodes.push(opcode);
    }
    opcodes
}

#[test]
fn empty_session_produces_an_empty_trace() {
    let sink = GlobalSink::new();
    let bytes = sink.to_bytes();
    assert!(decode_opcodes(&bytes).is_empty());
}

#[test]
fn single_buffer_lifecycle_is_captured_and_reflected_in_state() {
    let state = Arc::new(StateBlock::new());
    let mut pipeline = StateTracker::new(
        state.clone(),
        Some(Box::new(Serializer::new(GlobalSink::new(), Some(Box::new(FakeDriver::new()))))),
    );

    let (result, buffer) = pipeline.create_buffer(
        1,
        &BufferCreateInfo {
            size: 4096,
            usage: 0x20,
            flags: 0,
        },
    );
    assert_eq!(result, vk::Result::SUCCESS);
    let buffer = buffer.unwrap();
    assert_eq!(state.count(HandleKind::Buffer), 1);
    assert_eq!(state.get(HandleKind::Buffer, buffer).unwrap().create_info.size, 4096);

    pipeline.destroy_buffer(1, buffer);
    assert_eq!(state.count(HandleKind::Buffer), 0);
}

#[test]
fn map_then_unmap_round_trips_through_the_full_pipeline() {
    let state = Arc::new(StateBlock::new());
    let sink = GlobalSink::new();
    let mut pipeline = StateTracker::new(
        state.clone(),
        Some(Box::new(Serializer::new(sink, Some(Box::new(FakeDriver::new()))))),
    );

    let (_, memory) = pipeline.allocate_memory(
        1,
        &MemoryAllocateInfo {
            allocation_size: 65536,
            memory_type_index: 0,
        },
    );
    let memory = memory.unwrap();

    // `VK_WHOLE_SIZE` must clamp to the allocation's own size, not be
    // stored verbatim.
    let (result, token) = pipeline.map_memory(1, memory, 0, vk::WHOLE_SIZE, 0);
    assert_eq!(result, vk::Result::SUCCESS);
    assert_eq!(token, Some(0xC0FFEE));

    let wrapper = state.get(HandleKind::DeviceMemory, memory).unwrap();
    assert!(matches!(
        *wrapper.aux.lock(),
        Aux::DeviceMemory { mapping: Some(Mapping { size: 65536, offset: 0, .. }), .. }
    ));

    pipeline.unmap_memory(1, memory);
    assert!(matches!(*wrapper.aux.lock(), Aux::DeviceMemory { mapping: None, .. }));
}

#[test]
fn descriptor_update_template_round_trips_through_the_wired_hook() {
    struct EchoTemplate {
        next_handle: RawHandle,
    }
    impl TransformBase for EchoTemplate {
        fn next_mut(&mut self) -> Option<&mut dyn TransformBase> {
            None
        }
        fn create_descriptor_update_template(
            &mut self,
            _device: RawHandle,
            _entries: &[TemplateEntry],
        ) -> (vk::Result, Option<RawHandle>) {
            (vk::Result::SUCCESS, Some(self.next_handle))
        }
    }

    let state = Arc::new(StateBlock::new());
    let entries = vec![TemplateEntry {
        descriptor_type: DescriptorType::CombinedImageSampler,
        descriptor_count: 2,
        offset: 0,
        stride: DescriptorType::CombinedImageSampler.block_size(),
    }];

    // `StateTracker` registers the template's entries in the state block,
    // the same as `create_descriptor_update_template_stores_its_entries`
    // exercises in isolation; here a `Serializer` sharing the same state
    // block reads those entries back out to size the update payload.
    let mut tracker = StateTracker::new(state.clone(), Some(Box::new(EchoTemplate { next_handle: 0x10 })));
    let (_, template) = tracker.create_descriptor_update_template(1, &entries);
    let template = template.unwrap();

    let mut serializer =
        Serializer::new(GlobalSink::new(), Some(Box::new(NullTerminal))).with_state(state.clone());

    // The application's source buffer runs past what the template actually
    // reads; the serializer must trim to the declared payload size.
    let declared = payload_size(&entries);
    let data = vec![0xABu8; declared + 64];
    serializer.update_descriptor_set_with_template(1, 2, template, &data);

    let bytes = serializer.sink.to_bytes();
    let mut decoder = Decoder::new(&bytes);
    let (opcode, _flags, _len) = read_frame(&mut decoder).unwrap().unwrap();
    assert_eq!(opcode, Opcode::UpdateDescriptorSetWithTemplate);
    let _device = decoder.decode::<u64>().unwrap();
    let _descriptor_set = decoder.decode::<u64>().unwrap();
    let _template = decoder.decode::<u64>().unwrap();
    let len = decoder.decode::<u64>().unwrap() as usize;
    assert_eq!(len, declared);
}

#[test]
fn physical_device_order_survives_a_reordering_transform() {
    let mut capture = Serializer::new(
        GlobalSink::new(),
        Some(Box::new(FakeDriver {
            next_handle: 1,
            physical_devices: vec![
                (1, PhysicalDeviceIdentity { device_id: 1, vendor_id: 0x10DE, driver_version: 1 }),
                (2, PhysicalDeviceIdentity { device_id: 2, vendor_id: 0x1002, driver_version: 1 }),
            ],
        })),
    );
    capture.enumerate_physical_devices(1);
    let bytes = capture.sink.to_bytes();

    // Decode the recorded frame's identity tail back into (handle, identity)
    // pairs, the way a replayer would.
    let mut decoder = Decoder::new(&bytes);
    let (opcode, _flags, _len) = read_frame(&mut decoder).unwrap().unwrap();
    assert_eq!(opcode, Opcode::EnumeratePhysicalDevices);
    let _instance = decoder.decode::<u64>().unwrap();
    let _result = decoder.decode::<i32>().unwrap();
    let recorded_handles = decoder.decode_array::<u64>().unwrap();
    let tail_count = decoder.decode::<u64>().unwrap() as usize;
    let mut identities = Vec::with_capacity(tail_count);
    for _ in 0..tail_count {
        identities.push(PhysicalDeviceIdentity {
            device_id: decoder.decode::<u32>().unwrap(),
            vendor_id: decoder.decode::<u32>().unwrap(),
            driver_version: decoder.decode::<u32>().unwrap(),
        });
    }
    let recorded: Vec<_> = recorded_handles.into_iter().zip(identities).collect();

    // A live re-enumeration hands back the same devices under fresh handles
    // and in reverse order — identity pairing must recover the
    // correspondence positional pairing would get wrong.
    let live = vec![
        (20, PhysicalDeviceIdentity { device_id: 2, vendor_id: 0x1002, driver_version: 1 }),
        (21, PhysicalDeviceIdentity { device_id: 1, vendor_id: 0x10DE, driver_version: 1 }),
    ];
    let pairs = pair_physical_devices(&recorded, &live);
    assert_eq!(pairs, vec![(1, 21), (2, 20)]);
}

#[test]
fn recorded_command_buffer_replays_its_structure_through_a_different_sink() {
    let recorder = CommandBufferRecorder::new();
    recorder.begin(1);

    let mut serializer = Serializer::new(&recorder, Some(Box::new(NullTerminal)));
    serializer.cmd_begin_render_pass(1, 0x10, 0x20);
    serializer.cmd_draw(1, 3, 1, 0, 0);
    serializer.cmd_draw(1, 3, 1, 3, 0);
    serializer.cmd_end_render_pass(1);

    let rerecord = RerecordCommandBuffer::capture(&recorder, 1).unwrap();
    assert_eq!(
        decode_opcodes(&rerecord.bytes),
        vec![Opcode::CmdBeginRenderPass, Opcode::CmdDraw, Opcode::CmdDraw, Opcode::CmdEndRenderPass]
    );

    // Replay its structure through a printer sink instead of the original
    // serializer.
    let mut printer = CommandPrinter::new(VecPrinter::default(), Some(Box::new(NullTerminal)));
    rerecord.replay_into(&mut printer).unwrap();

    assert_eq!(printer.printer.lines.len(), 4);
    assert!(printer.printer.lines[0].starts_with("vkCmdBeginRenderPass"));
    assert!(printer.printer.lines[1].starts_with("vkCmdDraw"));
    assert!(printer.printer.lines[2].starts_with("vkCmdDraw"));
    assert!(printer.printer.lines[3].starts_with("vkCmdEndRenderPass"));
}
