//! Frame header for the encoded command stream.
//!
//! ```text
//! u64  opcode            // assigned per entry point, stable within a build
//! u64  flags             // bitset, currently { MID_EXECUTION = 1 }
//! u64  payload_length    // bytes that follow
//! ...  payload
//! ```

use crate::codec::{CodecError, Decoder, Encoder};

bitflags::bitflags! {
    /// Per-frame bitset. `MID_EXECUTION` marks a frame that was captured
    /// while the trace was attached mid-execution (state snapshot replay,
    /// rather than a call made from process start).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FrameFlags: u64 {
        const MID_EXECUTION = 1;
    }
}

/// Stable per-entry-point opcode. The full ~500-entry assignment table is
/// generated from the Vulkan XML registry at build time (out of scope for
/// this crate); `Opcode` here is the representative subset
/// `transform::TransformBase` implements directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum Opcode {
    CreateInstance = 1,
    CreateDevice = 2,
    GetDeviceQueue = 3,
    EnumeratePhysicalDevices = 4,
    GetPhysicalDeviceMemoryProperties = 5,
    CreateBuffer = 6,
    DestroyBuffer = 7,
    CreateImage = 8,
    DestroyImage = 9,
    AllocateMemory = 10,
    FreeMemory = 11,
    MapMemory = 12,
    UnmapMemory = 13,
    CreateDescriptorSetLayout = 14,
    CreateDescriptorUpdateTemplate = 15,
    UpdateDescriptorSetWithTemplate = 16,
    AllocateCommandBuffers = 17,
    FreeCommandBuffers = 18,
    BeginCommandBuffer = 19,
    EndCommandBuffer = 20,
    ResetCommandBuffer = 21,
    CmdBeginRenderPass = 22,
    CmdEndRenderPass = 23,
    CmdDraw = 24,
    CmdUpdateBuffer = 25,
    CmdPushConstants = 26,
    QueueSubmit = 27,
    GetQueryPoolResults = 28,
    GetPipelineCacheData = 29,
    GetMemoryHostPointerPropertiesExt = 30,
}

impl Opcode {
    pub fn from_u64(v: u64) -> Option<Self> {
        use Opcode::*;
        Some(match v {
            1 => CreateInstance,
            2 => CreateDevice,
            3 => GetDeviceQueue,
            4 => EnumeratePhysicalDevices,
            5 => GetPhysicalDeviceMemoryProperties,
            6 => CreateBuffer,
            7 => DestroyBuffer,
            8 => CreateImage,
            9 => DestroyImage,
            10 => AllocateMemory,
            11 => FreeMemory,
            12 => MapMemory,
            13 => UnmapMemory,
            14 => CreateDescriptorSetLayout,
            15 => CreateDescriptorUpdateTemplate,
            16 => UpdateDescriptorSetWithTemplate,
            17 => AllocateCommandBuffers,
            18 => FreeCommandBuffers,
            19 => BeginCommandBuffer,
            20 => EndCommandBuffer,
            21 => ResetCommandBuffer,
            22 => CmdBeginRenderPass,
            23 => CmdEndRenderPass,
            24 => CmdDraw,
            25 => CmdUpdateBuffer,
            26 => CmdPushConstants,
            27 => QueueSubmit,
            28 => GetQueryPoolResults,
            29 => GetPipelineCacheData,
            30 => GetMemoryHostPointerPropertiesExt,
            _ => return None,
        })
    }
}

/// A decoded frame header plus its raw payload bytes.
pub struct Frame<'a> {
    pub opcode: Opcode,
    pub flags: FrameFlags,
    pub payload: &'a [u8],
}

/// Write a frame header with a placeholder length, run `write_payload`
/// against the encoder to produce the body, then patch the length back in.
///
/// The header's size field is reserved up front and committed once the
/// payload (including out-parameters) has been written.
pub fn write_frame(encoder: &mut Encoder, opcode: Opcode, flags: FrameFlags, payload: &[u8]) {
    encoder.encode(opcode as u64);
    encoder.encode(flags.bits());
    encoder.encode(payload.len() as u64);
    encoder.encode_bytes(payload);
}

/// Read one frame's header from `decoder`, leaving the cursor positioned at
/// the start of its payload. Returns `Ok(None)` at a clean end of stream (no
/// more frames); an unknown opcode or length mismatch is reported through
/// [`CodecError`]-shaped errors, fatal to the replay. The caller is
/// responsible for consuming exactly `payload_length` bytes
/// (decoding them, or `decoder.skip(payload_length as usize)` if it has no
/// decoder for this opcode) before reading the next frame.
pub fn read_frame<'a>(
    decoder: &mut Decoder<'a>,
) -> Result<Option<(Opcode, FrameFlags, u64)>, CodecError> {
    if decoder.data_left() == 0 {
        return Ok(None);
    }
    let raw_opcode = decoder.decode::<u64>()?;
    let flags_bits = decoder.decode::<u64>()?;
    let length = decoder.decode::<u64>()?;
    if length as usize > decoder.data_left() {
        return Err(CodecError::BadFrame {
            declared: length,
            actual: decoder.data_left() as u64,
        });
    }
    let opcode = Opcode::from_u64(raw_opcode).ok_or(CodecError::BadFrame {
        declared: raw_opcode,
        actual: 0,
    })?;
    let flags = FrameFlags::from_bits_truncate(flags_bits);
    Ok(Some((opcode, flags, length)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips() {
        let mut enc = Encoder::new();
        write_frame(&mut enc, Opcode::CreateBuffer, FrameFlags::empty(), &[1, 2, 3, 4]);
        let bytes = enc.to_bytes();
        let mut dec = Decoder::new(&bytes);
        let (opcode, flags, length) = read_frame(&mut dec).unwrap().unwrap();
        assert_eq!(opcode, Opcode::CreateBuffer);
        assert_eq!(flags, FrameFlags::empty());
        assert_eq!(length, 4);
        assert_eq!(dec.data_left(), 4);
    }

    #[test]
    fn empty_trace_decodes_to_no_frames() {
        let bytes: [u8; 0] = [];
        let mut dec = Decoder::new(&bytes);
        assert!(read_frame(&mut dec).unwrap().is_none());
    }
}
