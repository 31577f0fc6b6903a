//! Binary codec for parameter payloads.
//!
//! The encoder owns a list of fixed-size blocks so it can grow without
//! reallocating (and thus invalidating) bytes already written. The decoder
//! is the dual: it wraps a block list and a read cursor and offers typed
//! decode operations, including a scratch arena for data whose lifetime is
//! scoped to one decoded command.

use crate::arena::TemporaryAllocator;
use std::mem;

const BLOCK_SIZE: usize = 64 * 1024;

/// Failure modes for decoding. Both are fatal to the replay that hit them.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("decode requested {requested} bytes but only {available} remain in the stream")]
    EndOfStream { requested: usize, available: usize },
    #[error("frame declared payload_length {declared} but block list holds {actual} bytes for it")]
    BadFrame { declared: u64, actual: u64 },
}

/// One fixed-capacity chunk of the encoded stream.
///
/// Exposes how much data it holds and how much room is left, so an encoder
/// can decide when to roll over to a fresh block.
#[derive(Default)]
struct Block {
    data: Vec<u8>,
}

impl Block {
    fn new() -> Self {
        Self {
            data: Vec::with_capacity(BLOCK_SIZE),
        }
    }

    fn remaining(&self) -> usize {
        BLOCK_SIZE - self.data.len()
    }
}

/// Append-only, block-list-backed byte sink.
///
/// `encode` appends fixed-endian (little-endian) bytes of `T`.
/// `reset` discards everything written so far and restarts at the head —
/// used by the recorder when a command buffer is re-begun or its pool is
/// reset.
pub struct Encoder {
    blocks: Vec<Block>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self { blocks: vec![Block::new()] }
    }

    /// Current total length of the stream, i.e. the offset the next byte
    /// written will land at.
    pub fn offset(&self) -> u64 {
        self.blocks.iter().map(|b| b.data.len() as u64).sum()
    }

    /// Append raw bytes, splitting across blocks as needed.
    pub fn encode_bytes(&mut self, mut bytes: &[u8]) {
        loop {
            let block = self.blocks.last_mut().unwrap();
            let room = block.remaining();
            if room == 0 {
                self.blocks.push(Block::new());
                continue;
            }
            let take = room.min(bytes.len());
            block.data.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            if bytes.is_empty() {
                break;
            }
        }
    }

    /// Encode a POD scalar, little-endian.
    pub fn encode<T: Pod>(&mut self, value: T) {
        self.encode_bytes(value.to_le());
    }

    /// Encode `n` contiguous values of `T` with no length prefix.
    pub fn encode_primitive_array<T: Pod>(&mut self, values: &[T]) {
        for v in values {
            self.encode(*v);
        }
    }

    /// Encode a length-prefixed array.
    pub fn encode_array<T: Pod>(&mut self, values: &[T]) {
        self.encode(values.len() as u64);
        self.encode_primitive_array(values);
    }

    /// Encode `Some`/`None` as a leading boolean followed by the value.
    pub fn encode_option<T: Pod>(&mut self, value: Option<T>) {
        match value {
            Some(v) => {
                self.encode(1u8);
                self.encode(v);
            }
            None => self.encode(0u8),
        }
    }

    /// Discard all appended bytes and restart at the head.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.blocks.push(Block::new());
    }

    /// Flatten into a single contiguous byte vector. Used to hand a snapshot
    /// to a `Decoder`, or to write the stream out to a file.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.offset() as usize);
        for block in &self.blocks {
            out.extend_from_slice(&block.data);
        }
        out
    }

    /// Take a snapshot of the current contents without disturbing further
    /// writes to `self`. Implemented by copying, since blocks are not
    /// reference-counted.
    pub fn snapshot(&self) -> Vec<u8> {
        self.to_bytes()
    }
}

/// Cursor-based reader over a flat byte buffer (typically a snapshot taken
/// from an [`Encoder`], or bytes read from a trace file).
pub struct Decoder<'a> {
    bytes: &'a [u8],
    cursor: usize,
    arena: TemporaryAllocator,
}

impl<'a> Decoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            cursor: 0,
            arena: TemporaryAllocator::new(),
        }
    }

    pub fn data_left(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    /// Advance past `n` bytes without interpreting them, e.g. to skip a
    /// frame's payload when the caller has no per-opcode decoder for it.
    pub fn skip(&mut self, n: usize) -> Result<(), CodecError> {
        self.take(n)?;
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.data_left() < n {
            return Err(CodecError::EndOfStream {
                requested: n,
                available: self.data_left(),
            });
        }
        let slice = &self.bytes[self.cursor..self.cursor + n];
        self.cursor += n;
        Ok(slice)
    }

    pub fn decode<T: Pod>(&mut self) -> Result<T, CodecError> {
        let bytes = self.take(mem::size_of::<T>())?;
        Ok(T::from_le(bytes))
    }

    pub fn decode_primitive_array<T: Pod>(&mut self, n: usize) -> Result<Vec<T>, CodecError> {
        (0..n).map(|_| self.decode()).collect()
    }

    pub fn decode_array<T: Pod>(&mut self) -> Result<Vec<T>, CodecError> {
        let len = self.decode::<u64>()? as usize;
        self.decode_primitive_array(len)
    }

    pub fn decode_option<T: Pod>(&mut self) -> Result<Option<T>, CodecError> {
        let has = self.decode::<u8>()? != 0;
        if has {
            Ok(Some(self.decode()?))
        } else {
            Ok(None)
        }
    }

    /// Scratch storage scoped to this decoder (and thus to the command
    /// currently being decoded from it).
    pub fn arena(&mut self) -> &mut TemporaryAllocator {
        &mut self.arena
    }
}

/// A type whose byte representation the codec knows how to read/write
/// little-endian. Implemented for the scalar types the wire format uses
/// directly; handles and enums encode through their `u64`/`u32`
/// representations at the call site.
pub trait Pod: Copy {
    fn to_le(self) -> Vec<u8>;
    fn from_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_pod_int {
    ($($t:ty),*) => {$(
        impl Pod for $t {
            fn to_le(self) -> Vec<u8> {
                self.to_le_bytes().to_vec()
            }
            fn from_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; mem::size_of::<$t>()];
                buf.copy_from_slice(bytes);
                <$t>::from_le_bytes(buf)
            }
        }
    )*};
}

impl_pod_int!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);
