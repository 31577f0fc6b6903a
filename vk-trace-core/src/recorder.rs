//! Per-command-buffer side stream: every `vkCmd*` call is captured into its
//! own encoder keyed by the command buffer handle, not just appended to the
//! global stream.
//!
//! This is what makes re-recording possible: resetting or re-beginning a
//! command buffer discards only that buffer's encoder, and a snapshot taken
//! after `vkEndCommandBuffer` can be replayed through an arbitrary sink
//! later. Each buffer's encoder has exactly one writer by construction — the
//! application thread recording into it — so [`CommandBufferRecorder`]
//! needs a lock only to protect the *map* of encoders, not their contents.

use crate::codec::{CodecError, Decoder, Encoder};
use crate::deserialize::replay;
use crate::handle::RawHandle;
use crate::serialize::EncoderSink;
use crate::transform::TransformBase;
use crate::FastHashMap;
use parking_lot::RwLock;

/// Registry of per-command-buffer encoders.
#[derive(Default)]
pub struct CommandBufferRecorder {
    streams: RwLock<FastHashMap<RawHandle, Encoder>>,
}

impl CommandBufferRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) recording for `cb`, discarding any prior content.
    /// Called from `begin_command_buffer`/`reset_command_buffer` overrides.
    pub fn begin(&self, cb: RawHandle) {
        self.streams.write().insert(cb, Encoder::new());
    }

    pub fn forget(&self, cb: RawHandle) {
        self.streams.write().remove(&cb);
    }

    /// Bytes recorded for `cb` so far, or `None` if it was never begun (or
    /// was freed).
    pub fn snapshot(&self, cb: RawHandle) -> Option<Vec<u8>> {
        self.streams.read().get(&cb).map(Encoder::to_bytes)
    }
}

impl EncoderSink for CommandBufferRecorder {
    fn with_encoder<R>(&self, key: u64, f: impl FnOnce(&mut Encoder) -> R) -> R {
        let mut streams = self.streams.write();
        let encoder = streams.entry(key).or_insert_with(Encoder::new);
        f(encoder)
    }
}

/// A command buffer's recorded side stream, detached from the recorder that
/// produced it, ready to be driven through a different transform chain. The
/// replay driver lives in `vk-trace-player`; this type is just the
/// snapshot/ownership half.
pub struct RerecordCommandBuffer {
    pub source_cb: RawHandle,
    pub bytes: Vec<u8>,
}

impl RerecordCommandBuffer {
    pub fn capture(recorder: &CommandBufferRecorder, cb: RawHandle) -> Option<Self> {
        recorder.snapshot(cb).map(|bytes| Self { source_cb: cb, bytes })
    }

    /// Construct a deserializer over the snapshot and drain it, re-emitting
    /// every recorded call as a call on `sink`.
    pub fn replay_into(&self, sink: &mut dyn TransformBase) -> Result<(), CodecError> {
        let mut decoder = Decoder::new(&self.bytes);
        replay(&mut decoder, sink)
    }
}

/// Lifecycle transform: keeps a `CommandBufferRecorder` in sync with
/// `vkBeginCommandBuffer`/`vkResetCommandBuffer`/`vkFreeCommandBuffers`,
/// then forwards. Sits upstream of a `Serializer<&CommandBufferRecorder>`
/// (or an owning variant) so the per-buffer encoders exist before any
/// `vkCmd*` call tries to write into them.
pub struct RecorderLifecycle<'r> {
    pub recorder: &'r CommandBufferRecorder,
    pub next: Option<Box<dyn TransformBase>>,
}

impl<'r> RecorderLifecycle<'r> {
    pub fn new(recorder: &'r CommandBufferRecorder, next: Option<Box<dyn TransformBase>>) -> Self {
        Self { recorder, next }
    }
}

impl TransformBase for RecorderLifecycle<'_> {
    fn next_mut(&mut self) -> Option<&mut dyn TransformBase> {
        self.next.as_deref_mut()
    }

    fn begin_command_buffer(&mut self, cb: RawHandle) -> ash::vk::Result {
        self.recorder.begin(cb);
        match self.next.as_deref_mut() {
            Some(next) => next.begin_command_buffer(cb),
            None => ash::vk::Result::SUCCESS,
        }
    }

    fn reset_command_buffer(&mut self, cb: RawHandle, flags: u32) -> ash::vk::Result {
        self.recorder.begin(cb);
        match self.next.as_deref_mut() {
            Some(next) => next.reset_command_buffer(cb, flags),
            None => ash::vk::Result::SUCCESS,
        }
    }

    fn free_command_buffers(&mut self, device: RawHandle, pool: RawHandle, buffers: &[RawHandle]) {
        for &cb in buffers {
            self.recorder.forget(cb);
        }
        if let Some(next) = self.next.as_deref_mut() {
            next.free_command_buffers(device, pool, buffers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_then_snapshot_is_some_and_empty() {
        let recorder = CommandBufferRecorder::new();
        recorder.begin(1);
        assert_eq!(recorder.snapshot(1), Some(Vec::new()));
    }

    #[test]
    fn forget_clears_the_snapshot() {
        let recorder = CommandBufferRecorder::new();
        recorder.begin(1);
        recorder.forget(1);
        assert_eq!(recorder.snapshot(1), None);
    }

    #[test]
    fn reset_discards_prior_writes() {
        let recorder = CommandBufferRecorder::new();
        recorder.with_encoder(1, |e| e.encode::<u32>(0xAAAA_u32 as u32));
        assert!(!recorder.snapshot(1).unwrap().is_empty());
        recorder.begin(1);
        assert_eq!(recorder.snapshot(1), Some(Vec::new()));
    }

    #[test]
    fn capture_detaches_an_independent_copy() {
        let recorder = CommandBufferRecorder::new();
        recorder.begin(1);
        recorder.with_encoder(1, |e| e.encode::<u32>(7));
        let rerecord = RerecordCommandBuffer::capture(&recorder, 1).unwrap();
        recorder.begin(1);
        assert_ne!(rerecord.bytes, recorder.snapshot(1).unwrap());
        assert!(!rerecord.bytes.is_empty());
    }
}
