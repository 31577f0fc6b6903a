//! Structured human-readable dump of a transform's traffic, used by the
//! player binary and by tests that want to assert on call shape without
//! decoding raw frames.

use crate::handle::RawHandle;
use crate::transform::{BufferCreateInfo, MemoryAllocateInfo, TransformBase};
use ash::vk;
use std::fmt::Write as _;

/// Where a [`CommandPrinter`] sends its lines. Split out from the transform
/// itself so tests can assert against an in-memory `Vec<String>` while the
/// player writes to stdout.
pub trait Printer {
    fn line(&mut self, text: &str);
}

pub struct StdoutPrinter;

impl Printer for StdoutPrinter {
    fn line(&mut self, text: &str) {
        println!("{text}");
    }
}

/// Collects lines in memory; used by tests.
#[derive(Default)]
pub struct VecPrinter {
    pub lines: Vec<String>,
}

impl Printer for VecPrinter {
    fn line(&mut self, text: &str) {
        self.lines.push(text.to_owned());
    }
}

/// Diagnostic transform: logs one line per call, then forwards unchanged.
/// Never the terminal transform in a real pipeline (it has no opinion on
/// results), so it always wraps a `next`.
pub struct CommandPrinter<P: Printer> {
    pub printer: P,
    pub next: Option<Box<dyn TransformBase>>,
}

impl<P: Printer> CommandPrinter<P> {
    pub fn new(printer: P, next: Option<Box<dyn TransformBase>>) -> Self {
        Self { printer, next }
    }
}

impl<P: Printer + Send> TransformBase for CommandPrinter<P> {
    fn next_mut(&mut self) -> Option<&mut dyn TransformBase> {
        self.next.as_deref_mut()
    }

    fn create_buffer(
        &mut self,
        device: RawHandle,
        info: &BufferCreateInfo,
    ) -> (vk::Result, Option<RawHandle>) {
        let mut line = format!("vkCreateBuffer(device={device:#x}, size={}, usage={:#x})", info.size, info.usage);
        let result = match self.next.as_deref_mut() {
            Some(next) => next.create_buffer(device, info),
            None => (vk::Result::SUCCESS, None),
        };
        let _ = write!(line, " -> ({:?}, {:?})", result.0, result.1);
        self.printer.line(&line);
        result
    }

    fn destroy_buffer(&mut self, device: RawHandle, buffer: RawHandle) {
        if let Some(next) = self.next.as_deref_mut() {
            next.destroy_buffer(device, buffer);
        }
        self.printer
            .line(&format!("vkDestroyBuffer(device={device:#x}, buffer={buffer:#x})"));
    }

    fn allocate_memory(
        &mut self,
        device: RawHandle,
        info: &MemoryAllocateInfo,
    ) -> (vk::Result, Option<RawHandle>) {
        let mut line = format!(
            "vkAllocateMemory(device={device:#x}, size={}, type_index={})",
            info.allocation_size, info.memory_type_index
        );
        let result = match self.next.as_deref_mut() {
            Some(next) => next.allocate_memory(device, info),
            None => (vk::Result::SUCCESS, None),
        };
        let _ = write!(line, " -> ({:?}, {:?})", result.0, result.1);
        self.printer.line(&line);
        result
    }

    fn cmd_begin_render_pass(&mut self, cb: RawHandle, render_pass: RawHandle, framebuffer: RawHandle) {
        if let Some(next) = self.next.as_deref_mut() {
            next.cmd_begin_render_pass(cb, render_pass, framebuffer);
        }
        self.printer.line(&format!(
            "vkCmdBeginRenderPass(cb={cb:#x}, render_pass={render_pass:#x}, framebuffer={framebuffer:#x})"
        ));
    }

    fn cmd_end_render_pass(&mut self, cb: RawHandle) {
        if let Some(next) = self.next.as_deref_mut() {
            next.cmd_end_render_pass(cb);
        }
        self.printer.line(&format!("vkCmdEndRenderPass(cb={cb:#x})"));
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
        self.printer.line(&format!(
            "vkCmdDraw(cb={cb:#x}, vertex_count={vertex_count}, instance_count={instance_count}, first_vertex={first_vertex}, first_instance={first_instance})"
        ));
    }

    fn queue_submit(&mut self, queue: RawHandle, command_buffers: &[RawHandle]) -> vk::Result {
        let result = match self.next.as_deref_mut() {
            Some(next) => next.queue_submit(queue, command_buffers),
            None => vk::Result::SUCCESS,
        };
        self.printer.line(&format!(
            "vkQueueSubmit(queue={queue:#x}, command_buffers={command_buffers:?}) -> {result:?}"
        ));
        result
    }
}
