//! Standalone trace inspector: reads a capture file written by the
//! interception layer and prints one line per recorded frame.
//!
//! Doesn't replay calls against a real driver — vk-trace-core's
//! `TransformBase` surface is a representative subset of the ~500-entry
//! Vulkan API, not a full backend, so there is no driver to replay through.
//! What this binary does is the structural half of what a player needs: walk
//! the frame stream, resolve each opcode's name, and report how many bytes
//! of payload it carried, which is enough to sanity-check a capture or diff
//! two of them.

use std::path::PathBuf;
use std::process::ExitCode;

use vkt::codec::Decoder;
use vkt::frame::{read_frame, Opcode};

#[derive(Debug, thiserror::Error)]
enum PlayerError {
    #[error("usage: vk-trace-player <trace-file>")]
    Usage,
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed trace: {0}")]
    Codec(#[from] vkt::codec::CodecError),
}

struct Args {
    trace_path: PathBuf,
}

fn parse_args() -> Result<Args, PlayerError> {
    let mut args = pico_args::Arguments::from_env();
    let trace_path: PathBuf = args.free_from_str().map_err(|_| PlayerError::Usage)?;
    Ok(Args { trace_path })
}

fn opcode_name(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::CreateInstance => "vkCreateInstance",
        Opcode::CreateDevice => "vkCreateDevice",
        Opcode::GetDeviceQueue => "vkGetDeviceQueue",
        Opcode::EnumeratePhysicalDevices => "vkEnumeratePhysicalDevices",
        Opcode::GetPhysicalDeviceMemoryProperties => "vkGetPhysicalDeviceMemoryProperties",
        Opcode::CreateBuffer => "vkCreateBuffer",
        Opcode::DestroyBuffer => "vkDestroyBuffer",
        Opcode::CreateImage => "vkCreateImage",
        Opcode::DestroyImage => "vkDestroyImage",
        Opcode::AllocateMemory => "vkAllocateMemory",
        Opcode::FreeMemory => "vkFreeMemory",
        Opcode::MapMemory => "vkMapMemory",
        Opcode::UnmapMemory => "vkUnmapMemory",
        Opcode::CreateDescriptorSetLayout => "vkCreateDescriptorSetLayout",
        Opcode::CreateDescriptorUpdateTemplate => "vkCreateDescriptorUpdateTemplate",
        Opcode::UpdateDescriptorSetWithTemplate => "vkUpdateDescriptorSetWithTemplate",
        Opcode::AllocateCommandBuffers => "vkAllocateCommandBuffers",
        Opcode::FreeCommandBuffers => "vkFreeCommandBuffers",
        Opcode::BeginCommandBuffer => "vkBeginCommandBuffer",
        Opcode::EndCommandBuffer => "vkEndCommandBuffer",
        Opcode::ResetCommandBuffer => "vkResetCommandBuffer",
        Opcode::CmdBeginRenderPass => "vkCmdBeginRenderPass",
        Opcode::CmdEndRenderPass => "vkCmdEndRenderPass",
        Opcode::CmdDraw => "vkCmdDraw",
        Opcode::CmdUpdateBuffer => "vkCmdUpdateBuffer",
        Opcode::CmdPushConstants => "vkCmdPushConstants",
        Opcode::QueueSubmit => "vkQueueSubmit",
        Opcode::GetQueryPoolResults => "vkGetQueryPoolResults",
        Opcode::GetPipelineCacheData => "vkGetPipelineCacheData",
        Opcode::GetMemoryHostPointerPropertiesExt => "vkGetMemoryHostPointerPropertiesEXT",
    }
}

fn dump(bytes: &[u8]) -> Result<usize, PlayerError> {
    let mut decoder = Decoder::new(bytes);
    let mut count = 0usize;
    while let Some((opcode, flags, payload_length)) = read_frame(&mut decoder)? {
        log::info!(
            "#{count:<5} {:<40} flags={flags:?} payload_bytes={payload_length}",
            opcode_name(opcode)
        );
        // This binary only reports frame shape, not call semantics — the
        // per-opcode decoders live in `vkt::deserialize::replay`; skip the
        // payload using its declared length so the next iteration lands on
        // the following frame's header.
        decoder.skip(payload_length as usize)?;
        count += 1;
    }
    Ok(count)
}

fn run() -> Result<(), PlayerError> {
    env_logger::init();
    let args = parse_args()?;
    let bytes = std::fs::read(&args.trace_path).map_err(|source| PlayerError::Read {
        path: args.trace_path.clone(),
        source,
    })?;
    let frames = dump(&bytes)?;
    log::info!("{frames} frame header(s) read from {}", args.trace_path.display());
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("vk-trace-player: {err}");
            ExitCode::FAILURE
        }
    }
}
