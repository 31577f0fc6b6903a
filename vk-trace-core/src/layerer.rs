//! Loads a user-supplied shared library and splices it into the transform
//! chain, per the user-transform module ABI.
//!
//! A user module is a dynamic library exporting four C functions under
//! fixed names. `Layerer` resolves them with `libloading` and calls them at
//! the points the ABI defines:
//!
//! - `vk_trace_setup_layer`: called once, before any Vulkan call is
//!   forwarded; returns an opaque context pointer the module owns.
//! - `vk_trace_post_setup_internal_pointers`: called once the core's own
//!   state block exists, handing the module a pointer it can use for later
//!   calls back into this crate (currently just the state block's address,
//!   reserved for a richer internal API).
//! - `vk_trace_on_command_buffer_split`: called every time a command buffer
//!   is split across a queue-submit boundary, so the module can react to
//!   re-recording.
//! - `vk_trace_shutdown_layer`: called once, after the last Vulkan call has
//!   been forwarded, so the module can release its context.
//!
//! All four are optional; a module that doesn't export one is treated as
//! not implementing that hook.

use libloading::{Library, Symbol};
use std::ffi::c_void;
use std::path::Path;

pub type SetupLayerFn = unsafe extern "C" fn() -> *mut c_void;
pub type PostSetupInternalPointersFn = unsafe extern "C" fn(context: *mut c_void, state_block: *const c_void);
pub type OnCommandBufferSplitFn = unsafe extern "C" fn(context: *mut c_void, original: u64, split: u64);
pub type ShutdownLayerFn = unsafe extern "C" fn(context: *mut c_void);

#[derive(Debug, thiserror::Error)]
pub enum LayererError {
    #[error("failed to load user transform module {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: libloading::Error,
    },
    #[error("user module does not export vk_trace_post_setup_internal_pointers; it will receive no core callbacks")]
    MissingSetup,
}

/// One loaded user-transform module: the library kept alive for the
/// process lifetime (dropping it would invalidate any function pointer the
/// module handed back) plus the context it returned from setup.
pub struct Layerer {
    library: Library,
    context: *mut c_void,
}

// SAFETY: the module's ABI requires its exported functions to be callable
// from any thread; `context` is only ever touched through those functions.
unsafe impl Send for Layerer {}

impl Layerer {
    /// Load `path` and call its `vk_trace_setup_layer`, if exported.
    pub fn load(path: &Path) -> Result<Self, LayererError> {
        let library = unsafe { Library::new(path) }.map_err(|source| LayererError::Load {
            path: path.display().to_string(),
            source,
        })?;
        let context = unsafe {
            match library.get::<Symbol<SetupLayerFn>>(b"vk_trace_setup_layer\0") {
                Ok(setup) => setup(),
                Err(_) => std::ptr::null_mut(),
            }
        };
        Ok(Self { library, context })
    }

    /// Hand the module a pointer to the core's state block, once it exists.
    pub fn post_setup_internal_pointers(&self, state_block: *const c_void) {
        unsafe {
            match self
                .library
                .get::<Symbol<PostSetupInternalPointersFn>>(b"vk_trace_post_setup_internal_pointers\0")
            {
                Ok(hook) => hook(self.context, state_block),
                Err(_) => log::warn!(target: "vk_trace_core::layerer", "{}", LayererError::MissingSetup),
            }
        }
    }

    pub fn on_command_buffer_split(&self, original: u64, split: u64) {
        unsafe {
            if let Ok(hook) = self
                .library
                .get::<Symbol<OnCommandBufferSplitFn>>(b"vk_trace_on_command_buffer_split\0")
            {
                hook(self.context, original, split);
            }
        }
    }
}

impl Drop for Layerer {
    fn drop(&mut self) {
        unsafe {
            if let Ok(hook) = self.library.get::<Symbol<ShutdownLayerFn>>(b"vk_trace_shutdown_layer\0") {
                hook(self.context);
            }
        }
    }
}
