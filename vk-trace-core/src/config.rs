//! Layer configuration surface, part of the user-transform module ABI.
//!
//! `LayerOptions` is handed to a user module's `SetupLayer` export at
//! instance creation and tells the core which command buffers (or all of
//! them) to record. `LayerOptions::from_env` follows the same "env var
//! overrides a struct of defaults" idiom the rest of the `wgpu` workspace
//! uses for backend/feature selection.

use crate::handle::RawHandle;
use std::collections::HashSet;

/// Which command buffers the recorder (`recorder.rs`) should attach an
/// encoder to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureScope {
    /// Record every command buffer (`LayerOptions_CaptureCommandsAllCommands`).
    All,
    /// Record only the listed command buffers (`LayerOptions_CaptureCommands`).
    Subset(HashSet<RawHandle>),
    /// Record nothing.
    None,
}

impl Default for CaptureScope {
    fn default() -> Self {
        CaptureScope::None
    }
}

#[derive(Clone, Debug)]
pub struct LayerOptions {
    pub capture: CaptureScope,
    /// Destination for the global stream, if any. `None` means "pipeline
    /// only" — useful for transform-chain testing without touching disk.
    pub trace_path: Option<std::path::PathBuf>,
    /// Free-form string handed back to a user module through
    /// `LayerOptions_GetUserConfig`.
    pub user_config: String,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            capture: CaptureScope::default(),
            trace_path: None,
            user_config: String::new(),
        }
    }
}

impl LayerOptions {
    /// Read `VK_TRACE_CAPTURE_ALL`, `VK_TRACE_FILE`, and `VK_TRACE_USER_CONFIG`
    /// over the defaults. `VK_TRACE_CAPTURE_ALL=1` selects [`CaptureScope::All`];
    /// otherwise capture stays [`CaptureScope::None`] until the application
    /// (or a user module) calls [`LayerOptions::capture_commands`].
    pub fn from_env() -> Self {
        let mut opts = Self::default();
        if std::env::var("VK_TRACE_CAPTURE_ALL").as_deref() == Ok("1") {
            opts.capture = CaptureScope::All;
        }
        if let Ok(path) = std::env::var("VK_TRACE_FILE") {
            opts.trace_path = Some(std::path::PathBuf::from(path));
        }
        if let Ok(config) = std::env::var("VK_TRACE_USER_CONFIG") {
            opts.user_config = config;
        }
        opts
    }

    /// `LayerOptions_CaptureCommandsAllCommands`.
    pub fn capture_all_commands(&mut self) {
        self.capture = CaptureScope::All;
    }

    /// `LayerOptions_CaptureCommands`.
    pub fn capture_commands(&mut self, buffers: impl IntoIterator<Item = RawHandle>) {
        self.capture = CaptureScope::Subset(buffers.into_iter().collect());
    }

    /// `LayerOptions_GetUserConfig`.
    pub fn user_config(&self) -> &str {
        &self.user_config
    }

    pub fn should_capture(&self, command_buffer: RawHandle) -> bool {
        match &self.capture {
            CaptureScope::All => true,
            CaptureScope::Subset(set) => set.contains(&command_buffer),
            CaptureScope::None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_captures_nothing() {
        let opts = LayerOptions::default();
        assert!(!opts.should_capture(1));
    }

    #[test]
    fn subset_only_captures_listed_buffers() {
        let mut opts = LayerOptions::default();
        opts.capture_commands([1, 2]);
        assert!(opts.should_capture(1));
        assert!(opts.should_capture(2));
        assert!(!opts.should_capture(3));
    }

    #[test]
    fn all_captures_everything() {
        let mut opts = LayerOptions::default();
        opts.capture_all_commands();
        assert!(opts.should_capture(999));
    }
}
