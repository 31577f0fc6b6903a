//! Error taxonomy.
//!
//! Recoverable errors are logged through the `log` facade at one of
//! [`LogSeverity`]'s five levels; fatal errors (stream corruption,
//! unimplemented hooks) are returned up to the caller, which is expected to
//! log at `Critical` and abort rather than continue past a framing error.

use crate::handle::HandleKind;

/// The five severities the `LogMessage` sink reports at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    Debug,
    Info,
    Error,
    Critical,
    /// Scoped to a specific live object; `log_object` tags the target
    /// string with the handle kind so a log filter can isolate one kind's
    /// diagnostics.
    Object,
}

impl LogSeverity {
    pub fn to_log_level(self) -> log::Level {
        match self {
            LogSeverity::Debug => log::Level::Debug,
            LogSeverity::Info => log::Level::Info,
            LogSeverity::Error => log::Level::Error,
            LogSeverity::Critical => log::Level::Error,
            LogSeverity::Object => log::Level::Debug,
        }
    }
}

/// Log a message at the given severity, matching the core's
/// `LogMessage(user_data, level, char*, length)` ABI surface minus the
/// `user_data` threading, which `layerer` handles separately.
pub fn log_message(severity: LogSeverity, message: &str) {
    log::log!(target: "vk_trace_core", severity.to_log_level(), "{message}");
}

/// Like [`log_message`], but scoped to one handle kind, for the `Object`
/// severity.
pub fn log_object(kind: HandleKind, message: &str) {
    log::log!(target: "vk_trace_core::object", log::Level::Debug, "[{kind}] {message}");
}

/// A fatal condition: the process should abort rather than continue. Used
/// by `vk-trace-player` to turn a fatal error into an exit path without
/// unwinding across what would, in a real layer, be a C ABI boundary.
pub fn abort_fatal(message: &str) -> ! {
    log::error!(target: "vk_trace_core", "fatal: {message}");
    std::process::abort();
}
