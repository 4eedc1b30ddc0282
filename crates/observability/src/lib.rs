//! Tracing setup and command activity logging shared by quire binaries.

/// Initialize process-wide tracing with JSON output.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::Json);
}

/// Tracing configuration (filters, output format).
pub mod tracing;

/// Forwarding of command lifecycle events into the log.
pub mod command_log;

pub use command_log::spawn_command_log;
pub use self::tracing::{LogFormat, init as init_with_format};
