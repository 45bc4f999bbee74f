//! Tracing and logging setup shared by binaries and tests.

/// Initialize process-wide logging to stdout.
///
/// Output format comes from `RECOGNITION_LOG_FORMAT`, filtering from
/// `RUST_LOG` (default `info`). Safe to call multiple times; subsequent calls
/// become no-ops.
pub fn init() {
    stdout::init(stdout::LogFormat::from_env(), "info");
}

/// Stdout subscriber configuration.
pub mod stdout;

/// Line-oriented log file output.
pub mod file;

pub use file::{FileLogConfig, FileLogError, LineFormat, file_layer, init_file};
pub use stdout::LogFormat;
