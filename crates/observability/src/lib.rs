//! Tracing and logging setup shared by the wardgate binaries.

/// Install the process-wide subscriber in the given format.
///
/// Later calls are no-ops.
pub fn init(format: LogFormat) {
    self::tracing::init(format);
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use self::tracing::LogFormat;
