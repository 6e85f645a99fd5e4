//! Tracing and logging setup shared by the ledger binaries.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogFormat, ObservabilityConfig, UnknownLogFormat};

/// Initialize process-wide tracing.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init(config: &ObservabilityConfig) {
    self::tracing::init(config);
}
