//! Tracing and logging setup shared by binaries and tests.

/// Initialize process-wide logging.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber construction (filters, formatters).
pub mod tracing;
