//! Tracing and logging setup shared by the service binaries.

/// Initialize process-wide tracing for `service`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(service: &str) {
    tracing::init(service);
}

/// Tracing configuration (filters, layers).
pub mod tracing;
