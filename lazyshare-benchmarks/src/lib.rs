//! lazyshare Benchmarks
//!
//! Performance benchmarks for the lazyshare library: the uncontended
//! open/close path, joining an already open resource, and many tasks racing
//! on the same state cell.

#![deny(missing_docs)]

use tracing_subscriber::EnvFilter;

/// Installs a log subscriber controlled by `RUST_LOG`, silent by default.
///
/// Benchmarks call this once so that `RUST_LOG=lazyshare=debug` can be used
/// to inspect a run without changing code.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off")),
        )
        .try_init();
}
