//! Testing utilities for code built on `lazyshare`.
//!
//! Enabled with the `testing` feature.
//!
//! - [`scripted`]: a [`ResourceFactory`](crate::ResourceFactory) whose opens
//!   can be held back, failed or made to panic on demand
//! - [`wake`]: wakers that record the order in which tasks are resumed
//! - [`generators`]: `proptest` strategies for names, close orders and open
//!   scripts
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use lazyshare::testing::prelude::*;
//! use lazyshare::SharedResource;
//!
//! let shared = SharedResource::new(ScriptedFactory::gated());
//! let pending = shared.open();
//! shared.factory().release_open();
//! let mut handle = pending.await?;
//! assert_eq!(handle.value()?.id, 1);
//! handle.close().await?;
//! assert_eq!(shared.factory().closed_ids(), vec![1]);
//! ```

pub mod generators;
pub mod scripted;
pub mod wake;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use super::generators::*;
    pub use super::scripted::*;
    pub use super::wake::*;
}
