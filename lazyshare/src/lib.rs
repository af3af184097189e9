//! `lazyshare` - lazily opened, reference-counted shared resources
//!
//! A [`SharedResource`] wraps a [`ResourceFactory`] and hands out
//! [`SharedHandle`]s to a single underlying value. The value is opened on the
//! first request, shared by every handle issued while it is open, and closed
//! once the last handle is released. A later request starts a new
//! generation.
//!
//! The lifecycle is a lock-free state machine: one atomically swapped state
//! cell, with callers that arrive during an open queued and resumed in
//! arrival order by a single completion dispatcher. No thread ever blocks
//! waiting for the resource.
//!
//! # Example
//!
//! ```rust
//! use lazyshare::{FnFactory, SharedResource, SharedResourceConfig};
//! use lazyshare::config::ResourceName;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SharedResourceConfig::new().with_name(ResourceName::try_new("settings")?);
//! let shared = SharedResource::with_config(
//!     FnFactory::new(
//!         || async { Ok::<_, std::io::Error>(vec!["debug=true".to_string()]) },
//!         |_lines: std::sync::Arc<Vec<String>>| async { Ok::<(), std::io::Error>(()) },
//!     ),
//!     config,
//! );
//!
//! let (first, second) = tokio::join!(shared.open(), shared.open());
//! let (mut first, mut second) = (first?, second?);
//! assert_eq!(first.generation(), second.generation());
//!
//! first.close().await?;
//! second.close().await?;
//! assert_eq!(shared.stats().generations_started, 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod errors;
pub mod factory;
pub mod handle;
pub mod monitor;
pub mod shared;
mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod waiter;

pub use config::{ResourceName, SharedResourceConfig};
pub use errors::{FactoryError, SharedError, SharedResult};
pub use factory::{FnFactory, ResourceFactory};
pub use handle::{HandleId, SharedHandle};
pub use monitor::{SharedStats, SharedStatus};
pub use shared::{OpenFuture, SharedResource};
