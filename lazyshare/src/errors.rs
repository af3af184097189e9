//! Error types for lazyshare.
//!
//! Every failure a caller can observe is a [`SharedError`]. The design follows
//! a few rules:
//!
//! - **Delivered asynchronously**: failures arrive through the same future as
//!   success, never as a panic.
//! - **Cloneable**: one failed open is reported to every queued waiter, so the
//!   factory's error is kept behind an `Arc`.
//! - **Invariant violations are distinct**: `DoubleClose`, `ClosedBeforeOpen`,
//!   `StaleHandle` and `CompletedTwice` indicate a programming error and are
//!   never retried.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use lazyshare::errors::SharedError;
//!
//! match shared.open().await {
//!     Ok(handle) => use_connection(handle.value()?),
//!     Err(SharedError::OpenFailed { source, .. }) => {
//!         // The factory could not open the resource; the wrapper is back
//!         // to `Closed` and the next `open()` will try again.
//!         tracing::warn!(error = %source, "connection unavailable");
//!     }
//!     Err(e) => return Err(e.into()),
//! }
//! ```

use std::sync::Arc;

use thiserror::Error;

/// Boxed factory error shared between every waiter of a failed generation.
pub type FactoryError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by [`SharedResource`](crate::SharedResource) and
/// [`SharedHandle`](crate::SharedHandle).
///
/// # Error Handling Strategy
///
/// - **OpenFailed / FactoryPanicked / OpenCancelled**: the generation never
///   opened; calling `open()` again starts a new one
/// - **CloseFailed / CloseAborted**: the resource is already considered
///   closed; log it
/// - **NoRuntime**: call `open()` from inside a tokio runtime, or configure
///   one with [`SharedResource::with_runtime`](crate::SharedResource::with_runtime)
/// - **HandleClosed**: the handle was used after `close()`
/// - Everything else: an invariant was violated. Log and investigate
#[derive(Debug, Clone, Error)]
pub enum SharedError {
    /// A handle was closed twice, or released against a `Closed` state.
    #[error("close called more than once (generation {generation})")]
    DoubleClose {
        /// Generation the handle belonged to
        generation: u64,
    },

    /// A release observed the resource still opening.
    #[error("close called before open completed (generation {generation})")]
    ClosedBeforeOpen {
        /// Generation currently opening
        generation: u64,
    },

    /// A release targeted a generation that is no longer the open one.
    #[error(
        "handle from generation {handle_generation} released against generation {current_generation}"
    )]
    StaleHandle {
        /// Generation recorded in the handle
        handle_generation: u64,
        /// Generation currently open
        current_generation: u64,
    },

    /// The completion dispatcher ran while the state was not `Opening`.
    #[error("complete invoked more than once (generation {generation})")]
    CompletedTwice {
        /// Generation observed when the violation was detected
        generation: u64,
    },

    /// The handle's value was read after the handle was closed.
    #[error("handle has already been closed")]
    HandleClosed,

    /// The underlying factory failed to open the resource.
    #[error("opening generation {generation} failed: {source}")]
    OpenFailed {
        /// Generation whose open failed
        generation: u64,
        /// Error reported by the factory
        #[source]
        source: FactoryError,
    },

    /// The underlying factory failed to close the resource.
    #[error("closing generation {generation} failed: {source}")]
    CloseFailed {
        /// Generation whose teardown failed
        generation: u64,
        /// Error reported by the factory
        #[source]
        source: FactoryError,
    },

    /// The underlying factory panicked while opening the resource.
    #[error("resource factory panicked while opening generation {generation}")]
    FactoryPanicked {
        /// Generation whose open panicked
        generation: u64,
    },

    /// The task running the factory's open was dropped before it finished,
    /// typically because its runtime shut down.
    #[error("opening generation {generation} was cancelled")]
    OpenCancelled {
        /// Generation whose open never completed
        generation: u64,
    },

    /// The task running the factory's close panicked or was cancelled.
    #[error("closing generation {generation} did not complete")]
    CloseAborted {
        /// Generation whose teardown was cut short
        generation: u64,
    },

    /// No tokio runtime was available to run the factory's open.
    #[error("no tokio runtime available to open the resource")]
    NoRuntime,
}

impl SharedError {
    /// Wraps a factory error raised while opening `generation`.
    pub fn open_failed<E>(generation: u64, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::OpenFailed {
            generation,
            source: Arc::new(error),
        }
    }

    /// Wraps a factory error raised while closing `generation`.
    pub fn close_failed<E>(generation: u64, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::CloseFailed {
            generation,
            source: Arc::new(error),
        }
    }

    /// Returns true for errors that indicate a bug rather than a runtime
    /// failure of the wrapped resource.
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::DoubleClose { .. }
                | Self::ClosedBeforeOpen { .. }
                | Self::StaleHandle { .. }
                | Self::CompletedTwice { .. }
        )
    }
}

/// Type alias for results returned by this crate.
pub type SharedResult<T> = Result<T, SharedError>;
