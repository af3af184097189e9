//! Resource monitoring
//!
//! Point-in-time views of a shared resource: its current lifecycle state and
//! cumulative counters for opens, teardowns and issued handles.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Snapshot of a shared resource's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SharedStatus {
    /// No resource is live. `generation` is the last generation started.
    Closed {
        /// Last generation started, 0 if none
        generation: u64,
    },
    /// The factory's open is in flight.
    Opening {
        /// Generation being opened
        generation: u64,
        /// Callers queued for the open, including the one that started it
        waiters: usize,
    },
    /// The resource is live.
    Open {
        /// Generation currently open
        generation: u64,
        /// Outstanding handles
        handles: usize,
    },
}

impl SharedStatus {
    /// The generation this snapshot refers to.
    pub const fn generation(&self) -> u64 {
        match self {
            Self::Closed { generation }
            | Self::Opening { generation, .. }
            | Self::Open { generation, .. } => *generation,
        }
    }

    /// Returns true when no resource is live and no open is in flight.
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

/// Cumulative counters for a shared resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SharedStats {
    /// Generations whose open was started
    pub generations_started: u64,
    /// Generations whose open failed or panicked
    pub generations_failed: u64,
    /// Factory closes run
    pub teardowns: u64,
    /// Factory closes that returned an error
    pub teardown_failures: u64,
    /// Handles delivered to callers
    pub handles_issued: u64,
    /// References given back through `close()` or drop
    pub handles_released: u64,
    /// State transitions that lost a compare-and-swap race and retried
    pub cas_retries: u64,
}

impl SharedStats {
    /// References issued and not yet released.
    pub const fn outstanding(&self) -> u64 {
        self.handles_issued.saturating_sub(self.handles_released)
    }
}

#[derive(Debug, Default)]
pub(crate) struct LifecycleCounters {
    generations_started: AtomicU64,
    generations_failed: AtomicU64,
    teardowns: AtomicU64,
    teardown_failures: AtomicU64,
    handles_issued: AtomicU64,
    handles_released: AtomicU64,
}

impl LifecycleCounters {
    pub(crate) fn generation_started(&self) {
        self.generations_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn generation_failed(&self) {
        self.generations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn teardown(&self, succeeded: bool) {
        self.teardowns.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.teardown_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn handles_issued(&self, count: u64) {
        self.handles_issued.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn handle_released(&self) {
        self.handles_released.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, cas_retries: u64) -> SharedStats {
        SharedStats {
            generations_started: self.generations_started.load(Ordering::Relaxed),
            generations_failed: self.generations_failed.load(Ordering::Relaxed),
            teardowns: self.teardowns.load(Ordering::Relaxed),
            teardown_failures: self.teardown_failures.load(Ordering::Relaxed),
            handles_issued: self.handles_issued.load(Ordering::Relaxed),
            handles_released: self.handles_released.load(Ordering::Relaxed),
            cas_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counters_accumulate_into_snapshot() {
        let counters = LifecycleCounters::default();
        counters.generation_started();
        counters.handles_issued(3);
        counters.handle_released();
        counters.teardown(true);
        counters.teardown(false);

        let stats = counters.snapshot(5);
        assert_eq!(stats.generations_started, 1);
        assert_eq!(stats.handles_issued, 3);
        assert_eq!(stats.handles_released, 1);
        assert_eq!(stats.outstanding(), 2);
        assert_eq!(stats.teardowns, 2);
        assert_eq!(stats.teardown_failures, 1);
        assert_eq!(stats.cas_retries, 5);
    }

    #[test]
    fn status_serializes_with_state_tag() {
        let status = SharedStatus::Opening {
            generation: 2,
            waiters: 4,
        };
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            json!({ "state": "opening", "generation": 2, "waiters": 4 })
        );
        assert_eq!(status.generation(), 2);
        assert!(!status.is_closed());
        assert!(SharedStatus::Closed { generation: 0 }.is_closed());
    }
}
