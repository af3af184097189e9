//! The lock-free state machine behind a shared resource.
//!
//! The current [`State`] is an immutable snapshot behind an [`ArcSwap`].
//! Every transition loads the snapshot, computes its successor and installs
//! it with `compare_and_swap`; losing the race simply retries against the
//! snapshot that won. Snapshots are compared by pointer, and a snapshot held
//! by a retrying thread cannot be freed and reallocated, so there is no ABA.
//!
//! ```text
//! Closed ──admit──▶ Opening ──complete(Ok)──▶ Open ──release(last)──▶ Closed
//!                      │                                                ▲
//!                      └──────────────── complete(Err) ─────────────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::errors::{SharedError, SharedResult};
use crate::monitor::SharedStatus;
use crate::waiter::{Grant, Waiter, WaiterList};

#[derive(Debug)]
pub(crate) enum State<T> {
    Closed {
        generation: u64,
    },
    Opening {
        generation: u64,
        waiters: WaiterList<T>,
    },
    Open {
        generation: u64,
        resource: Arc<T>,
        count: usize,
    },
}

/// Result of asking for a reference.
pub(crate) enum Admission<T> {
    /// The caller moved the state from `Closed` to `Opening` and must start
    /// the factory's open.
    Initiated {
        generation: u64,
        waiter: Arc<Waiter<T>>,
    },
    /// The resource is opening; the caller was queued behind `position`
    /// earlier waiters.
    Queued {
        generation: u64,
        position: usize,
        waiter: Arc<Waiter<T>>,
    },
    /// The resource was already open.
    Ready(Grant<T>),
    /// The state was `Closed` and the caller is not able to start an open.
    Refused,
}

/// Result of resolving an in-flight open.
pub(crate) enum Completion<T> {
    Opened {
        grant: Grant<T>,
        waiters: Vec<Arc<Waiter<T>>>,
    },
    Failed {
        error: SharedError,
        waiters: Vec<Arc<Waiter<T>>>,
    },
}

/// Result of releasing one reference.
pub(crate) enum Release<T> {
    /// Other references remain.
    Retained { remaining: usize },
    /// That was the last reference; the caller must close the resource.
    Last(Grant<T>),
}

/// The single atomically updated cell holding a resource's state.
pub(crate) struct StateCell<T> {
    current: ArcSwap<State<T>>,
    retries: AtomicU64,
}

impl<T> StateCell<T> {
    pub(crate) fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(State::Closed { generation: 0 }),
            retries: AtomicU64::new(0),
        }
    }

    /// Installs `next` if the state is still `expected`.
    ///
    /// On conflict, returns the snapshot that won the race.
    fn swap(&self, expected: &Arc<State<T>>, next: State<T>) -> Result<(), Arc<State<T>>> {
        let previous = self.current.compare_and_swap(expected, Arc::new(next));
        if Arc::ptr_eq(&*previous, expected) {
            Ok(())
        } else {
            self.retries.fetch_add(1, Ordering::Relaxed);
            Err(Arc::clone(&*previous))
        }
    }

    /// Number of compare-and-swap attempts that lost a race.
    pub(crate) fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub(crate) fn status(&self) -> SharedStatus {
        match &**self.current.load() {
            State::Closed { generation } => SharedStatus::Closed {
                generation: *generation,
            },
            State::Opening {
                generation,
                waiters,
            } => SharedStatus::Opening {
                generation: *generation,
                waiters: waiters.len(),
            },
            State::Open {
                generation, count, ..
            } => SharedStatus::Open {
                generation: *generation,
                handles: *count,
            },
        }
    }

    /// Requests one reference to the resource.
    ///
    /// `can_initiate` is false when the caller has nowhere to run the
    /// factory's open; a `Closed` state is then left untouched.
    pub(crate) fn admit(&self, can_initiate: bool) -> Admission<T> {
        let waiter = Arc::new(Waiter::new());
        let mut current = self.current.load_full();
        loop {
            let (next, admission) = match &*current {
                State::Closed { .. } if !can_initiate => return Admission::Refused,
                State::Closed { generation } => {
                    let generation = generation + 1;
                    (
                        State::Opening {
                            generation,
                            waiters: WaiterList::single(Arc::clone(&waiter)),
                        },
                        Admission::Initiated {
                            generation,
                            waiter: Arc::clone(&waiter),
                        },
                    )
                }
                State::Opening {
                    generation,
                    waiters,
                } => (
                    State::Opening {
                        generation: *generation,
                        waiters: waiters.push(Arc::clone(&waiter)),
                    },
                    Admission::Queued {
                        generation: *generation,
                        position: waiters.len(),
                        waiter: Arc::clone(&waiter),
                    },
                ),
                State::Open {
                    generation,
                    resource,
                    count,
                } => (
                    State::Open {
                        generation: *generation,
                        resource: Arc::clone(resource),
                        count: count + 1,
                    },
                    Admission::Ready(Grant {
                        generation: *generation,
                        resource: Arc::clone(resource),
                    }),
                ),
            };

            match self.swap(&current, next) {
                Ok(()) => return admission,
                Err(observed) => current = observed,
            }
        }
    }

    /// Resolves the in-flight open with the factory's result.
    ///
    /// On success every queued waiter becomes one reference of the new
    /// generation. On failure the state returns to `Closed`.
    pub(crate) fn complete(&self, outcome: SharedResult<T>) -> SharedResult<Completion<T>> {
        let outcome = outcome.map(Arc::new);
        let mut current = self.current.load_full();
        loop {
            let (generation, waiters) = match &*current {
                State::Opening {
                    generation,
                    waiters,
                } => (*generation, waiters),
                State::Open { generation, .. } | State::Closed { generation } => {
                    return Err(SharedError::CompletedTwice {
                        generation: *generation,
                    });
                }
            };

            let next = match &outcome {
                Ok(resource) => State::Open {
                    generation,
                    resource: Arc::clone(resource),
                    count: waiters.len(),
                },
                Err(_) => State::Closed { generation },
            };

            match self.swap(&current, next) {
                Ok(()) => {
                    let waiters = waiters.to_fifo();
                    return Ok(match outcome {
                        Ok(resource) => Completion::Opened {
                            grant: Grant {
                                generation,
                                resource,
                            },
                            waiters,
                        },
                        Err(error) => Completion::Failed { error, waiters },
                    });
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Gives back one reference of `generation`.
    pub(crate) fn release(&self, generation: u64) -> SharedResult<Release<T>> {
        let mut current = self.current.load_full();
        loop {
            let (next, release) = match &*current {
                State::Closed { .. } => return Err(SharedError::DoubleClose { generation }),
                State::Opening {
                    generation: opening,
                    ..
                } => {
                    return Err(SharedError::ClosedBeforeOpen {
                        generation: *opening,
                    })
                }
                State::Open {
                    generation: open, ..
                } if *open != generation => {
                    return Err(SharedError::StaleHandle {
                        handle_generation: generation,
                        current_generation: *open,
                    })
                }
                State::Open {
                    resource, count: 1, ..
                } => (
                    State::Closed { generation },
                    Release::Last(Grant {
                        generation,
                        resource: Arc::clone(resource),
                    }),
                ),
                State::Open {
                    resource, count, ..
                } => (
                    State::Open {
                        generation,
                        resource: Arc::clone(resource),
                        count: count - 1,
                    },
                    Release::Retained {
                        remaining: count - 1,
                    },
                ),
            };

            match self.swap(&current, next) {
                Ok(()) => return Ok(release),
                Err(observed) => current = observed,
            }
        }
    }
}
