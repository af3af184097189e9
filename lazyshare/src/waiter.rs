//! Waiters queued while a resource is opening.
//!
//! A [`Waiter`] is the continuation of one `open()` call. The completion
//! dispatcher [`resolve`](Waiter::resolve)s it exactly once; the caller's
//! future either [`take`](Waiter::take)s the outcome or
//! [`abandon`](Waiter::abandon)s it. A single atomic decides which of the two
//! owns a delivered reference, so exactly one of them releases it.
//!
//! [`WaiterList`] is the queue itself: a persistent list shared between state
//! snapshots, appended in O(1) and drained iteratively.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::Waker;

use futures::task::AtomicWaker;

use crate::errors::SharedResult;

const PENDING: u8 = 0;
const READY: u8 = 1;
const TAKEN: u8 = 2;
const ABANDONED: u8 = 3;

/// A counted reference to one generation's resource.
///
/// Whoever holds a `Grant` owns one unit of that generation's refcount and
/// must eventually release it.
#[derive(Debug)]
pub(crate) struct Grant<T> {
    pub(crate) generation: u64,
    pub(crate) resource: Arc<T>,
}

impl<T> Clone for Grant<T> {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            resource: Arc::clone(&self.resource),
        }
    }
}

/// What happened when the dispatcher resolved a waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// The caller's future will pick the outcome up.
    Delivered,
    /// The caller's future is gone; the dispatcher keeps ownership.
    Abandoned,
}

#[derive(Debug)]
pub(crate) struct Waiter<T> {
    state: AtomicU8,
    outcome: OnceLock<SharedResult<Grant<T>>>,
    waker: AtomicWaker,
}

impl<T> Waiter<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
            outcome: OnceLock::new(),
            waker: AtomicWaker::new(),
        }
    }

    /// Stores the outcome and wakes the caller.
    ///
    /// Called once by the completion dispatcher.
    pub(crate) fn resolve(&self, outcome: SharedResult<Grant<T>>) -> Delivery {
        if self.outcome.set(outcome).is_err() {
            tracing::error!("waiter resolved more than once");
            return Delivery::Abandoned;
        }

        match self
            .state
            .compare_exchange(PENDING, READY, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.waker.wake();
                Delivery::Delivered
            }
            Err(_) => Delivery::Abandoned,
        }
    }

    /// Registers the task to wake once the outcome is ready.
    pub(crate) fn register(&self, waker: &Waker) {
        self.waker.register(waker);
    }

    /// Takes the outcome if it has been delivered.
    ///
    /// Returns `None` while the waiter is still pending, and after the
    /// outcome has already been taken.
    pub(crate) fn take(&self) -> Option<SharedResult<Grant<T>>> {
        self.state
            .compare_exchange(READY, TAKEN, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .and_then(|_| self.outcome.get().cloned())
    }

    /// Gives up on the outcome.
    ///
    /// If the outcome was already delivered, it is returned so the caller can
    /// release the reference it carries. Otherwise the dispatcher will see
    /// the abandonment and release it instead.
    pub(crate) fn abandon(&self) -> Option<SharedResult<Grant<T>>> {
        match self
            .state
            .compare_exchange(PENDING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => None,
            Err(READY) => self.take(),
            Err(_) => None,
        }
    }
}

struct Node<T> {
    waiter: Arc<Waiter<T>>,
    next: Option<Arc<Node<T>>>,
}

impl<T> Drop for Node<T> {
    // Unlink the tail iteratively so a long queue cannot overflow the stack.
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut node) => next = node.next.take(),
                Err(_) => break,
            }
        }
    }
}

/// Persistent FIFO of waiters, stored newest first.
///
/// Appending shares the existing nodes with the previous snapshot, so a
/// failed compare-and-swap costs one node allocation.
pub(crate) struct WaiterList<T> {
    head: Option<Arc<Node<T>>>,
    len: usize,
}

impl<T> WaiterList<T> {
    pub(crate) fn single(waiter: Arc<Waiter<T>>) -> Self {
        Self::empty().push(waiter)
    }

    const fn empty() -> Self {
        Self { head: None, len: 0 }
    }

    /// Returns a new list with `waiter` appended at the back.
    pub(crate) fn push(&self, waiter: Arc<Waiter<T>>) -> Self {
        Self {
            head: Some(Arc::new(Node {
                waiter,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Collects the waiters in arrival order.
    pub(crate) fn to_fifo(&self) -> Vec<Arc<Waiter<T>>> {
        let mut waiters = Vec::with_capacity(self.len);
        let mut cursor = self.head.as_deref();
        while let Some(node) = cursor {
            waiters.push(Arc::clone(&node.waiter));
            cursor = node.next.as_deref();
        }
        waiters.reverse();
        waiters
    }
}

impl<T> std::fmt::Debug for WaiterList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaiterList").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SharedError;

    fn grant(generation: u64, value: &str) -> Grant<String> {
        Grant {
            generation,
            resource: Arc::new(value.to_string()),
        }
    }

    #[test]
    fn list_drains_in_arrival_order() {
        let first = Arc::new(Waiter::<String>::new());
        let second = Arc::new(Waiter::new());
        let third = Arc::new(Waiter::new());

        let list = WaiterList::single(Arc::clone(&first))
            .push(Arc::clone(&second))
            .push(Arc::clone(&third));

        assert_eq!(list.len(), 3);
        let drained = list.to_fifo();
        assert!(Arc::ptr_eq(&drained[0], &first));
        assert!(Arc::ptr_eq(&drained[1], &second));
        assert!(Arc::ptr_eq(&drained[2], &third));
    }

    #[test]
    fn appending_leaves_previous_snapshot_untouched() {
        let base = WaiterList::single(Arc::new(Waiter::<String>::new()));
        let extended = base.push(Arc::new(Waiter::new()));

        assert_eq!(base.len(), 1);
        assert_eq!(base.to_fifo().len(), 1);
        assert_eq!(extended.len(), 2);
    }

    #[test]
    fn dropping_a_long_list_does_not_overflow_the_stack() {
        let mut list = WaiterList::single(Arc::new(Waiter::<String>::new()));
        for _ in 0..200_000 {
            list = list.push(Arc::new(Waiter::new()));
        }
        assert_eq!(list.len(), 200_001);
        drop(list);
    }

    #[test]
    fn delivered_outcome_is_taken_once() {
        let waiter = Waiter::new();
        assert!(waiter.take().is_none());

        assert_eq!(waiter.resolve(Ok(grant(1, "db"))), Delivery::Delivered);

        let taken = waiter.take().unwrap().unwrap();
        assert_eq!(taken.generation, 1);
        assert_eq!(taken.resource.as_str(), "db");
        assert!(waiter.take().is_none());
        assert!(waiter.abandon().is_none());
    }

    #[test]
    fn abandoning_before_delivery_hands_ownership_to_dispatcher() {
        let waiter = Waiter::new();
        assert!(waiter.abandon().is_none());
        assert_eq!(waiter.resolve(Ok(grant(2, "db"))), Delivery::Abandoned);
        assert!(waiter.take().is_none());
    }

    #[test]
    fn abandoning_after_delivery_returns_the_grant() {
        let waiter = Waiter::new();
        assert_eq!(waiter.resolve(Ok(grant(4, "db"))), Delivery::Delivered);

        let returned = waiter.abandon().unwrap().unwrap();
        assert_eq!(returned.generation, 4);
    }

    #[test]
    fn errors_are_delivered_like_grants() {
        let waiter = Waiter::<String>::new();
        waiter.resolve(Err(SharedError::FactoryPanicked { generation: 9 }));

        match waiter.take() {
            Some(Err(SharedError::FactoryPanicked { generation: 9 })) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
