//! A factory driven by the test instead of by real I/O.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::factory::ResourceFactory;

/// The resource produced by a [`ScriptedFactory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Sequence number of the open that produced this connection, from 1
    pub id: u64,
}

/// Error returned by scripted opens and closes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("scripted failure: {0}")]
pub struct ScriptedError(pub String);

/// What the next open does once it is let through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpenStep {
    /// Return a new [`Connection`].
    #[default]
    Succeed,
    /// Return a [`ScriptedError`].
    Fail,
    /// Panic inside the factory.
    Panic,
}

/// A [`ResourceFactory`] whose behavior is scripted by the test.
///
/// Opens run the queued [`OpenStep`]s in order and succeed once the script
/// is exhausted. A gated factory holds every open until
/// [`release_open`](Self::release_open) is called, which makes it possible
/// to queue callers behind an in-flight open deterministically.
#[derive(Debug, Default)]
pub struct ScriptedFactory {
    gate: Option<Arc<Semaphore>>,
    script: Mutex<VecDeque<OpenStep>>,
    failing_closes: AtomicUsize,
    close_delay: Option<Duration>,
    opens: AtomicU64,
    closes: AtomicU64,
    closes_finished: AtomicU64,
    closed: Mutex<Vec<u64>>,
}

impl ScriptedFactory {
    /// A factory whose opens complete as soon as they run.
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose opens wait for [`release_open`](Self::release_open).
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    /// Queues `steps` for the next opens.
    #[must_use]
    pub fn with_script(mut self, steps: impl IntoIterator<Item = OpenStep>) -> Self {
        self.script.get_mut().extend(steps);
        self
    }

    /// Makes every close take `delay` before it finishes.
    #[must_use]
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = Some(delay);
        self
    }

    /// Lets one held open proceed. Does nothing for an ungated factory.
    pub fn release_open(&self) {
        self.release_opens(1);
    }

    /// Lets `count` held opens proceed.
    pub fn release_opens(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Makes the next open fail.
    pub fn fail_next_open(&self) {
        self.script.lock().push_back(OpenStep::Fail);
    }

    /// Makes the next open panic.
    pub fn panic_next_open(&self) {
        self.script.lock().push_back(OpenStep::Panic);
    }

    /// Makes the next close return an error.
    pub fn fail_next_close(&self) {
        self.failing_closes.fetch_add(1, Ordering::SeqCst);
    }

    /// Opens that got past the gate, whatever their outcome.
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Closes run, whatever their outcome.
    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    /// Closes that ran to completion, including any close delay.
    pub fn closes_finished(&self) -> u64 {
        self.closes_finished.load(Ordering::SeqCst)
    }

    /// Ids of the connections passed to `close`, in call order.
    pub fn closed_ids(&self) -> Vec<u64> {
        self.closed.lock().clone()
    }
}

#[async_trait]
impl ResourceFactory for ScriptedFactory {
    type Resource = Connection;
    type Error = ScriptedError;

    async fn open(&self) -> Result<Connection, ScriptedError> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|error| ScriptedError(error.to_string()))?
                .forget();
        }

        let id = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        let step = self.script.lock().pop_front().unwrap_or_default();
        match step {
            OpenStep::Succeed => Ok(Connection { id }),
            OpenStep::Fail => Err(ScriptedError(format!("open {id} refused"))),
            OpenStep::Panic => panic!("scripted panic in open {id}"),
        }
    }

    async fn close(&self, connection: Arc<Connection>) -> Result<(), ScriptedError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.lock().push(connection.id);
        if let Some(delay) = self.close_delay {
            tokio::time::sleep(delay).await;
        }
        self.closes_finished.fetch_add(1, Ordering::SeqCst);

        let fail = self
            .failing_closes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            Err(ScriptedError(format!("close {} refused", connection.id)))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_runs_in_order_then_succeeds() {
        let factory = ScriptedFactory::new().with_script([OpenStep::Fail, OpenStep::Succeed]);

        assert!(factory.open().await.is_err());
        assert_eq!(factory.open().await.unwrap(), Connection { id: 2 });
        assert_eq!(factory.open().await.unwrap(), Connection { id: 3 });
        assert_eq!(factory.opens(), 3);
    }

    #[tokio::test]
    async fn closes_are_recorded_and_can_fail() {
        let factory = ScriptedFactory::new();
        factory.fail_next_close();

        assert!(factory.close(Arc::new(Connection { id: 4 })).await.is_err());
        assert!(factory.close(Arc::new(Connection { id: 5 })).await.is_ok());
        assert_eq!(factory.closes(), 2);
        assert_eq!(factory.closed_ids(), vec![4, 5]);
        assert_eq!(factory.closes_finished(), 2);
    }

    #[tokio::test]
    async fn delayed_close_finishes_after_the_delay() {
        let factory = Arc::new(ScriptedFactory::new().with_close_delay(Duration::from_millis(50)));
        let closing = {
            let factory = Arc::clone(&factory);
            tokio::spawn(async move { factory.close(Arc::new(Connection { id: 1 })).await })
        };

        tokio::task::yield_now().await;
        assert_eq!(factory.closes(), 1);
        assert_eq!(factory.closes_finished(), 0);

        closing.await.unwrap().unwrap();
        assert_eq!(factory.closes_finished(), 1);
    }

    #[tokio::test]
    async fn gated_open_waits_for_release() {
        let factory = Arc::new(ScriptedFactory::gated());
        let opening = {
            let factory = Arc::clone(&factory);
            tokio::spawn(async move { factory.open().await })
        };

        tokio::task::yield_now().await;
        assert_eq!(factory.opens(), 0);

        factory.release_open();
        assert_eq!(opening.await.unwrap().unwrap(), Connection { id: 1 });
    }
}
