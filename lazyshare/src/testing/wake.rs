//! Wakers that record who was woken and when.

use std::sync::Arc;
use std::task::Waker;

use futures::task::{waker, ArcWake};
use parking_lot::Mutex;

/// Hands out labelled wakers and records the order they are woken in.
///
/// ```rust,ignore
/// use lazyshare::testing::wake::WakeRecorder;
///
/// let recorder = WakeRecorder::new();
/// let first = recorder.waker(1);
/// let second = recorder.waker(2);
/// second.wake_by_ref();
/// first.wake();
/// assert_eq!(recorder.order(), vec![2, 1]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct WakeRecorder {
    log: Arc<Mutex<Vec<usize>>>,
}

struct LabelledWake {
    label: usize,
    log: Arc<Mutex<Vec<usize>>>,
}

impl ArcWake for LabelledWake {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.log.lock().push(arc_self.label);
    }
}

impl WakeRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// A waker that logs `label` each time it is woken.
    pub fn waker(&self, label: usize) -> Waker {
        waker(Arc::new(LabelledWake {
            label,
            log: Arc::clone(&self.log),
        }))
    }

    /// Labels in wake order, one entry per wake.
    pub fn order(&self) -> Vec<usize> {
        self.log.lock().clone()
    }

    /// Forgets every recorded wake.
    pub fn clear(&self) {
        self.log.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wakes_are_logged_per_label_in_order() {
        let recorder = WakeRecorder::new();
        let first = recorder.waker(1);
        let second = recorder.waker(2);

        second.wake_by_ref();
        first.wake_by_ref();
        second.wake();
        assert_eq!(recorder.order(), vec![2, 1, 2]);

        recorder.clear();
        assert!(recorder.order().is_empty());
    }
}
