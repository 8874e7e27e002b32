use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, MutexGuard};

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// FIFO work queue drained by a single consumer thread.
///
/// Producers never wait on the consumer; the queue is unbounded, so a slow
/// consumer lets it grow.
pub struct ActionQueue<T> {
    state: Mutex<State<T>>,
    available: Condvar,
}

impl<T> Default for ActionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ActionQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    // Items are only touched inside O(1) critical sections and handlers run
    // outside the lock, so a poisoned lock still holds a consistent queue.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append `item` at the tail. Returns false (dropping the item) once closed.
    pub fn enqueue(&self, item: T) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.items.push_back(item);
        if state.items.len() == 1 {
            self.available.notify_one();
        }
        true
    }

    /// Wait for the head item. `None` once the queue is closed and drained.
    pub fn next(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Stop accepting items. The consumer still drains what was queued.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumer loop: run `handler` on each item in order, one at a time.
    ///
    /// A panicking handler is reported and the loop carries on with the next
    /// item. Returns only after `close` once the queue is drained.
    pub fn run<F>(&self, mut handler: F)
    where
        F: FnMut(T),
    {
        while let Some(item) = self.next() {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| handler(item))) {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::warn!("queued action panicked: {}", reason);
            }
        }
    }
}
