//! A shared task queue for recursive work that produces more work.
//!
//! Workers loop on [`TaskQueue::pop`] and report each finished task with
//! [`TaskQueue::task_done`]. `pop` blocks while the queue is empty but some task is still
//! being processed (it may push more), and returns `None` once every pushed task is done
//! or the queue was stopped.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

struct State<T> {
    tasks: VecDeque<T>,
    /// Pushed and not yet reported done, queued or in flight.
    pending: usize,
    stopped: bool,
}

pub struct TaskQueue<T> {
    state: Mutex<State<T>>,
    changed: Condvar,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                tasks: VecDeque::new(),
                pending: 0,
                stopped: false,
            }),
            changed: Condvar::new(),
        }
    }

    // Poisoning is ignored: no critical section can leave the state half-updated.
    #[inline(always)]
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, task: T) {
        let mut state = self.lock();
        if state.stopped {
            return;
        }
        state.tasks.push_back(task);
        state.pending += 1;
        drop(state);
        self.changed.notify_one();
    }

    /// Takes the next task, waiting while other workers may still produce one.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if state.stopped {
                return None;
            }
            if let Some(task) = state.tasks.pop_front() {
                return Some(task);
            }
            if state.pending == 0 {
                return None;
            }
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Marks one popped task as finished. Must be called after the task pushed its children.
    pub fn task_done(&self) {
        let mut state = self.lock();
        debug_assert!(state.pending > 0);
        state.pending = state.pending.saturating_sub(1);
        let exhausted = state.pending == 0;
        drop(state);
        if exhausted {
            self.changed.notify_all();
        }
    }

    /// Cooperative cancellation: queued tasks are dropped and every `pop` returns `None`.
    pub fn stop(&self) {
        let mut state = self.lock();
        state.stopped = true;
        state.tasks.clear();
        drop(state);
        self.changed.notify_all();
    }
}
