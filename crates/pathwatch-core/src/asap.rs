#![forbid(unsafe_code)]

//! Thread-local microtask queue.
//!
//! [`asap`] defers a task until the current synchronous turn ends. The host
//! loop ends a turn by calling [`run_microtasks`], which drains the queue in
//! FIFO order, including tasks queued by tasks that are already running.
//!
//! # Invariants
//!
//! 1. Tasks run in the order they were queued.
//! 2. No queue borrow is held while a task runs, so tasks may queue more work.
//! 3. A task queued during a drain runs in that same drain.

use std::cell::RefCell;
use std::collections::VecDeque;

type Task = Box<dyn FnOnce()>;

thread_local! {
    static QUEUE: RefCell<VecDeque<Task>> = RefCell::new(VecDeque::new());
}

/// Queue `task` to run after the current synchronous turn.
pub fn asap(task: impl FnOnce() + 'static) {
    QUEUE.with(|queue| queue.borrow_mut().push_back(Box::new(task)));
}

/// Drain the queue, returning the number of tasks run.
pub fn run_microtasks() -> usize {
    let mut ran = 0;
    while let Some(task) = QUEUE.with(|queue| queue.borrow_mut().pop_front()) {
        task();
        ran += 1;
    }
    ran
}

/// Whether any task is waiting.
#[must_use]
pub fn has_pending_microtasks() -> bool {
    QUEUE.with(|queue| !queue.borrow().is_empty())
}

/// Number of queued tasks.
#[must_use]
pub fn pending_microtasks() -> usize {
    QUEUE.with(|queue| queue.borrow().len())
}
