//! Cooperative, single-threaded task queue.
//!
//! Every thread owns one FIFO queue of runnables. [`spawn_local`] and
//! [`queue_microtask`] push onto it, and nothing runs until the owner drains it with
//! [`run_until_stalled`] or drives a future with [`block_on`]. This is the "microtask
//! turn" the update scheduler coalesces state changes into.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    future::Future,
    pin::pin,
    task::Poll,
};

use async_task::Runnable;

pub use async_task::Task;

thread_local! {
    static QUEUE: RefCell<VecDeque<Runnable>> = const { RefCell::new(VecDeque::new()) };
    static DRAINING: Cell<bool> = const { Cell::new(false) };
}

fn schedule(runnable: Runnable) {
    QUEUE.with(|queue| queue.borrow_mut().push_back(runnable));
}

/// Spawns a future onto the current thread's queue.
///
/// The returned [`Task`] cancels the future when dropped; call [`Task::detach`] to let
/// it run to completion in the background.
pub fn spawn_local<F>(future: F) -> Task<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    let (runnable, task) = async_task::spawn_local(future, schedule);
    runnable.schedule();
    task
}

/// Queues a closure to run on the next drain of the queue.
pub fn queue_microtask(f: impl FnOnce() + 'static) {
    spawn_local(async move { f() }).detach();
}

/// Returns the number of runnables waiting in the current thread's queue.
#[must_use]
pub fn pending() -> usize {
    QUEUE.with(|queue| queue.borrow().len())
}

/// Runs queued runnables until the queue is empty, returning how many ran.
///
/// Runnables scheduled while draining are run in the same call. A nested call made
/// from inside a runnable returns `0` immediately.
pub fn run_until_stalled() -> usize {
    if DRAINING.with(|draining| draining.replace(true)) {
        return 0;
    }
    let _draining = DrainGuard;
    let mut ran = 0;
    loop {
        let next = QUEUE.with(|queue| queue.borrow_mut().pop_front());
        let Some(runnable) = next else {
            break;
        };
        runnable.run();
        ran += 1;
    }
    ran
}

/// Clears the draining flag, also when a runnable panics.
struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        DRAINING.with(|draining| draining.set(false));
    }
}

/// Blocks the current thread on `future`, draining the local queue between polls.
///
/// The future must eventually be woken by work on this thread; awaiting something that
/// nothing will ever settle blocks forever.
pub fn block_on<F: Future>(future: F) -> F::Output {
    let mut future = pin!(future);
    futures_lite::future::block_on(futures_lite::future::poll_fn(move |cx| {
        run_until_stalled();
        match future.as_mut().poll(cx) {
            Poll::Ready(value) => Poll::Ready(value),
            Poll::Pending => {
                if pending() > 0 {
                    cx.waker().wake_by_ref();
                }
                Poll::Pending
            }
        }
    }))
}

/// Yields once to the queue.
pub async fn yield_now() {
    futures_lite::future::yield_now().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn microtasks_wait_for_a_drain() {
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        queue_microtask(move || counter.set(counter.get() + 1));
        assert_eq!(hits.get(), 0);
        assert_eq!(run_until_stalled(), 1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn tasks_spawned_while_draining_run_in_the_same_drain() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let outer = order.clone();
        queue_microtask(move || {
            outer.borrow_mut().push(1);
            let inner = outer.clone();
            queue_microtask(move || inner.borrow_mut().push(2));
        });
        run_until_stalled();
        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn a_panicking_task_does_not_stall_later_drains() {
        queue_microtask(|| panic!("boom"));
        let drained = std::panic::catch_unwind(run_until_stalled);
        assert!(drained.is_err());

        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        queue_microtask(move || counter.set(counter.get() + 1));
        assert_eq!(run_until_stalled(), 1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn block_on_drives_spawned_tasks() {
        let task = spawn_local(async {
            yield_now().await;
            21 * 2
        });
        assert_eq!(block_on(task), 42);
    }
}
