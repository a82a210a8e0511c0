//! Single-threaded promises.
//!
//! A [`Promise`] is a shared, settle-once cell. It doubles as the resolved-value cache
//! that `use_promise` reads: the settled value lives inside the promise allocation, so
//! the cache is keyed by promise identity and disappears together with the last clone.
//!
//! [`Pending`] is the type-erased handle that travels inside
//! [`Thrown::Suspended`](crate::Thrown::Suspended); boundaries only need to know *when*
//! something settles, never its value.

use alloc::{rc::Rc, vec::Vec};
use core::{
    cell::RefCell,
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll, Waker},
};

use crate::error::RenderError;

enum State<T> {
    Pending(Vec<Waker>),
    Resolved(T),
    Rejected(RenderError),
}

struct Shared<T> {
    state: RefCell<State<T>>,
}

impl<T> Shared<T> {
    fn settle(&self, next: State<T>) -> bool {
        let wakers = {
            let mut state = self.state.borrow_mut();
            if !matches!(*state, State::Pending(_)) {
                return false;
            }
            match core::mem::replace(&mut *state, next) {
                State::Pending(wakers) => wakers,
                _ => Vec::new(),
            }
        };
        for waker in wakers {
            waker.wake();
        }
        true
    }

    fn register(&self, waker: &Waker) -> bool {
        let mut state = self.state.borrow_mut();
        match &mut *state {
            State::Pending(wakers) => {
                if !wakers.iter().any(|known| known.will_wake(waker)) {
                    wakers.push(waker.clone());
                }
                false
            }
            _ => true,
        }
    }
}

/// A value that becomes available later.
pub struct Promise<T>(Rc<Shared<T>>);

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.0.state.borrow() {
            State::Pending(_) => "pending",
            State::Resolved(_) => "resolved",
            State::Rejected(_) => "rejected",
        };
        f.debug_tuple("Promise").field(&state).finish()
    }
}

impl<T: 'static> Promise<T> {
    /// Creates a pending promise and the resolver that settles it.
    #[must_use]
    pub fn new() -> (Self, Resolver<T>) {
        let shared = Rc::new(Shared {
            state: RefCell::new(State::Pending(Vec::new())),
        });
        (Self(shared.clone()), Resolver(shared))
    }

    /// Creates an already resolved promise.
    pub fn resolved(value: T) -> Self {
        Self(Rc::new(Shared {
            state: RefCell::new(State::Resolved(value)),
        }))
    }

    /// Creates an already rejected promise.
    #[must_use]
    pub fn rejected(error: RenderError) -> Self {
        Self(Rc::new(Shared {
            state: RefCell::new(State::Rejected(error)),
        }))
    }

    /// Runs `future` on the local task queue and settles with its output.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, RenderError>> + 'static,
    {
        let (promise, resolver) = Self::new();
        rivulet_task::spawn_local(async move {
            match future.await {
                Ok(value) => resolver.resolve(value),
                Err(error) => resolver.reject(error),
            }
        })
        .detach();
        promise
    }

    /// Returns `true` once resolved or rejected.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(*self.0.state.borrow(), State::Pending(_))
    }

    /// Returns `true` when both handles refer to the same promise.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Type-erased handle used to wait for settlement.
    #[must_use]
    pub fn pending(&self) -> Pending {
        Pending(self.0.clone())
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// Reads the settled value without waiting.
    #[must_use]
    pub fn peek(&self) -> Poll<Result<T, RenderError>> {
        match &*self.0.state.borrow() {
            State::Pending(_) => Poll::Pending,
            State::Resolved(value) => Poll::Ready(Ok(value.clone())),
            State::Rejected(error) => Poll::Ready(Err(error.clone())),
        }
    }
}

impl<T: Clone + 'static> Future for Promise<T> {
    type Output = Result<T, RenderError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.0.register(cx.waker()) {
            self.peek()
        } else {
            Poll::Pending
        }
    }
}

/// Settles a [`Promise`]. Settling twice is ignored.
pub struct Resolver<T>(Rc<Shared<T>>);

impl<T> Resolver<T> {
    /// Resolves with `value`, waking everything that waits on the promise.
    pub fn resolve(&self, value: T) {
        if !self.0.settle(State::Resolved(value)) {
            tracing::debug!("ignoring resolve of an already settled promise");
        }
    }

    /// Rejects with `error`.
    pub fn reject(&self, error: RenderError) {
        if !self.0.settle(State::Rejected(error)) {
            tracing::debug!("ignoring reject of an already settled promise");
        }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Resolver")
    }
}

trait Settle {
    fn is_settled(&self) -> bool;
    fn register(&self, waker: &Waker) -> bool;
}

impl<T> Settle for Shared<T> {
    fn is_settled(&self) -> bool {
        !matches!(*self.state.borrow(), State::Pending(_))
    }

    fn register(&self, waker: &Waker) -> bool {
        Self::register(self, waker)
    }
}

/// A not-yet-settled value, with its type erased.
#[derive(Clone)]
pub struct Pending(Rc<dyn Settle>);

impl Pending {
    /// Returns `true` once the underlying promise settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.0.is_settled()
    }

    /// Returns `true` when both handles refer to the same promise.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        core::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }

    /// Resolves once the promise settles, whatever the outcome.
    #[must_use]
    pub fn settled(&self) -> Settled {
        Settled(self.clone())
    }

    /// Resolves once every handle in `pending` settled.
    pub fn all(pending: Vec<Self>) -> impl Future<Output = ()> + 'static {
        async move {
            futures::future::join_all(pending.iter().map(Self::settled)).await;
        }
    }

    /// Appends `other` to `list` unless an identical handle is already there.
    pub fn merge_into(list: &mut Vec<Self>, other: impl IntoIterator<Item = Self>) {
        for pending in other {
            if !list.iter().any(|known| known.ptr_eq(&pending)) {
                list.push(pending);
            }
        }
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Future returned by [`Pending::settled`].
#[derive(Debug)]
pub struct Settled(Pending);

impl Future for Settled {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0.0.register(cx.waker()) {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settles_once() {
        let (promise, resolver) = Promise::new();
        assert!(promise.peek().is_pending());
        resolver.resolve(1);
        resolver.resolve(2);
        assert!(matches!(promise.peek(), Poll::Ready(Ok(1))));
    }

    #[test]
    fn waiting_on_all_requires_every_promise() {
        let (first, resolve_first) = Promise::<u8>::new();
        let (second, resolve_second) = Promise::<u8>::new();
        let task = rivulet_task::spawn_local(Pending::all(vec![first.pending(), second.pending()]));
        rivulet_task::run_until_stalled();
        assert!(!task.is_finished());
        resolve_second.resolve(2);
        rivulet_task::run_until_stalled();
        assert!(!task.is_finished());
        resolve_first.reject(RenderError::msg("gone"));
        rivulet_task::run_until_stalled();
        assert!(task.is_finished());
    }

    #[test]
    fn spawned_promise_resolves_through_the_queue() {
        let promise = Promise::spawn(async { Ok::<_, RenderError>("done") });
        assert!(!promise.is_settled());
        let value = rivulet_task::block_on(promise.clone());
        assert_eq!(value.ok(), Some("done"));
        assert!(promise.is_settled());
    }
}
