use alloc::rc::Rc;
use core::{
    cell::{self, RefCell},
    fmt,
};

use super::Scope;

/// A mutable box that lives as long as its instance. Writing it never re-renders.
pub struct Ref<T>(Rc<RefCell<T>>);

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ref").field(&self.0.borrow()).finish()
    }
}

impl<T> Ref<T> {
    /// Borrows the current value.
    #[must_use]
    pub fn borrow(&self) -> cell::Ref<'_, T> {
        self.0.borrow()
    }

    /// Mutably borrows the current value.
    #[must_use]
    pub fn borrow_mut(&self) -> cell::RefMut<'_, T> {
        self.0.borrow_mut()
    }

    /// Replaces the value.
    pub fn set(&self, value: T) {
        *self.0.borrow_mut() = value;
    }

    /// Returns `true` when both refs are the same box.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Clone> Ref<T> {
    /// Copies the current value out.
    #[must_use]
    pub fn get(&self) -> T {
        self.0.borrow().clone()
    }
}

impl Scope<'_> {
    /// Recomputes `compute(&deps)` only when `deps` changed.
    pub fn use_memo<D, T>(&mut self, deps: D, compute: impl FnOnce(&D) -> T) -> T
    where
        D: PartialEq + 'static,
        T: Clone + 'static,
    {
        self.stash.memo.cached(deps, compute)
    }

    /// Keeps the identity of `f` stable while `deps` are unchanged, so props holding it
    /// compare equal between renders.
    pub fn use_callback<D, F>(&mut self, deps: D, f: F) -> Rc<F>
    where
        D: PartialEq + 'static,
        F: 'static,
    {
        self.stash.callbacks.cached(deps, |_| Rc::new(f))
    }

    /// A box that persists across renders.
    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Ref<T> {
        Ref(self.stash.refs.cell("use_ref", init))
    }
}
