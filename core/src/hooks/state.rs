use alloc::rc::Rc;
use core::{cell::RefCell, fmt};

use super::Scope;
use crate::scheduler::Updater;

/// Writes a state slot and schedules a re-render of its owner.
pub struct Setter<T> {
    cell: Rc<RefCell<T>>,
    updater: Option<Updater>,
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            updater: self.updater.clone(),
        }
    }
}

impl<T> fmt::Debug for Setter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter")
            .field("updater", &self.updater)
            .finish_non_exhaustive()
    }
}

impl<T: PartialEq + Clone + 'static> Setter<T> {
    /// Stores `value` and requests an update, unless it equals the current value.
    pub fn set(&self, value: T) {
        {
            let mut current = self.cell.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }
        if let Some(updater) = &self.updater {
            updater.request();
        }
    }

    /// Computes the next value from the current one, then behaves like [`Setter::set`].
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.cell.borrow());
        self.set(next);
    }

    /// The latest stored value, which may be newer than the rendered one.
    #[must_use]
    pub fn get(&self) -> T {
        self.cell.borrow().clone()
    }
}

/// Sends actions through a reducer.
pub struct Dispatch<S, A> {
    setter: Setter<S>,
    reducer: Rc<dyn Fn(&S, A) -> S>,
}

impl<S, A> Clone for Dispatch<S, A> {
    fn clone(&self) -> Self {
        Self {
            setter: self.setter.clone(),
            reducer: self.reducer.clone(),
        }
    }
}

impl<S, A> fmt::Debug for Dispatch<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch").finish_non_exhaustive()
    }
}

impl<S: PartialEq + Clone + 'static, A> Dispatch<S, A> {
    /// Reduces `action` into the state.
    pub fn dispatch(&self, action: A) {
        self.setter.update(|state| (self.reducer)(state, action));
    }
}

impl Scope<'_> {
    /// Persistent state. `init` runs on the first render only.
    pub fn use_state<T>(&mut self, init: impl FnOnce() -> T) -> (T, Setter<T>)
    where
        T: PartialEq + Clone + 'static,
    {
        let cell = self.stash.state.cell("use_state", init);
        let value = cell.borrow().clone();
        (
            value,
            Setter {
                cell,
                updater: self.updater.clone(),
            },
        )
    }

    /// State changed only through `reducer`.
    pub fn use_reducer<S, A, R>(&mut self, reducer: R, init: impl FnOnce() -> S) -> (S, Dispatch<S, A>)
    where
        S: PartialEq + Clone + 'static,
        R: Fn(&S, A) -> S + 'static,
    {
        let (state, setter) = self.use_state(init);
        (
            state,
            Dispatch {
                setter,
                reducer: Rc::new(reducer),
            },
        )
    }
}
