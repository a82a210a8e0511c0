use alloc::{boxed::Box, rc::Rc, vec::Vec};
use core::{any::Any, cell::RefCell};

use super::effect::EffectSlot;
use crate::promise::Pending;

/// Slots of one hook category, addressed by call order within a render.
#[derive(Debug)]
pub(crate) struct Slots<T> {
    items: Vec<T>,
    cursor: usize,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            cursor: 0,
        }
    }
}

impl<T> Slots<T> {
    pub(crate) fn next_or_insert_with(&mut self, init: impl FnOnce() -> T) -> &mut T {
        let index = self.cursor;
        self.cursor += 1;
        if index == self.items.len() {
            self.items.push(init());
        }
        &mut self.items[index]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    const fn used(&self) -> usize {
        self.cursor
    }

    const fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl Slots<Rc<dyn Any>> {
    /// The shared cell in the next slot, created with `init` on first use.
    pub(crate) fn cell<T: 'static>(
        &mut self,
        hook: &'static str,
        init: impl FnOnce() -> T,
    ) -> Rc<RefCell<T>> {
        let index = self.cursor;
        self.cursor += 1;
        if let Some(existing) = self.items.get(index) {
            if let Ok(cell) = existing.clone().downcast::<RefCell<T>>() {
                return cell;
            }
            tracing::warn!(hook, index, "hook slot changed type between renders, resetting it");
            let cell = Rc::new(RefCell::new(init()));
            self.items[index] = cell.clone();
            return cell;
        }
        let cell = Rc::new(RefCell::new(init()));
        self.items.push(cell.clone());
        cell
    }
}

impl Slots<Option<Box<dyn Any>>> {
    /// Returns the cached value while `deps` equal the cached dependencies, recomputing
    /// otherwise.
    pub(crate) fn cached<D, T>(&mut self, deps: D, compute: impl FnOnce(&D) -> T) -> T
    where
        D: PartialEq + 'static,
        T: Clone + 'static,
    {
        let slot = self.next_or_insert_with(|| None);
        if let Some((previous, value)) = slot.as_ref().and_then(|cached| cached.downcast_ref::<(D, T)>()) {
            if *previous == deps {
                return value.clone();
            }
        }
        let value = compute(&deps);
        *slot = Some(Box::new((deps, value.clone())));
        value
    }
}

/// Per-instance hook storage, one slot array per category.
///
/// The stash lives exactly as long as its instance. Slots are matched to hook calls by
/// position, so every render of an instance must call the same hooks in the same order.
/// After each render that completes, the number of calls per category is compared with
/// the previous completed render; a difference is reported as a bug in the component.
#[derive(Debug, Default)]
pub struct HookStash {
    pub(crate) state: Slots<Rc<dyn Any>>,
    pub(crate) effects: Slots<Rc<EffectSlot>>,
    pub(crate) callbacks: Slots<Option<Box<dyn Any>>>,
    pub(crate) memo: Slots<Option<Box<dyn Any>>>,
    pub(crate) refs: Slots<Rc<dyn Any>>,
    pub(crate) promises: Slots<Option<Pending>>,
    completed: Option<[usize; 6]>,
}

impl HookStash {
    /// Creates an empty stash.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewinds every cursor before a render.
    pub fn begin(&mut self) {
        self.state.rewind();
        self.effects.rewind();
        self.callbacks.rewind();
        self.memo.rewind();
        self.refs.rewind();
        self.promises.rewind();
    }

    /// Records the hook calls of a render that completed and checks them against the
    /// previous completed render.
    pub fn finish(&mut self, component: &str) {
        let counts = [
            self.state.used(),
            self.effects.used(),
            self.callbacks.used(),
            self.memo.used(),
            self.refs.used(),
            self.promises.used(),
        ];
        if let Some(previous) = self.completed {
            if previous != counts {
                tracing::warn!(
                    component,
                    ?previous,
                    current = ?counts,
                    "hooks were called in a different order than on the previous render"
                );
                debug_assert_eq!(previous, counts, "inconsistent hook calls in {component}");
            }
        }
        self.completed = Some(counts);
    }

    /// Runs every pending effect cleanup. Called when the instance is destroyed.
    pub(crate) fn run_cleanups(&self) {
        for slot in self.effects.iter() {
            slot.cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_reused_by_position() {
        let mut stash = HookStash::new();
        stash.begin();
        let first = stash.state.cell("state", || 1_u8);
        let second = stash.state.cell("state", || 2_u8);
        stash.finish("test");

        *first.borrow_mut() = 10;
        stash.begin();
        assert_eq!(*stash.state.cell("state", || 0_u8).borrow(), 10);
        assert!(Rc::ptr_eq(&second, &stash.state.cell("state", || 0_u8)));
        stash.finish("test");
    }

    #[test]
    fn cached_values_follow_their_dependencies() {
        let mut stash = HookStash::new();
        let mut computed = 0;
        for deps in [1, 1, 2] {
            stash.begin();
            stash.memo.cached(deps, |deps| {
                computed += 1;
                *deps * 10
            });
        }
        assert_eq!(computed, 2);
    }

    #[test]
    fn mismatched_slot_types_are_reset() {
        let mut stash = HookStash::new();
        stash.begin();
        stash.refs.cell("ref", || "text");
        stash.begin();
        assert_eq!(*stash.refs.cell("ref", || 5_u32).borrow(), 5);
    }
}
