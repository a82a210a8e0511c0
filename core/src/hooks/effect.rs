use alloc::{boxed::Box, rc::Rc};
use core::{any::Any, cell::RefCell, fmt};

use super::Scope;

/// Returned by an effect body; runs before the effect re-runs and when the instance is
/// destroyed.
#[derive(Default)]
pub struct Cleanup(Option<Box<dyn FnOnce()>>);

impl Cleanup {
    /// No cleanup.
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }

    /// Runs `f` on cleanup.
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    fn run(self) {
        if let Some(f) = self.0 {
            f();
        }
    }
}

impl From<()> for Cleanup {
    fn from((): ()) -> Self {
        Self::none()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cleanup").field(&self.0.is_some()).finish()
    }
}

/// The persistent side of an effect hook: dependencies of the last effect that ran and
/// its pending cleanup.
#[derive(Debug, Default)]
pub(crate) struct EffectSlot {
    deps: RefCell<Option<Box<dyn Any>>>,
    cleanup: RefCell<Option<Cleanup>>,
}

impl EffectSlot {
    fn changed<D: PartialEq + 'static>(&self, deps: &D) -> bool {
        self.deps
            .borrow()
            .as_ref()
            .and_then(|previous| previous.downcast_ref::<D>())
            .is_none_or(|previous| previous != deps)
    }

    pub(crate) fn cleanup(&self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup.run();
        }
    }
}

/// An effect scheduled by a render, run once that render commits.
pub(crate) struct EffectJob {
    slot: Rc<EffectSlot>,
    deps: Box<dyn Any>,
    body: Box<dyn FnOnce() -> Cleanup>,
    layout: bool,
}

impl EffectJob {
    pub(crate) const fn is_layout(&self) -> bool {
        self.layout
    }

    /// Cleans up the previous run, runs the body and records its dependencies.
    pub(crate) fn run(self) {
        self.slot.cleanup();
        let cleanup = (self.body)();
        *self.slot.cleanup.borrow_mut() = Some(cleanup);
        *self.slot.deps.borrow_mut() = Some(self.deps);
    }
}

impl fmt::Debug for EffectJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectJob")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl Scope<'_> {
    /// Runs `body` after the render commits, when `deps` differ from the dependencies of
    /// the last run. The previous cleanup runs first.
    pub fn use_effect<D, F, C>(&mut self, deps: D, body: F)
    where
        D: PartialEq + 'static,
        F: FnOnce() -> C + 'static,
        C: Into<Cleanup>,
    {
        self.push_effect(deps, body, false);
    }

    /// Like [`Scope::use_effect`], but runs right after the display surface was mutated
    /// and before any plain effect of the same commit.
    pub fn use_layout_effect<D, F, C>(&mut self, deps: D, body: F)
    where
        D: PartialEq + 'static,
        F: FnOnce() -> C + 'static,
        C: Into<Cleanup>,
    {
        self.push_effect(deps, body, true);
    }

    fn push_effect<D, F, C>(&mut self, deps: D, body: F, layout: bool)
    where
        D: PartialEq + 'static,
        F: FnOnce() -> C + 'static,
        C: Into<Cleanup>,
    {
        let slot = self
            .stash
            .effects
            .next_or_insert_with(|| Rc::new(EffectSlot::default()))
            .clone();
        if !slot.changed(&deps) {
            return;
        }
        // Detached renders never commit.
        if let Some(effects) = self.effects.as_deref_mut() {
            effects.push(EffectJob {
                slot,
                deps: Box::new(deps),
                body: Box::new(move || body().into()),
                layout,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn rerun_cleans_up_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let slot = Rc::new(EffectSlot::default());
        for run in 0..2 {
            let log = log.clone();
            EffectJob {
                slot: slot.clone(),
                deps: Box::new(run),
                body: Box::new(move || {
                    log.borrow_mut().push(alloc::format!("run {run}"));
                    let log = log.clone();
                    Cleanup::new(move || log.borrow_mut().push(alloc::format!("clean {run}")))
                }),
                layout: false,
            }
            .run();
        }
        slot.cleanup();
        assert_eq!(*log.borrow(), ["run 0", "clean 0", "run 1", "clean 1"]);
    }

    #[test]
    fn unchanged_dependencies_are_detected() {
        let slot = EffectSlot::default();
        assert!(slot.changed(&1));
        *slot.deps.borrow_mut() = Some(Box::new(1));
        assert!(!slot.changed(&1));
        assert!(slot.changed(&2));
        assert!(slot.changed(&"other type"));
    }
}
