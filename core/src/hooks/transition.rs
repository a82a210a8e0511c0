use core::fmt;

use super::{Scope, Setter};
use crate::scheduler::start_transition;

/// Starts transitions on behalf of a [`Scope::use_transition`] owner.
#[derive(Clone)]
pub struct StartTransition {
    pending: Setter<usize>,
}

impl StartTransition {
    /// Marks the owner pending, then runs `f` as a transition on the next microtask
    /// turn. The owner stops being pending once the transition committed or was
    /// superseded.
    pub fn start(&self, f: impl FnOnce() + 'static) {
        self.pending.update(|count| count + 1);
        let pending = self.pending.clone();
        rivulet_task::queue_microtask(move || {
            let transition = start_transition(f);
            rivulet_task::spawn_local(async move {
                transition.await;
                pending.update(|count| count.saturating_sub(1));
            })
            .detach();
        });
    }
}

impl fmt::Debug for StartTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartTransition").finish_non_exhaustive()
    }
}

impl Scope<'_> {
    /// Returns whether a transition started through the returned handle is still in
    /// flight, and the handle itself.
    pub fn use_transition(&mut self) -> (bool, StartTransition) {
        let (pending, setter) = self.use_state(|| 0_usize);
        (pending > 0, StartTransition { pending: setter })
    }
}
