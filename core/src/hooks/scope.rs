use alloc::{format, rc::Rc, vec::Vec};
use core::{cell::Cell, fmt};

use rivulet_str::Str;

use super::{HookStash, effect::EffectJob};
use crate::{Context, Promise, Thrown, context::ContextStack, scheduler::Updater};

thread_local! {
    static NEXT_ID: Cell<u64> = const { Cell::new(0) };
}

/// The rendering context handed to a component body.
///
/// A scope ties every hook call to the instance being rendered. On a live root it can
/// schedule re-renders and collect effects; a detached scope, as used for markup
/// rendering, does neither.
pub struct Scope<'a> {
    pub(crate) stash: &'a mut HookStash,
    contexts: &'a ContextStack,
    pub(crate) updater: Option<Updater>,
    pub(crate) effects: Option<&'a mut Vec<EffectJob>>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(
        stash: &'a mut HookStash,
        contexts: &'a ContextStack,
        updater: Updater,
        effects: &'a mut Vec<EffectJob>,
    ) -> Self {
        Self {
            stash,
            contexts,
            updater: Some(updater),
            effects: Some(effects),
        }
    }

    /// A scope with no scheduler behind it: setters store values without re-rendering
    /// and effects are dropped.
    pub fn detached(stash: &'a mut HookStash, contexts: &'a ContextStack) -> Self {
        Self {
            stash,
            contexts,
            updater: None,
            effects: None,
        }
    }

    /// Returns `true` for scopes created with [`Scope::detached`].
    #[must_use]
    pub const fn is_detached(&self) -> bool {
        self.updater.is_none()
    }

    /// Reads the innermost provided value of `context`.
    #[must_use]
    pub fn use_context<T: 'static>(&self, context: &Context<T>) -> Rc<T> {
        self.contexts.lookup(context)
    }

    /// An identifier that stays the same for the lifetime of the instance.
    pub fn use_id(&mut self) -> Str {
        let id = self.stash.refs.cell("use_id", || {
            let id = NEXT_ID.with(|next| {
                let id = next.get();
                next.set(id + 1);
                id
            });
            Str::from(format!(":r{id}:"))
        });
        id.borrow().clone()
    }

    /// Reads a promise, suspending the component until it settles.
    ///
    /// The settled value is cached inside the promise itself, so the retry after a
    /// suspension reads it synchronously as long as the same promise is passed again.
    /// Promises must therefore be created outside the suspending component, or cached
    /// by something that outlives it.
    ///
    /// # Errors
    ///
    /// Returns [`Thrown::Suspended`] while pending and [`Thrown::Error`] when rejected.
    pub fn use_promise<T: Clone + 'static>(&mut self, promise: &Promise<T>) -> Result<T, Thrown> {
        let slot = self.stash.promises.next_or_insert_with(|| None);
        if !slot.as_ref().is_some_and(|pending| pending.ptr_eq(&promise.pending())) {
            *slot = Some(promise.pending());
        }
        match promise.peek() {
            core::task::Poll::Ready(Ok(value)) => Ok(value),
            core::task::Poll::Ready(Err(error)) => Err(Thrown::Error(error)),
            core::task::Poll::Pending => Err(Thrown::suspended(promise.pending())),
        }
    }
}

impl fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("detached", &self.is_detached())
            .finish_non_exhaustive()
    }
}
