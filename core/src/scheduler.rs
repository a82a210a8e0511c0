//! Update scheduling.
//!
//! State setters do not render. They queue an update for their owning node, and the
//! queue is flushed on the next microtask turn, so several setter calls in one turn
//! produce one render per node. Requests that arrive while a flush is running are
//! picked up by that same flush instead of starting a nested one.
//!
//! Setter calls made inside [`start_transition`] produce transition updates: if such an
//! update suspends under a boundary whose content is already on screen, that content
//! stays and the boundary is retried in the background. A newer request for the same
//! node supersedes a transition still waiting this way; the superseded
//! [`Transition`] resolves to `None`.

use alloc::{
    rc::{Rc, Weak},
    vec::Vec,
};
use core::{
    cell::{Cell, RefCell},
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use std::collections::HashMap;

use crate::{Error, Promise, promise::Resolver, tree::NodeId};

/// Nested flush rounds after which the remaining updates are dropped.
const MAX_FLUSH_ROUNDS: usize = 100;

/// When queued updates are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// On the next drain of the local task queue, coalescing every request made before.
    #[default]
    Microtask,
    /// Right away, inside the setter call.
    Immediate,
}

/// Why a render pass runs, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum UpdateKind {
    /// A root render or a suspense retry.
    Sync,
    /// A state setter call.
    Hook,
    /// A setter call inside a transition.
    Transition,
}

/// Tracks the updates a transition caused until all of them committed.
pub(crate) struct TransitionRecord {
    holds: Cell<usize>,
    done: RefCell<Option<Resolver<Option<()>>>>,
}

impl TransitionRecord {
    fn new(done: Resolver<Option<()>>) -> Self {
        Self {
            holds: Cell::new(0),
            done: RefCell::new(Some(done)),
        }
    }

    fn hold(&self) {
        self.holds.set(self.holds.get() + 1);
    }

    /// Drops one hold; the transition completes once none is left.
    fn release(&self) {
        let holds = self.holds.get().saturating_sub(1);
        self.holds.set(holds);
        if holds == 0 {
            self.finish(Some(()));
        }
    }

    fn cancel(&self) {
        self.finish(None);
    }

    fn finish(&self, outcome: Option<()>) {
        let done = self.done.borrow_mut().take();
        if let Some(done) = done {
            done.resolve(outcome);
        }
    }

    fn is_finished(&self) -> bool {
        self.done.borrow().is_none()
    }
}

impl fmt::Debug for TransitionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionRecord")
            .field("holds", &self.holds.get())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// A queued request to re-render one node.
#[derive(Debug)]
pub(crate) struct QueuedUpdate {
    pub node: NodeId,
    pub kind: UpdateKind,
    pub transitions: Vec<Rc<TransitionRecord>>,
    pub view_transition: bool,
}

impl QueuedUpdate {
    pub(crate) fn new(node: NodeId, kind: UpdateKind, transitions: Vec<Rc<TransitionRecord>>) -> Self {
        for transition in &transitions {
            transition.hold();
        }
        Self {
            node,
            kind,
            transitions,
            view_transition: false,
        }
    }

    pub(crate) const fn with_view_transition(mut self, enabled: bool) -> Self {
        self.view_transition = enabled;
        self
    }

    /// Releases the transitions waiting on this update.
    pub(crate) fn finish(self) {
        for transition in self.transitions {
            transition.release();
        }
    }

    fn merge(&mut self, other: Self) {
        self.kind = self.kind.min(other.kind);
        self.view_transition |= other.view_transition;
        for transition in other.transitions {
            if self.transitions.iter().any(|known| Rc::ptr_eq(known, &transition)) {
                transition.release();
            } else {
                self.transitions.push(transition);
            }
        }
    }
}

/// The root side of a flush.
pub(crate) trait Flush {
    /// Depth and last render pass of a live node; `None` once it was destroyed.
    fn locate(&self, node: NodeId) -> Option<(u32, u64)>;
    /// The number of the last render pass.
    fn current_pass(&self) -> u64;
    /// Renders and commits one update.
    fn process(&self, update: QueuedUpdate) -> Result<(), Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Queued,
    Flushing,
}

struct State {
    queue: Vec<QueuedUpdate>,
    phase: Phase,
    flush_again: bool,
    in_flight: HashMap<NodeId, Vec<Rc<TransitionRecord>>>,
    error: Option<Error>,
}

/// Coalesces update requests and runs them against a root.
pub(crate) struct Scheduler {
    mode: UpdateMode,
    state: RefCell<State>,
    root: RefCell<Option<Weak<dyn Flush>>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Scheduler")
            .field("mode", &self.mode)
            .field("phase", &state.phase)
            .field("queued", &state.queue.len())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub(crate) fn new(mode: UpdateMode) -> Self {
        Self {
            mode,
            state: RefCell::new(State {
                queue: Vec::new(),
                phase: Phase::Idle,
                flush_again: false,
                in_flight: HashMap::new(),
                error: None,
            }),
            root: RefCell::new(None),
        }
    }

    pub(crate) fn attach(&self, root: Weak<dyn Flush>) {
        *self.root.borrow_mut() = Some(root);
    }

    /// Queues a setter-triggered update of `node`.
    pub(crate) fn request_update(self: &Rc<Self>, node: NodeId) {
        let transition = current_transition();
        self.supersede(node, transition.as_ref());
        let kind = if transition.is_some() {
            UpdateKind::Transition
        } else {
            UpdateKind::Hook
        };
        self.enqueue(QueuedUpdate::new(node, kind, transition.into_iter().collect()));
    }

    /// Discards transitions still waiting on an earlier update of `node`.
    fn supersede(&self, node: NodeId, current: Option<&Rc<TransitionRecord>>) {
        let superseded = {
            let mut state = self.state.borrow_mut();
            let Some(records) = state.in_flight.get_mut(&node) else {
                return;
            };
            let (kept, superseded): (Vec<_>, Vec<_>) = records
                .drain(..)
                .partition(|record| current.is_some_and(|current| Rc::ptr_eq(current, record)));
            *records = kept;
            superseded
        };
        if !superseded.is_empty() {
            tracing::debug!(?node, count = superseded.len(), "superseding in-flight transitions");
        }
        for record in superseded {
            record.cancel();
        }
    }

    /// Remembers transitions that wait on a background retry started by an update of
    /// `node`.
    pub(crate) fn track_in_flight(&self, node: NodeId, transitions: &[Rc<TransitionRecord>]) {
        if transitions.is_empty() {
            return;
        }
        let mut state = self.state.borrow_mut();
        let records = state.in_flight.entry(node).or_default();
        for transition in transitions {
            if !records.iter().any(|known| Rc::ptr_eq(known, transition)) {
                records.push(transition.clone());
            }
        }
    }

    /// Adds `update` to the queue without scheduling a flush. Returns `true` when the
    /// queue was idle before.
    pub(crate) fn push(&self, update: QueuedUpdate) -> bool {
        let mut state = self.state.borrow_mut();
        if let Some(queued) = state.queue.iter_mut().find(|queued| queued.node == update.node) {
            queued.merge(update);
        } else {
            state.queue.push(update);
        }
        match state.phase {
            Phase::Idle => {
                state.phase = Phase::Queued;
                true
            }
            Phase::Queued => false,
            Phase::Flushing => {
                state.flush_again = true;
                false
            }
        }
    }

    /// Adds `update` to the queue and schedules a flush according to the update mode.
    pub(crate) fn enqueue(self: &Rc<Self>, update: QueuedUpdate) {
        if !self.push(update) {
            return;
        }
        match self.mode {
            UpdateMode::Microtask => {
                let scheduler = Rc::downgrade(self);
                rivulet_task::queue_microtask(move || {
                    if let Some(scheduler) = scheduler.upgrade() {
                        scheduler.run_scheduled();
                    }
                });
            }
            UpdateMode::Immediate => self.run_scheduled(),
        }
    }

    /// Re-renders `node` once every promise in `pending` settled.
    pub(crate) fn schedule_retry(self: &Rc<Self>, update: QueuedUpdate, pending: Vec<crate::promise::Pending>) {
        let scheduler = Rc::downgrade(self);
        rivulet_task::spawn_local(async move {
            crate::promise::Pending::all(pending).await;
            match scheduler.upgrade() {
                Some(scheduler) => {
                    tracing::debug!(node = ?update.node, "retrying suspended boundary");
                    scheduler.enqueue(update);
                }
                None => update.finish(),
            }
        })
        .detach();
    }

    fn run_scheduled(&self) {
        if let Err(error) = self.flush() {
            tracing::error!(%error, "update failed");
            self.state.borrow_mut().error = Some(error);
        }
    }

    pub(crate) fn take_error(&self) -> Option<Error> {
        self.state.borrow_mut().error.take()
    }

    /// Renders everything queued, including updates queued while flushing.
    ///
    /// A call made while a flush is already running only asks that flush to go again.
    pub(crate) fn flush(&self) -> Result<(), Error> {
        {
            let mut state = self.state.borrow_mut();
            if state.phase == Phase::Flushing {
                state.flush_again = true;
                return Ok(());
            }
            state.phase = Phase::Flushing;
        }
        let root = self.root.borrow().as_ref().and_then(Weak::upgrade);
        let result = root.map_or(Err(Error::RootDropped), |root| self.drain(&*root));

        let mut state = self.state.borrow_mut();
        state.phase = Phase::Idle;
        state.flush_again = false;
        state.in_flight.retain(|_, records| {
            records.retain(|record| !record.is_finished());
            !records.is_empty()
        });
        if result.is_err() {
            for update in state.queue.drain(..) {
                update.finish();
            }
        }
        result
    }

    fn drain(&self, root: &dyn Flush) -> Result<(), Error> {
        let mut result = Ok(());
        let mut round = 0;
        loop {
            let batch = {
                let mut state = self.state.borrow_mut();
                state.flush_again = false;
                core::mem::take(&mut state.queue)
            };
            if round == MAX_FLUSH_ROUNDS {
                tracing::error!(
                    dropped = batch.len(),
                    "updates keep scheduling more updates, giving up"
                );
                for update in batch {
                    update.finish();
                }
                break;
            }
            round += 1;

            let start = root.current_pass();
            let mut batch: Vec<_> = batch
                .into_iter()
                .filter_map(|update| match root.locate(update.node) {
                    Some((depth, _)) => Some((depth, update)),
                    None => {
                        update.finish();
                        None
                    }
                })
                .collect();
            batch.sort_by_key(|(depth, _)| *depth);
            tracing::debug!(round, updates = batch.len(), "flushing");

            for (_, update) in batch {
                match root.locate(update.node) {
                    // Destroyed, or already re-rendered with an ancestor in this batch.
                    None => update.finish(),
                    Some((_, pass)) if pass > start => update.finish(),
                    Some(_) => {
                        if let Err(error) = root.process(update) {
                            tracing::error!(%error, "update escaped the tree");
                            if result.is_ok() {
                                result = Err(error);
                            }
                        }
                    }
                }
            }

            if !self.state.borrow().flush_again {
                break;
            }
        }
        result
    }
}

/// Lets a state setter schedule a re-render of the node that owns it.
#[derive(Clone)]
pub(crate) struct Updater {
    scheduler: Weak<Scheduler>,
    node: NodeId,
}

impl Updater {
    pub(crate) fn new(scheduler: &Rc<Scheduler>, node: NodeId) -> Self {
        Self {
            scheduler: Rc::downgrade(scheduler),
            node,
        }
    }

    pub(crate) fn request(&self) {
        match self.scheduler.upgrade() {
            Some(scheduler) => scheduler.request_update(self.node),
            None => tracing::warn!(node = ?self.node, "state update on a dropped root"),
        }
    }
}

impl fmt::Debug for Updater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Updater").field(&self.node).finish()
    }
}

thread_local! {
    static CURRENT_TRANSITION: RefCell<Option<Rc<TransitionRecord>>> = const { RefCell::new(None) };
}

fn current_transition() -> Option<Rc<TransitionRecord>> {
    CURRENT_TRANSITION.with(|current| current.borrow().clone())
}

struct TransitionScope(Option<Rc<TransitionRecord>>);

impl Drop for TransitionScope {
    fn drop(&mut self) {
        let previous = self.0.take();
        CURRENT_TRANSITION.with(|current| *current.borrow_mut() = previous);
    }
}

/// Runs `f`, marking every state update it requests as a transition.
///
/// The returned [`Transition`] resolves to `Some(())` once all of those updates
/// committed, and to `None` if a newer update of the same node superseded them while
/// they waited on a suspended boundary.
pub fn start_transition(f: impl FnOnce()) -> Transition {
    let (promise, resolver) = Promise::new();
    let record = Rc::new(TransitionRecord::new(resolver));
    {
        let previous = CURRENT_TRANSITION.with(|current| current.replace(Some(record.clone())));
        let _scope = TransitionScope(previous);
        f();
    }
    if record.holds.get() == 0 {
        record.finish(Some(()));
    }
    Transition(promise)
}

/// Completion of a [`start_transition`] call.
#[derive(Debug, Clone)]
#[must_use = "a transition does nothing unless awaited, but its updates still run"]
pub struct Transition(Promise<Option<()>>);

impl Transition {
    /// Returns `true` once the transition committed or was superseded.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.0.is_settled()
    }
}

impl Future for Transition {
    type Output = Option<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx).map(|outcome| outcome.ok().flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_without_updates_finish_immediately() {
        let transition = start_transition(|| {});
        assert!(transition.is_finished());
        assert_eq!(rivulet_task::block_on(transition), Some(()));
    }

    #[test]
    fn transition_scope_is_restored() {
        let _ = start_transition(|| {
            assert!(current_transition().is_some());
            let _ = start_transition(|| assert!(current_transition().is_some()));
            assert!(current_transition().is_some());
        });
        assert!(current_transition().is_none());
    }

    #[test]
    fn merged_updates_keep_the_most_urgent_kind() {
        let (_, resolver) = Promise::new();
        let record = Rc::new(TransitionRecord::new(resolver));
        let node = NodeId::for_tests(0);
        let mut update = QueuedUpdate::new(node, UpdateKind::Transition, alloc::vec![record.clone()]);
        update.merge(QueuedUpdate::new(node, UpdateKind::Hook, alloc::vec![record.clone()]));
        assert_eq!(update.kind, UpdateKind::Hook);
        assert_eq!(update.transitions.len(), 1);
        assert_eq!(record.holds.get(), 1);
        update.finish();
        assert!(record.is_finished());
    }

    #[test]
    fn cancelled_transitions_resolve_to_none() {
        let (promise, resolver) = Promise::new();
        let record = TransitionRecord::new(resolver);
        record.hold();
        record.cancel();
        record.release();
        assert!(matches!(promise.peek(), Poll::Ready(Ok(None))));
    }
}
