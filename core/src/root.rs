//! Mounting a descriptor tree onto a host and keeping it up to date.

use alloc::{rc::Rc, vec::Vec};
use core::{cell::RefCell, fmt};

use crate::{
    Descriptor, Error, Thrown,
    commit,
    host::{Host, MemNodeId, MemoryHost},
    props::{Event, EventHandler},
    reconcile::{Renderer, UpdateRecord},
    scheduler::{Flush, QueuedUpdate, Scheduler, UpdateKind, UpdateMode},
    tree::{ChildKey, ElementInstance, ElementKind, Instance, Node, NodeId, Tree},
};

struct RootInner<H: Host> {
    host: H,
    container: H::Node,
    tree: Tree<H::Node>,
    /// The fragment holding the descriptor passed to [`Root::render`].
    top: Option<NodeId>,
    pass: u64,
}

struct RootCell<H: Host> {
    scheduler: Rc<Scheduler>,
    view_transitions: bool,
    inner: RefCell<RootInner<H>>,
}

impl<H: Host> RootCell<H> {
    fn nearest_catching(tree: &Tree<H::Node>, from: NodeId, thrown: &Thrown) -> Option<NodeId> {
        let mut current = tree.get(from)?.parent;
        while let Some(id) = current {
            let node = tree.get(id)?;
            if let Some(ElementKind::Boundary(boundary, _)) = node.instance.as_element().map(|element| &element.kind) {
                if boundary.catches(thrown) {
                    return Some(id);
                }
            }
            current = node.parent;
        }
        None
    }
}

impl<H: Host> Flush for RootCell<H> {
    fn locate(&self, node: NodeId) -> Option<(u32, u64)> {
        self.inner
            .borrow()
            .tree
            .get(node)
            .map(|node| (node.depth, node.pass))
    }

    fn current_pass(&self) -> u64 {
        self.inner.borrow().pass
    }

    fn process(&self, update: QueuedUpdate) -> Result<(), Error> {
        let (reports, effects, retries, transitions) = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            inner.pass += 1;
            let mut record = UpdateRecord::new(update.kind, inner.pass);
            record.transitions.clone_from(&update.transitions);
            record.in_view_transition = self.view_transitions && update.view_transition;

            let mut target = update.node;
            let mut forced = None;
            loop {
                let outcome = Renderer {
                    tree: &mut inner.tree,
                    record: &mut record,
                    scheduler: &self.scheduler,
                }
                .render_root(target, forced.take());
                let Err(thrown) = outcome else {
                    break;
                };
                record.rollback_all(&mut inner.tree);
                let Some(boundary) = Self::nearest_catching(&inner.tree, target, &thrown) else {
                    drop(guard);
                    update.finish();
                    return Err(thrown.into_unhandled());
                };
                tracing::debug!(from = ?target, ?boundary, "rendering again from the catching boundary");
                target = boundary;
                forced = Some(thrown);
            }

            let reports = core::mem::take(&mut record.reports);
            let retries = core::mem::take(&mut record.retries);
            let transitions = record.transitions.clone();
            let effects = commit::commit(&mut inner.host, &inner.container, &mut inner.tree, target, record);
            (reports, effects, retries, transitions)
        };

        for (boundary, error) in reports {
            boundary.report(&error);
        }
        for job in effects {
            job.run();
        }

        for retry in retries {
            let keep = retry.kept_content;
            let held = if keep { transitions.clone() } else { Vec::new() };
            if keep {
                self.scheduler.track_in_flight(update.node, &held);
            }
            let kind = if keep {
                UpdateKind::Transition
            } else {
                UpdateKind::Sync
            };
            let queued = QueuedUpdate::new(retry.node, kind, held).with_view_transition(keep);
            self.scheduler.schedule_retry(queued, retry.pending);
        }
        update.finish();
        Ok(())
    }
}

/// Configures a [`Root`].
#[derive(Debug, Clone, Copy)]
#[must_use]
pub struct RootBuilder {
    update_mode: UpdateMode,
    view_transitions: bool,
}

impl Default for RootBuilder {
    fn default() -> Self {
        Self {
            update_mode: UpdateMode::default(),
            view_transitions: true,
        }
    }
}

impl RootBuilder {
    /// When state updates render. Defaults to [`UpdateMode::Microtask`].
    pub const fn update_mode(mut self, mode: UpdateMode) -> Self {
        self.update_mode = mode;
        self
    }

    /// Whether background retries of transitions commit inside a host view transition.
    /// Enabled by default.
    pub const fn view_transitions(mut self, enabled: bool) -> Self {
        self.view_transitions = enabled;
        self
    }

    /// Creates the root, rendering into `container`.
    pub fn build<H: Host + 'static>(self, host: H, container: H::Node) -> Root<H> {
        let cell = Rc::new(RootCell {
            scheduler: Rc::new(Scheduler::new(self.update_mode)),
            view_transitions: self.view_transitions,
            inner: RefCell::new(RootInner {
                host,
                container,
                tree: Tree::default(),
                top: None,
                pass: 0,
            }),
        });
        let flush: Rc<dyn Flush> = cell.clone();
        cell.scheduler.attach(Rc::downgrade(&flush));
        Root { cell }
    }
}

/// A mounted tree.
///
/// The root owns the host, the instance tree and the update scheduler. Dropping it
/// detaches every pending setter: later updates only log a warning.
pub struct Root<H: Host + 'static> {
    cell: Rc<RootCell<H>>,
}

impl<H: Host + 'static> fmt::Debug for Root<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.cell.inner.borrow();
        f.debug_struct("Root")
            .field("nodes", &inner.tree.len())
            .field("pass", &inner.pass)
            .field("scheduler", &self.cell.scheduler)
            .finish_non_exhaustive()
    }
}

impl<H: Host + 'static> Root<H> {
    /// Creates a root with the default configuration.
    pub fn new(host: H, container: H::Node) -> Self {
        RootBuilder::default().build(host, container)
    }

    /// Starts configuring a root.
    pub fn builder() -> RootBuilder {
        RootBuilder::default()
    }

    /// Renders `descriptor` into the container, replacing what was rendered before, and
    /// commits before returning.
    ///
    /// # Errors
    ///
    /// Returns an error when a render error or suspension escaped every boundary, in
    /// which case the previous content stays, or when an earlier background update
    /// failed.
    pub fn render(&self, descriptor: impl Into<Descriptor>) -> Result<(), Error> {
        let descriptor = descriptor.into();
        let top = {
            let mut inner = self.cell.inner.borrow_mut();
            let existing = inner.top.filter(|top| inner.tree.contains(*top));
            if let Some(top) = existing {
                if let Some(element) = inner.tree.get_mut(top).and_then(|node| node.instance.as_element_mut()) {
                    element.descriptors = alloc::vec![descriptor];
                }
                top
            } else {
                let top = inner.tree.insert(Node::new(
                    None,
                    0,
                    ChildKey::Position(0),
                    Instance::Element(ElementInstance {
                        kind: ElementKind::Fragment,
                        props: crate::Props::new(),
                        previous_props: None,
                        descriptors: alloc::vec![descriptor],
                    }),
                ));
                inner.top = Some(top);
                top
            }
        };
        self.cell
            .scheduler
            .push(QueuedUpdate::new(top, UpdateKind::Sync, Vec::new()));
        self.flush()
    }

    /// Renders every queued update now instead of on the next microtask turn.
    ///
    /// # Errors
    ///
    /// The first error of this flush, or one stored by an earlier scheduled flush.
    pub fn flush(&self) -> Result<(), Error> {
        self.cell.scheduler.flush()?;
        self.take_error().map_or(Ok(()), Err)
    }

    /// Takes the error of the last failed background flush.
    pub fn take_error(&self) -> Option<Error> {
        self.cell.scheduler.take_error()
    }

    /// Removes everything rendered and runs every effect cleanup.
    pub fn unmount(&self) {
        let mut guard = self.cell.inner.borrow_mut();
        let inner = &mut *guard;
        if let Some(top) = inner.top.take() {
            tracing::debug!(nodes = inner.tree.len(), "unmounting root");
            commit::unmount(&mut inner.host, &mut inner.tree, top);
        }
    }

    /// The container node passed at creation.
    pub fn container(&self) -> H::Node {
        self.cell.inner.borrow().container.clone()
    }

    /// Number of live instances.
    pub fn instance_count(&self) -> usize {
        self.cell.inner.borrow().tree.len()
    }

    /// Reads the host.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a render or commit of this root.
    pub fn with_host<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(&self.cell.inner.borrow().host)
    }

    /// Mutates the host. Changes made here are invisible to the reconciler.
    ///
    /// # Panics
    ///
    /// Panics when called from inside a render or commit of this root.
    pub fn with_host_mut<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.cell.inner.borrow_mut().host)
    }
}

impl Root<MemoryHost> {
    /// Creates a [`MemoryHost`] with a `div` container and mounts a root on it.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::builder().build_in_memory()
    }

    /// Delivers `event` to `target`: capture listeners from the outermost ancestor
    /// down, then bubble listeners from `target` up. Returns whether any listener ran.
    pub fn dispatch_event(&self, target: MemNodeId, event: &Event) -> bool {
        let handlers: Vec<EventHandler> = {
            let inner = self.cell.inner.borrow();
            let host = &inner.host;
            let mut path = Vec::new();
            let mut current = Some(target);
            while let Some(node) = current {
                path.push(node);
                current = host.parent(node);
            }
            let capture = path
                .iter()
                .rev()
                .filter_map(|&node| host.listener_in_phase(node, event.name(), true).cloned());
            let bubble = path
                .iter()
                .filter_map(|&node| host.listener_in_phase(node, event.name(), false).cloned());
            capture.chain(bubble).collect()
        };
        tracing::trace!(event = %event.name(), listeners = handlers.len(), "dispatching");
        for handler in &handlers {
            handler.call(event);
        }
        !handlers.is_empty()
    }
}

impl RootBuilder {
    /// Builds a root on a fresh [`MemoryHost`] with a `div` container.
    pub fn build_in_memory(self) -> Root<MemoryHost> {
        let mut host = MemoryHost::new();
        let container = host.create_root("div");
        self.build(host, container)
    }
}
