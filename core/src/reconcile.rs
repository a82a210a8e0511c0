//! The render phase: evaluating components and matching descriptors to instances.
//!
//! Rendering only touches the instance tree. Every change is journaled in the
//! [`UpdateRecord`] so that a boundary can undo the partial work below it before showing
//! its fallback, and so that a whole pass can be discarded when a throw escapes it.
//! Display-surface mutations happen later, in [`crate::commit`].

use alloc::{boxed::Box, rc::Rc, vec::Vec};
use core::task::Poll;

use crate::{
    Boundary, Component, Descriptor, Props, RenderError, Thrown,
    context::ContextStack,
    descriptor::Tag,
    hooks::{EffectJob, Scope},
    promise::Pending,
    scheduler::{Scheduler, TransitionRecord, UpdateKind, Updater},
    tree::{BoundaryState, ChildKey, ElementKind, Instance, Node, NodeId, Snapshot, Tree},
};

#[derive(Debug)]
enum Undo {
    Restore(NodeId, Box<Snapshot>),
    Mounted(NodeId),
}

/// A boundary waiting for promises before it renders again.
#[derive(Debug)]
pub(crate) struct Retry {
    pub node: NodeId,
    pub pending: Vec<Pending>,
    /// The boundary kept its previous content on screen instead of the fallback.
    pub kept_content: bool,
}

/// A position in the [`UpdateRecord`] to roll back to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Mark {
    journal: usize,
    removals: usize,
    effects: usize,
    reports: usize,
    retries: usize,
}

/// Everything one render pass produced, until it commits.
#[derive(Debug)]
pub(crate) struct UpdateRecord {
    pub kind: UpdateKind,
    pub pass: u64,
    /// Set when a boundary caught an error during the pass.
    pub error_flag: bool,
    pub in_view_transition: bool,
    pub transitions: Vec<Rc<TransitionRecord>>,
    journal: Vec<Undo>,
    pub removals: Vec<NodeId>,
    pub effects: Vec<EffectJob>,
    /// Caught errors, passed to their boundary's `on_error` once the pass commits.
    pub reports: Vec<(Boundary, RenderError)>,
    pub retries: Vec<Retry>,
}

impl UpdateRecord {
    pub(crate) const fn new(kind: UpdateKind, pass: u64) -> Self {
        Self {
            kind,
            pass,
            error_flag: false,
            in_view_transition: false,
            transitions: Vec::new(),
            journal: Vec::new(),
            removals: Vec::new(),
            effects: Vec::new(),
            reports: Vec::new(),
            retries: Vec::new(),
        }
    }

    pub(crate) fn mark(&self) -> Mark {
        Mark {
            journal: self.journal.len(),
            removals: self.removals.len(),
            effects: self.effects.len(),
            reports: self.reports.len(),
            retries: self.retries.len(),
        }
    }

    /// Saves `id` before its first change in this pass.
    pub(crate) fn touch<N>(&mut self, tree: &mut Tree<N>, id: NodeId) {
        let Some(node) = tree.get_mut(id) else {
            return;
        };
        if node.pass != self.pass {
            self.journal.push(Undo::Restore(id, Box::new(node.snapshot())));
            node.pass = self.pass;
        }
    }

    /// Saves `id` unconditionally and returns a mark taken just before, so rolling back
    /// to it restores `id` as it is now.
    fn checkpoint<N>(&mut self, tree: &Tree<N>, id: NodeId) -> Mark {
        let mark = self.mark();
        if let Some(node) = tree.get(id) {
            self.journal.push(Undo::Restore(id, Box::new(node.snapshot())));
        }
        mark
    }

    fn mounted(&mut self, id: NodeId) {
        self.journal.push(Undo::Mounted(id));
    }

    /// Undoes everything recorded after `mark`.
    pub(crate) fn rollback_to<N>(&mut self, mark: Mark, tree: &mut Tree<N>) {
        while self.journal.len() > mark.journal {
            match self.journal.pop() {
                Some(Undo::Restore(id, snapshot)) => {
                    if let Some(node) = tree.get_mut(id) {
                        node.restore(*snapshot);
                    }
                }
                Some(Undo::Mounted(id)) => {
                    tree.remove(id);
                }
                None => break,
            }
        }
        self.removals.truncate(mark.removals);
        self.effects.truncate(mark.effects);
        self.reports.truncate(mark.reports);
        self.retries.truncate(mark.retries);
    }

    /// Undoes the whole pass.
    pub(crate) fn rollback_all<N>(&mut self, tree: &mut Tree<N>) {
        self.rollback_to(
            Mark {
                journal: 0,
                removals: 0,
                effects: 0,
                reports: 0,
                retries: 0,
            },
            tree,
        );
        self.error_flag = false;
    }
}

/// Result of matching new child descriptors against the previous children.
#[derive(Debug, Default)]
pub(crate) struct Reconciled {
    /// The new children, in order.
    pub next: Vec<NodeId>,
    /// Previous children that did not survive.
    pub removed: Vec<NodeId>,
}

/// Renders nodes of one tree within one update pass.
pub(crate) struct Renderer<'a, N> {
    pub tree: &'a mut Tree<N>,
    pub record: &'a mut UpdateRecord,
    pub scheduler: &'a Rc<Scheduler>,
}

impl<N> Renderer<'_, N> {
    /// Renders `id` and its subtree as the root of an update.
    ///
    /// With `forced`, `id` must be a boundary and is rendered as if its children had
    /// thrown that value.
    pub(crate) fn render_root(&mut self, id: NodeId, forced: Option<Thrown>) -> Result<(), Thrown> {
        let mut contexts = self.ancestor_contexts(id);
        self.record.touch(self.tree, id);
        match forced {
            Some(thrown) => self.render_boundary(id, &mut contexts, Some(thrown)),
            None => self.render_node(id, &mut contexts),
        }
    }

    fn ancestor_contexts(&self, id: NodeId) -> ContextStack {
        let mut providers = Vec::new();
        let mut current = self.tree.get(id).and_then(|node| node.parent);
        while let Some(parent) = current {
            let Some(node) = self.tree.get(parent) else {
                break;
            };
            if let Some(ElementKind::Provider(provided)) = node.instance.as_element().map(|element| &element.kind) {
                providers.push(provided.clone());
            }
            current = node.parent;
        }
        let mut contexts = ContextStack::new();
        for provided in providers.into_iter().rev() {
            contexts.push(provided);
        }
        contexts
    }

    fn render_node(&mut self, id: NodeId, contexts: &mut ContextStack) -> Result<(), Thrown> {
        let Some(element) = self.tree.get(id).and_then(|node| node.instance.as_element()) else {
            return Ok(());
        };
        let descriptors = element.descriptors.clone();
        match element.kind.clone() {
            ElementKind::Host(_) | ElementKind::Fragment => {
                self.reconcile_children(id, &descriptors, contexts)
            }
            ElementKind::Component(component) => {
                let props = element.props.clone();
                self.render_component(id, &component, &props, &descriptors, contexts)
            }
            ElementKind::Provider(provided) => {
                contexts.push(provided);
                let result = self.reconcile_children(id, &descriptors, contexts);
                contexts.pop();
                result
            }
            ElementKind::Boundary(..) => self.render_boundary(id, contexts, None),
        }
    }

    fn render_component(
        &mut self,
        id: NodeId,
        component: &Component,
        props: &Props,
        children: &[Descriptor],
        contexts: &mut ContextStack,
    ) -> Result<(), Thrown> {
        let Some(node) = self.tree.get_mut(id) else {
            return Ok(());
        };
        let mut stash = core::mem::take(&mut node.stash);
        stash.begin();
        let result = {
            let mut scope = Scope::new(
                &mut stash,
                contexts,
                Updater::new(self.scheduler, id),
                &mut self.record.effects,
            );
            component.call(&mut scope, props, children)
        };
        if result.is_ok() {
            stash.finish(component.name());
        }
        if let Some(node) = self.tree.get_mut(id) {
            node.stash = stash;
        }
        let descriptor = result?;
        self.reconcile_children(id, core::slice::from_ref(&descriptor), contexts)
    }

    fn render_boundary(
        &mut self,
        id: NodeId,
        contexts: &mut ContextStack,
        forced: Option<Thrown>,
    ) -> Result<(), Thrown> {
        let Some((boundary, state, descriptors)) = self.tree.get(id).and_then(|node| {
            let element = node.instance.as_element()?;
            match &element.kind {
                ElementKind::Boundary(boundary, state) => {
                    Some((boundary.clone(), state.clone(), element.descriptors.clone()))
                }
                _ => None,
            }
        }) else {
            return Ok(());
        };

        if let Some(error) = &state.captured {
            return self.render_fallback(id, boundary.fallback(Some(error)), contexts);
        }

        let mark = self.record.checkpoint(self.tree, id);
        let outcome = match forced {
            Some(thrown) => Err(thrown),
            None => self.reconcile_children(id, &descriptors, contexts),
        };
        let thrown = match outcome {
            Ok(()) => {
                self.update_boundary(id, |state| {
                    state.showing_fallback = false;
                    state.content_committed = true;
                });
                return Ok(());
            }
            Err(thrown) if !boundary.catches(&thrown) => return Err(thrown),
            Err(thrown) => thrown,
        };

        self.record.rollback_to(mark, self.tree);
        match thrown {
            Thrown::Error(error) => {
                tracing::error!(%error, boundary = ?id, "render error caught by boundary");
                self.record.error_flag = true;
                let fallback = boundary.fallback(Some(&error));
                self.record.reports.push((boundary, error.clone()));
                self.update_boundary(id, |state| {
                    state.captured = Some(error);
                    state.showing_fallback = true;
                });
                self.render_fallback(id, fallback, contexts)
            }
            Thrown::Suspended(pending) => {
                let keep_content = self.record.kind == UpdateKind::Transition
                    && state.content_committed
                    && !state.showing_fallback;
                self.record.retries.push(Retry {
                    node: id,
                    pending,
                    kept_content: keep_content,
                });
                if keep_content {
                    tracing::debug!(boundary = ?id, "transition suspended, keeping committed content");
                    return Ok(());
                }
                tracing::debug!(boundary = ?id, "suspended, showing fallback");
                self.update_boundary(id, |state| state.showing_fallback = true);
                self.render_fallback(id, boundary.fallback(None), contexts)
            }
        }
    }

    fn update_boundary(&mut self, id: NodeId, f: impl FnOnce(&mut BoundaryState)) {
        if let Some(state) = self
            .tree
            .get_mut(id)
            .and_then(|node| node.instance.boundary_state_mut())
        {
            f(state);
        }
    }

    fn render_fallback(
        &mut self,
        id: NodeId,
        fallback: Descriptor,
        contexts: &mut ContextStack,
    ) -> Result<(), Thrown> {
        self.render_keyed(id, alloc::vec![(ChildKey::Fallback, fallback)], contexts)
    }

    /// Reconciles `descriptors` as the children of `parent` and renders them.
    ///
    /// Suspensions of siblings are collected so a boundary waits on all of them at
    /// once; the first error stops the walk.
    fn reconcile_children(
        &mut self,
        parent: NodeId,
        descriptors: &[Descriptor],
        contexts: &mut ContextStack,
    ) -> Result<(), Thrown> {
        let mut suspended = Vec::new();
        let mut children = Vec::with_capacity(descriptors.len());
        for (position, descriptor) in descriptors.iter().enumerate() {
            match resolve(descriptor) {
                Ok(Some(resolved)) => {
                    let key = resolved.key().map_or(ChildKey::Position(position), |key| {
                        ChildKey::Explicit(key.clone())
                    });
                    children.push((key, resolved));
                }
                Ok(None) => {}
                Err(Thrown::Suspended(pending)) => Pending::merge_into(&mut suspended, pending),
                Err(error) => return Err(error),
            }
        }
        let rendered = self.render_keyed(parent, children, contexts);
        match rendered {
            Err(Thrown::Suspended(pending)) => {
                Pending::merge_into(&mut suspended, pending);
            }
            Err(error) => return Err(error),
            Ok(()) => {}
        }
        if suspended.is_empty() {
            Ok(())
        } else {
            Err(Thrown::Suspended(suspended))
        }
    }

    fn render_keyed(
        &mut self,
        parent: NodeId,
        children: Vec<(ChildKey, Descriptor)>,
        contexts: &mut ContextStack,
    ) -> Result<(), Thrown> {
        let Reconciled { next, removed } = self.reconcile(parent, children);
        self.record.removals.extend(removed);

        let mut suspended = Vec::new();
        for child in next {
            match self.render_node(child, contexts) {
                Ok(()) => {}
                Err(Thrown::Suspended(pending)) => Pending::merge_into(&mut suspended, pending),
                Err(error) => return Err(error),
            }
        }
        if suspended.is_empty() {
            Ok(())
        } else {
            Err(Thrown::Suspended(suspended))
        }
    }

    /// Matches `children` against the current children of `parent`.
    ///
    /// Each descriptor takes the first unmatched previous child with an equal key.
    /// Same kind: the instance is reused with the new props. Different kind or no
    /// match: a fresh instance is mounted, and a mismatched old one is removed, as is
    /// every previous child left unmatched. The parent's child list and the
    /// `next_sibling` chain are updated to the new order.
    pub(crate) fn reconcile(&mut self, parent: NodeId, children: Vec<(ChildKey, Descriptor)>) -> Reconciled {
        let Some(parent_node) = self.tree.get(parent) else {
            return Reconciled::default();
        };
        let depth = parent_node.depth + 1;
        let mut unmatched: Vec<Option<NodeId>> =
            parent_node.children.iter().copied().map(Some).collect();

        let mut reconciled = Reconciled {
            next: Vec::with_capacity(children.len()),
            removed: Vec::new(),
        };
        for (key, descriptor) in children {
            let tree = &*self.tree;
            let found = unmatched
                .iter_mut()
                .find(|slot| slot.is_some_and(|id| tree.get(id).is_some_and(|node| node.key == key)))
                .and_then(Option::take);
            let id = match found {
                Some(id) if tree.get(id).is_some_and(|node| node.instance.matches(&descriptor)) => {
                    self.reuse(id, &descriptor);
                    id
                }
                Some(id) => {
                    reconciled.removed.push(id);
                    match self.mount(parent, depth, key, &descriptor) {
                        Some(id) => id,
                        None => continue,
                    }
                }
                None => match self.mount(parent, depth, key, &descriptor) {
                    Some(id) => id,
                    None => continue,
                },
            };
            reconciled.next.push(id);
        }
        reconciled.removed.extend(unmatched.into_iter().flatten());

        for (index, &id) in reconciled.next.iter().enumerate() {
            let next_sibling = reconciled.next.get(index + 1).copied();
            if let Some(node) = self.tree.get_mut(id) {
                node.next_sibling = next_sibling;
            }
        }
        if let Some(parent) = self.tree.get_mut(parent) {
            parent.children.clone_from(&reconciled.next);
        }
        reconciled
    }

    fn reuse(&mut self, id: NodeId, descriptor: &Descriptor) {
        self.record.touch(self.tree, id);
        let Some(node) = self.tree.get_mut(id) else {
            return;
        };
        match (&mut node.instance, descriptor) {
            (Instance::Text(instance), Descriptor::Text(text)) => {
                if instance.text != *text {
                    instance.text = text.clone();
                    instance.dirty = true;
                }
            }
            (Instance::Text(instance), Descriptor::Raw(raw)) => {
                if instance.text != *raw.text() {
                    instance.text = raw.text().clone();
                    instance.dirty = true;
                }
            }
            (Instance::Element(instance), Descriptor::Element(element)) => {
                let previous = core::mem::replace(&mut instance.props, element.props().clone());
                if matches!(instance.kind, ElementKind::Host(_)) && instance.previous_props.is_none() {
                    instance.previous_props = Some(previous);
                }
                instance.descriptors = element.children().to_vec();
                match (&mut instance.kind, element.tag()) {
                    (ElementKind::Component(current), Tag::Component(next)) => {
                        *current = next.clone();
                    }
                    (ElementKind::Boundary(current, _), Tag::Boundary(next)) => {
                        *current = next.clone();
                    }
                    (ElementKind::Provider(current), Tag::Provider(next)) => {
                        *current = next.clone();
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn mount(&mut self, parent: NodeId, depth: u32, key: ChildKey, descriptor: &Descriptor) -> Option<NodeId> {
        let instance = Instance::from_descriptor(descriptor)?;
        let mut node = Node::new(Some(parent), depth, key, instance);
        node.pass = self.record.pass;
        let id = self.tree.insert(node);
        self.record.mounted(id);
        Some(id)
    }
}

/// Unwraps deferred descriptors. `Ok(None)` for descriptors that render nothing.
fn resolve(descriptor: &Descriptor) -> Result<Option<Descriptor>, Thrown> {
    match descriptor {
        Descriptor::Empty => Ok(None),
        Descriptor::Deferred(promise) => match promise.peek() {
            Poll::Ready(Ok(inner)) => resolve(&inner),
            Poll::Ready(Err(error)) => Err(Thrown::Error(error)),
            Poll::Pending => Err(Thrown::suspended(promise.pending())),
        },
        other => Ok(Some(other.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        descriptor::{element, text},
        scheduler::UpdateMode,
        tree::ElementInstance,
    };
    use rivulet_str::Str;

    struct Fixture {
        tree: Tree<()>,
        record: UpdateRecord,
        scheduler: Rc<Scheduler>,
        root: NodeId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut tree = Tree::default();
            let root = tree.insert(Node::new(
                None,
                0,
                ChildKey::Position(0),
                Instance::Element(ElementInstance {
                    kind: ElementKind::Fragment,
                    props: Props::new(),
                    previous_props: None,
                    descriptors: Vec::new(),
                }),
            ));
            Self {
                tree,
                record: UpdateRecord::new(UpdateKind::Sync, 1),
                scheduler: Rc::new(Scheduler::new(UpdateMode::Immediate)),
                root,
            }
        }

        fn next_pass(&mut self) {
            let pass = self.record.pass + 1;
            self.record = UpdateRecord::new(UpdateKind::Sync, pass);
        }

        fn reconcile(&mut self, children: Vec<Descriptor>) -> Reconciled {
            let keyed = children
                .into_iter()
                .enumerate()
                .map(|(position, child)| {
                    let key = child
                        .key()
                        .map_or(ChildKey::Position(position), |key| ChildKey::Explicit(key.clone()));
                    (key, child)
                })
                .collect();
            Renderer {
                tree: &mut self.tree,
                record: &mut self.record,
                scheduler: &self.scheduler,
            }
            .reconcile(self.root, keyed)
        }
    }

    fn item(key: &'static str) -> Descriptor {
        element("li", Props::new(), [text(key)]).keyed(key)
    }

    #[test]
    fn keyed_children_are_reused_across_reorders() {
        let mut fixture = Fixture::new();
        let first = fixture.reconcile(alloc::vec![item("a"), item("b")]);
        fixture.next_pass();
        let second = fixture.reconcile(alloc::vec![item("b"), item("a")]);
        assert_eq!(second.next, [first.next[1], first.next[0]]);
        assert!(second.removed.is_empty());
        let head = fixture.tree.get(second.next[0]).unwrap();
        assert_eq!(head.next_sibling, Some(second.next[1]));
    }

    #[test]
    fn tag_changes_remount() {
        let mut fixture = Fixture::new();
        let first = fixture.reconcile(alloc::vec![element("p", Props::new(), [text("x")])]);
        fixture.next_pass();
        let second = fixture.reconcile(alloc::vec![element("span", Props::new(), [text("x")])]);
        assert_eq!(second.removed, first.next);
        assert_ne!(second.next, first.next);
    }

    #[test]
    fn text_and_element_never_convert_in_place() {
        let mut fixture = Fixture::new();
        let first = fixture.reconcile(alloc::vec![text("plain")]);
        fixture.next_pass();
        let second = fixture.reconcile(alloc::vec![element("b", Props::new(), [text("plain")])]);
        assert_eq!(second.removed, first.next);
    }

    #[test]
    fn unmatched_children_are_removed_and_text_marked_dirty() {
        let mut fixture = Fixture::new();
        let first = fixture.reconcile(alloc::vec![text("one"), text("two")]);
        for id in &first.next {
            if let Some(Instance::Text(text)) = fixture.tree.get_mut(*id).map(|node| &mut node.instance) {
                text.dirty = false;
            }
        }
        fixture.next_pass();
        let second = fixture.reconcile(alloc::vec![text("uno")]);
        assert_eq!(second.next, [first.next[0]]);
        assert_eq!(second.removed, [first.next[1]]);
        let Some(Instance::Text(reused)) = fixture.tree.get(first.next[0]).map(|node| &node.instance) else {
            unreachable!()
        };
        assert_eq!(reused.text, Str::from("uno"));
        assert!(reused.dirty);
    }

    #[test]
    fn rollback_discards_mounts_and_restores_children() {
        let mut fixture = Fixture::new();
        let first = fixture.reconcile(alloc::vec![text("kept")]);
        fixture.next_pass();
        let mark = fixture.record.mark();
        fixture.record.touch(&mut fixture.tree, fixture.root);
        let second = fixture.reconcile(alloc::vec![text("kept"), text("new")]);
        assert_eq!(second.next.len(), 2);
        fixture.record.rollback_to(mark, &mut fixture.tree);
        assert!(fixture.tree.get(second.next[1]).is_none());
        assert_eq!(fixture.tree.get(fixture.root).unwrap().children, first.next);
    }
}
