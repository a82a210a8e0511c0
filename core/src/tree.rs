//! The live instance tree.
//!
//! Instances are stored in a generational arena owned by the root. A node's children are
//! owned by that node alone; `next_sibling` links them in render order so the commit
//! phase can find insertion points without rescanning the parent.

use alloc::vec::Vec;

use rivulet_str::Str;

use crate::{
    Boundary, Component, Descriptor, Props, RenderError, context::Provided,
    descriptor::{ElementDescriptor, Tag},
    hooks::HookStash,
};

/// Identifier of an instance inside the tree. Stale identifiers never alias a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Returns the raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    #[cfg(test)]
    pub(crate) const fn for_tests(index: u32) -> Self {
        Self {
            index,
            generation: 0,
        }
    }
}

/// How a child is matched against the previous children of its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChildKey {
    /// An explicit list key.
    Explicit(Str),
    /// Position in the parent's descriptor list, for unkeyed children.
    Position(usize),
    /// The fallback of a boundary; never matches its content.
    Fallback,
}

/// Live counterpart of a text or raw descriptor.
#[derive(Debug, Clone)]
pub(crate) struct TextInstance {
    pub text: Str,
    pub dirty: bool,
}

/// Render state of a boundary instance.
#[derive(Debug, Clone, Default)]
pub(crate) struct BoundaryState {
    /// The error being shown, once caught.
    pub captured: Option<RenderError>,
    /// Whether the children ever committed.
    pub content_committed: bool,
    /// Whether the last committed render showed the fallback.
    pub showing_fallback: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum ElementKind {
    Host(Str),
    Component(Component),
    Fragment,
    Boundary(Boundary, BoundaryState),
    Provider(Provided),
}

/// Live counterpart of an element descriptor.
#[derive(Debug, Clone)]
pub(crate) struct ElementInstance {
    pub kind: ElementKind,
    pub props: Props,
    /// Props of the last commit while a host element update is being rendered; `None`
    /// for fresh instances, non-host elements and after commit.
    pub previous_props: Option<Props>,
    pub descriptors: Vec<Descriptor>,
}

#[derive(Debug, Clone)]
pub(crate) enum Instance {
    Text(TextInstance),
    Element(ElementInstance),
}

impl Instance {
    pub(crate) fn text(text: Str) -> Self {
        Self::Text(TextInstance { text, dirty: true })
    }

    /// The instance for a resolved descriptor; `None` for empty and deferred ones.
    pub(crate) fn from_descriptor(descriptor: &Descriptor) -> Option<Self> {
        match descriptor {
            Descriptor::Text(text) => Some(Self::text(text.clone())),
            Descriptor::Raw(raw) => Some(Self::text(raw.text().clone())),
            Descriptor::Element(element) => Some(Self::element(element)),
            Descriptor::Empty | Descriptor::Deferred(_) => None,
        }
    }

    fn element(descriptor: &ElementDescriptor) -> Self {
        let kind = match descriptor.tag() {
            Tag::Intrinsic(name) => ElementKind::Host(name.clone()),
            Tag::Component(component) => ElementKind::Component(component.clone()),
            Tag::Fragment => ElementKind::Fragment,
            Tag::Boundary(boundary) => {
                ElementKind::Boundary(boundary.clone(), BoundaryState::default())
            }
            Tag::Provider(provided) => ElementKind::Provider(provided.clone()),
        };
        Self::Element(ElementInstance {
            kind,
            props: descriptor.props().clone(),
            previous_props: None,
            descriptors: descriptor.children().to_vec(),
        })
    }

    /// Whether this instance can be reused for `descriptor`, which is never deferred.
    pub(crate) fn matches(&self, descriptor: &Descriptor) -> bool {
        match (self, descriptor) {
            (Self::Text(_), Descriptor::Text(_) | Descriptor::Raw(_)) => true,
            (Self::Element(instance), Descriptor::Element(element)) => {
                match (&instance.kind, element.tag()) {
                    (ElementKind::Host(name), Tag::Intrinsic(tag)) => name == tag,
                    (ElementKind::Component(current), Tag::Component(next)) => current.same(next),
                    (ElementKind::Fragment, Tag::Fragment) => true,
                    (ElementKind::Boundary(current, _), Tag::Boundary(next)) => {
                        current.same_kind(next)
                    }
                    (ElementKind::Provider(current), Tag::Provider(next)) => {
                        current.context_id() == next.context_id()
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    pub(crate) const fn is_host(&self) -> bool {
        matches!(
            self,
            Self::Text(_)
                | Self::Element(ElementInstance {
                    kind: ElementKind::Host(_),
                    ..
                })
        )
    }

    pub(crate) const fn as_element(&self) -> Option<&ElementInstance> {
        match self {
            Self::Element(element) => Some(element),
            Self::Text(_) => None,
        }
    }

    pub(crate) const fn as_element_mut(&mut self) -> Option<&mut ElementInstance> {
        match self {
            Self::Element(element) => Some(element),
            Self::Text(_) => None,
        }
    }

    pub(crate) fn boundary_state_mut(&mut self) -> Option<&mut BoundaryState> {
        match self.as_element_mut()?.kind {
            ElementKind::Boundary(_, ref mut state) => Some(state),
            _ => None,
        }
    }
}

/// One live instance.
#[derive(Debug)]
pub(crate) struct Node<N> {
    pub parent: Option<NodeId>,
    pub depth: u32,
    pub key: ChildKey,
    /// The display-surface object, for host elements and text.
    pub handle: Option<N>,
    pub children: Vec<NodeId>,
    pub next_sibling: Option<NodeId>,
    /// Position among the host children of the nearest host ancestor at the last commit.
    pub host_index: Option<usize>,
    /// The render pass that last rendered this node.
    pub pass: u64,
    pub stash: HookStash,
    pub instance: Instance,
}

impl<N> Node<N> {
    pub(crate) fn new(parent: Option<NodeId>, depth: u32, key: ChildKey, instance: Instance) -> Self {
        Self {
            parent,
            depth,
            key,
            handle: None,
            children: Vec::new(),
            next_sibling: None,
            host_index: None,
            pass: 0,
            stash: HookStash::default(),
            instance,
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            children: self.children.clone(),
            next_sibling: self.next_sibling,
            pass: self.pass,
            instance: self.instance.clone(),
        }
    }

    pub(crate) fn restore(&mut self, snapshot: Snapshot) {
        self.children = snapshot.children;
        self.next_sibling = snapshot.next_sibling;
        self.pass = snapshot.pass;
        self.instance = snapshot.instance;
    }
}

/// The parts of a node a render pass may change, saved so the pass can be undone.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    children: Vec<NodeId>,
    next_sibling: Option<NodeId>,
    pass: u64,
    instance: Instance,
}

#[derive(Debug)]
struct Slot<N> {
    generation: u32,
    node: Option<Node<N>>,
}

/// Generational arena of instances.
#[derive(Debug)]
pub(crate) struct Tree<N> {
    slots: Vec<Slot<N>>,
    free: Vec<u32>,
}

impl<N> Default for Tree<N> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<N> Tree<N> {
    pub(crate) fn insert(&mut self, node: Node<N>) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node<N>> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node<N>> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> Option<Node<N>> {
        let slot = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }

    /// Number of live nodes.
    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Ids of `id` and all its descendants, parents before children.
    pub(crate) fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = alloc::vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.get(next) {
                out.push(next);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(text: &'static str) -> Node<()> {
        Node::new(None, 0, ChildKey::Position(0), Instance::text(Str::from(text)))
    }

    #[test]
    fn stale_ids_do_not_alias_reused_slots() {
        let mut tree = Tree::default();
        let first = tree.insert(leaf("a"));
        assert!(tree.remove(first).is_some());
        let second = tree.insert(leaf("b"));
        assert_eq!(first.index(), second.index());
        assert!(tree.get(first).is_none());
        assert!(tree.contains(second));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn subtree_lists_parents_first() {
        let mut tree = Tree::default();
        let root = tree.insert(leaf("root"));
        let child = tree.insert(leaf("child"));
        let grandchild = tree.insert(leaf("grandchild"));
        tree.get_mut(root).unwrap().children.push(child);
        tree.get_mut(child).unwrap().children.push(grandchild);
        assert_eq!(tree.subtree(root), [root, child, grandchild]);
    }
}
