use alloc::{string::String, vec::Vec};

use indexmap::IndexMap;
use rivulet_str::{Str, escape_html};

use super::Host;
use crate::props::{AttrValue, EventHandler};

/// Handle to a node of a [`MemoryHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemNodeId(pub usize);

/// One call made on a [`MemoryHost`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum Mutation {
    CreateElement { node: MemNodeId, tag: Str },
    CreateText { node: MemNodeId, text: Str },
    SetAttribute { node: MemNodeId, name: Str, value: AttrValue },
    RemoveAttribute { node: MemNodeId, name: Str },
    AddListener { node: MemNodeId, event: Str, capture: bool },
    RemoveListener { node: MemNodeId, event: Str, capture: bool },
    Insert { parent: MemNodeId, node: MemNodeId, before: Option<MemNodeId> },
    Remove { node: MemNodeId },
    SetText { node: MemNodeId, text: Str },
}

#[derive(Debug)]
enum Content {
    Element {
        tag: Str,
        attributes: IndexMap<Str, AttrValue>,
        listeners: Vec<(Str, bool, EventHandler)>,
    },
    Text(Str),
}

#[derive(Debug)]
struct MemNode {
    parent: Option<MemNodeId>,
    children: Vec<MemNodeId>,
    content: Content,
}

/// A [`Host`] that keeps its nodes in memory and logs every mutation.
#[derive(Debug, Default)]
pub struct MemoryHost {
    nodes: Vec<MemNode>,
    mutations: Vec<Mutation>,
    view_transitions: usize,
}

impl MemoryHost {
    /// Creates an empty host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a container element to render into. Not recorded as a mutation.
    pub fn create_root(&mut self, tag: &str) -> MemNodeId {
        self.alloc(Content::Element {
            tag: Str::from(String::from(tag)),
            attributes: IndexMap::new(),
            listeners: Vec::new(),
        })
    }

    /// Every mutation since creation or the last [`MemoryHost::take_mutations`].
    #[must_use]
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Returns and clears the mutation log.
    pub fn take_mutations(&mut self) -> Vec<Mutation> {
        core::mem::take(&mut self.mutations)
    }

    /// Number of view transitions started.
    #[must_use]
    pub const fn view_transitions(&self) -> usize {
        self.view_transitions
    }

    /// Children of `node`, in order.
    #[must_use]
    pub fn children(&self, node: MemNodeId) -> &[MemNodeId] {
        self.nodes.get(node.0).map_or(&[], |node| &node.children)
    }

    /// The parent of `node`, if attached.
    #[must_use]
    pub fn parent(&self, node: MemNodeId) -> Option<MemNodeId> {
        self.nodes.get(node.0).and_then(|node| node.parent)
    }

    /// Tag of an element node.
    #[must_use]
    pub fn tag(&self, node: MemNodeId) -> Option<&str> {
        match &self.nodes.get(node.0)?.content {
            Content::Element { tag, .. } => Some(tag.as_str()),
            Content::Text(_) => None,
        }
    }

    /// Content of a text node.
    #[must_use]
    pub fn text(&self, node: MemNodeId) -> Option<&str> {
        match &self.nodes.get(node.0)?.content {
            Content::Text(text) => Some(text.as_str()),
            Content::Element { .. } => None,
        }
    }

    /// Value of an attribute.
    #[must_use]
    pub fn attribute(&self, node: MemNodeId, name: &str) -> Option<&AttrValue> {
        match &self.nodes.get(node.0)?.content {
            Content::Element { attributes, .. } => attributes.get(name),
            Content::Text(_) => None,
        }
    }

    /// The bubble-phase listener registered for `event`.
    #[must_use]
    pub fn listener(&self, node: MemNodeId, event: &str) -> Option<&EventHandler> {
        self.listener_in_phase(node, event, false)
    }

    /// The listener registered for `event` in the given phase.
    #[must_use]
    pub fn listener_in_phase(&self, node: MemNodeId, event: &str, capture: bool) -> Option<&EventHandler> {
        match &self.nodes.get(node.0)?.content {
            Content::Element { listeners, .. } => listeners
                .iter()
                .find(|(name, phase, _)| name == event && *phase == capture)
                .map(|(_, _, handler)| handler),
            Content::Text(_) => None,
        }
    }

    /// Descendants of `root` with the given tag, in document order.
    #[must_use]
    pub fn find_by_tag(&self, root: MemNodeId, tag: &str) -> Vec<MemNodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<MemNodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if self.tag(node) == Some(tag) {
                found.push(node);
            }
            stack.extend(self.children(node).iter().rev().copied());
        }
        found
    }

    /// Serializes `node` and its subtree as HTML.
    #[must_use]
    pub fn to_markup(&self, node: MemNodeId) -> String {
        let mut out = String::new();
        self.write_markup(node, &mut out);
        out
    }

    /// Serializes the children of `node` as HTML.
    #[must_use]
    pub fn inner_markup(&self, node: MemNodeId) -> String {
        let mut out = String::new();
        for &child in self.children(node) {
            self.write_markup(child, &mut out);
        }
        out
    }

    fn write_markup(&self, node: MemNodeId, out: &mut String) {
        let Some(entry) = self.nodes.get(node.0) else {
            return;
        };
        match &entry.content {
            Content::Text(text) => escape_html(text, out),
            Content::Element { tag, attributes, .. } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    if !matches!(value, AttrValue::Bool(true)) {
                        out.push_str("=\"");
                        escape_html(&alloc::format!("{value}"), out);
                        out.push('"');
                    }
                }
                out.push('>');
                for &child in &entry.children {
                    self.write_markup(child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    fn alloc(&mut self, content: Content) -> MemNodeId {
        let id = MemNodeId(self.nodes.len());
        self.nodes.push(MemNode {
            parent: None,
            children: Vec::new(),
            content,
        });
        id
    }

    fn detach(&mut self, node: MemNodeId) {
        let Some(parent) = self.nodes.get_mut(node.0).and_then(|entry| entry.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent.0) {
            parent.children.retain(|child| *child != node);
        }
    }

    fn attributes_mut(&mut self, node: MemNodeId) -> Option<&mut IndexMap<Str, AttrValue>> {
        match &mut self.nodes.get_mut(node.0)?.content {
            Content::Element { attributes, .. } => Some(attributes),
            Content::Text(_) => None,
        }
    }

    fn listeners_mut(&mut self, node: MemNodeId) -> Option<&mut Vec<(Str, bool, EventHandler)>> {
        match &mut self.nodes.get_mut(node.0)?.content {
            Content::Element { listeners, .. } => Some(listeners),
            Content::Text(_) => None,
        }
    }
}

impl Host for MemoryHost {
    type Node = MemNodeId;

    fn create_element(&mut self, tag: &str) -> MemNodeId {
        let tag = Str::from(String::from(tag));
        let node = self.alloc(Content::Element {
            tag: tag.clone(),
            attributes: IndexMap::new(),
            listeners: Vec::new(),
        });
        self.mutations.push(Mutation::CreateElement { node, tag });
        node
    }

    fn create_text(&mut self, text: &str) -> MemNodeId {
        let text = Str::from(String::from(text));
        let node = self.alloc(Content::Text(text.clone()));
        self.mutations.push(Mutation::CreateText { node, text });
        node
    }

    fn set_attribute(&mut self, node: &MemNodeId, name: &str, value: &AttrValue) {
        let name = Str::from(String::from(name));
        if let Some(attributes) = self.attributes_mut(*node) {
            attributes.insert(name.clone(), value.clone());
        }
        self.mutations.push(Mutation::SetAttribute {
            node: *node,
            name,
            value: value.clone(),
        });
    }

    fn remove_attribute(&mut self, node: &MemNodeId, name: &str) {
        if let Some(attributes) = self.attributes_mut(*node) {
            attributes.shift_remove(name);
        }
        self.mutations.push(Mutation::RemoveAttribute {
            node: *node,
            name: Str::from(String::from(name)),
        });
    }

    fn add_event_listener(&mut self, node: &MemNodeId, event: &str, handler: &EventHandler, capture: bool) {
        let event = Str::from(String::from(event));
        if let Some(listeners) = self.listeners_mut(*node) {
            listeners.retain(|(name, phase, _)| !(*name == event && *phase == capture));
            listeners.push((event.clone(), capture, handler.clone()));
        }
        self.mutations.push(Mutation::AddListener {
            node: *node,
            event,
            capture,
        });
    }

    fn remove_event_listener(&mut self, node: &MemNodeId, event: &str, capture: bool) {
        if let Some(listeners) = self.listeners_mut(*node) {
            listeners.retain(|(name, phase, _)| !(name == event && *phase == capture));
        }
        self.mutations.push(Mutation::RemoveListener {
            node: *node,
            event: Str::from(String::from(event)),
            capture,
        });
    }

    fn insert_before(&mut self, parent: &MemNodeId, node: &MemNodeId, before: Option<&MemNodeId>) {
        self.detach(*node);
        if let Some(entry) = self.nodes.get_mut(parent.0) {
            let index = before
                .and_then(|before| entry.children.iter().position(|child| child == before))
                .unwrap_or(entry.children.len());
            entry.children.insert(index, *node);
        }
        if let Some(entry) = self.nodes.get_mut(node.0) {
            entry.parent = Some(*parent);
        }
        self.mutations.push(Mutation::Insert {
            parent: *parent,
            node: *node,
            before: before.copied(),
        });
    }

    fn remove(&mut self, node: &MemNodeId) {
        self.detach(*node);
        self.mutations.push(Mutation::Remove { node: *node });
    }

    fn set_text(&mut self, node: &MemNodeId, text: &str) {
        let text = Str::from(String::from(text));
        if let Some(entry) = self.nodes.get_mut(node.0) {
            entry.content = Content::Text(text.clone());
        }
        self.mutations.push(Mutation::SetText { node: *node, text });
    }

    fn start_view_transition(&mut self, apply: &mut dyn FnMut(&mut Self)) {
        self.view_transitions += 1;
        apply(self);
    }
}
