//! The commit phase: applying a finished render pass to the host.
//!
//! Only nodes rendered in the pass are visited for changes. Host children are placed
//! with a single forward scan over their previous positions: a child whose old position
//! is behind the furthest one kept so far has moved, everything else stays put, so a
//! swap of two keyed rows costs one insertion.

use alloc::vec::Vec;

use crate::{
    events,
    hooks::EffectJob,
    host::Host,
    props::{PropValue, Props, REF_KEY},
    reconcile::UpdateRecord,
    tree::{ElementKind, Instance, NodeId, Tree},
};

/// Applies `record` to `host` and returns the effects it collected, layout effects
/// first. The caller runs them once the tree is no longer borrowed.
///
/// `root` is the node the pass started at, `container` the host node the whole tree is
/// mounted into.
pub(crate) fn commit<H: Host>(
    host: &mut H,
    container: &H::Node,
    tree: &mut Tree<H::Node>,
    root: NodeId,
    record: UpdateRecord,
) -> Vec<EffectJob> {
    let UpdateRecord {
        pass,
        in_view_transition,
        removals,
        effects,
        ..
    } = record;
    tracing::debug!(
        ?root,
        pass,
        removals = removals.len(),
        effects = effects.len(),
        "committing"
    );

    if in_view_transition {
        let mut pending = true;
        host.start_view_transition(&mut |host| {
            if core::mem::take(&mut pending) {
                mutate(host, container, tree, root, &removals, pass);
            }
        });
    } else {
        mutate(host, container, tree, root, &removals, pass);
    }

    let (mut layout, passive): (Vec<_>, Vec<_>) = effects.into_iter().partition(EffectJob::is_layout);
    layout.extend(passive);
    layout
}

fn mutate<H: Host>(
    host: &mut H,
    container: &H::Node,
    tree: &mut Tree<H::Node>,
    root: NodeId,
    removals: &[NodeId],
    pass: u64,
) {
    for &removed in removals {
        unmount(host, tree, removed);
    }
    let (parent, owner) = host_parent(tree, container, root);
    commit_children(host, tree, pass, &parent, owner);
}

/// The host node `root`'s host children attach to, and the instance owning them.
fn host_parent<N: Clone>(tree: &Tree<N>, container: &N, root: NodeId) -> (N, NodeId) {
    let mut top = root;
    let mut current = tree.get(root).and_then(|node| node.parent);
    while let Some(id) = current {
        let Some(node) = tree.get(id) else {
            break;
        };
        if let Instance::Element(element) = &node.instance {
            if let (ElementKind::Host(_), Some(handle)) = (&element.kind, &node.handle) {
                return (handle.clone(), id);
            }
        }
        top = id;
        current = node.parent;
    }
    (container.clone(), top)
}

/// Host instances directly below `owner`, looking through components, fragments,
/// boundaries and providers.
fn host_children<N>(tree: &Tree<N>, owner: NodeId, out: &mut Vec<NodeId>) {
    let mut child = tree.get(owner).and_then(|node| node.children.first().copied());
    while let Some(id) = child {
        let Some(node) = tree.get(id) else {
            break;
        };
        if node.instance.is_host() {
            out.push(id);
        } else {
            host_children(tree, id, out);
        }
        child = node.next_sibling;
    }
}

fn commit_children<H: Host>(host: &mut H, tree: &mut Tree<H::Node>, pass: u64, parent: &H::Node, owner: NodeId) {
    let mut children = Vec::new();
    host_children(tree, owner, &mut children);
    for &child in &children {
        if tree.get(child).is_some_and(|node| node.pass == pass) {
            commit_node(host, tree, pass, child);
        }
    }
    place(host, tree, parent, &children);
}

fn commit_node<H: Host>(host: &mut H, tree: &mut Tree<H::Node>, pass: u64, id: NodeId) {
    let Some(node) = tree.get_mut(id) else {
        return;
    };
    let (handle, previous, props) = match &mut node.instance {
        Instance::Text(text) => {
            if let Some(handle) = &node.handle {
                if text.dirty {
                    host.set_text(handle, &text.text);
                }
            } else {
                node.handle = Some(host.create_text(&text.text));
            }
            text.dirty = false;
            return;
        }
        Instance::Element(element) => {
            let ElementKind::Host(tag) = &element.kind else {
                return;
            };
            let handle = match &node.handle {
                Some(handle) => handle.clone(),
                None => {
                    let handle = host.create_element(tag);
                    node.handle = Some(handle.clone());
                    handle
                }
            };
            let previous = element.previous_props.take().unwrap_or_default();
            (handle, previous, element.props.clone())
        }
    };
    diff_props(host, &handle, &previous, &props);
    commit_children(host, tree, pass, &handle, id);
}

fn diff_props<H: Host>(host: &mut H, handle: &H::Node, previous: &Props, next: &Props) {
    for (key, old) in previous.iter() {
        if next.get(key).is_none() {
            apply_prop(host, handle, key, Some(old), &PropValue::Null);
        }
    }
    for (key, value) in next.iter() {
        let old = previous.get(key);
        if old != Some(value) {
            apply_prop(host, handle, key, old, value);
        }
    }
}

fn apply_prop<H: Host>(host: &mut H, handle: &H::Node, key: &str, old: Option<&PropValue>, value: &PropValue) {
    if key == REF_KEY {
        if let Some(PropValue::Ref(old)) = old {
            old.detach();
        }
        if let PropValue::Ref(callback) = value {
            callback.attach(handle);
        }
        return;
    }

    let old_handler = old.and_then(PropValue::as_handler);
    if old_handler.is_some() || value.as_handler().is_some() {
        if let Some(listener) = events::listener(key) {
            if old_handler.is_some() {
                host.remove_event_listener(handle, &listener.event, listener.capture);
            }
            if let Some(handler) = value.as_handler() {
                host.add_event_listener(handle, &listener.event, handler, listener.capture);
            }
            return;
        }
    }

    match value.to_attr() {
        Some(attr) => host.set_attribute(handle, key, &attr),
        None => {
            if old.and_then(PropValue::to_attr).is_some() {
                host.remove_attribute(handle, key);
            }
        }
    }
}

/// Moves and inserts host children so they appear in `children` order.
fn place<H: Host>(host: &mut H, tree: &mut Tree<H::Node>, parent: &H::Node, children: &[NodeId]) {
    let mut moved = alloc::vec![false; children.len()];
    let mut last_placed = 0;
    for (index, &id) in children.iter().enumerate() {
        match tree.get(id).and_then(|node| node.host_index) {
            Some(previous) if previous >= last_placed => last_placed = previous,
            _ => moved[index] = true,
        }
    }

    let mut anchor: Option<H::Node> = None;
    for (index, &id) in children.iter().enumerate().rev() {
        let Some(node) = tree.get_mut(id) else {
            continue;
        };
        node.host_index = Some(index);
        let Some(handle) = node.handle.clone() else {
            continue;
        };
        if moved[index] {
            host.insert_before(parent, &handle, anchor.as_ref());
        }
        anchor = Some(handle);
    }
}

/// Detaches a removed instance from the host and destroys its subtree.
pub(crate) fn unmount<H: Host>(host: &mut H, tree: &mut Tree<H::Node>, id: NodeId) {
    let Some(node) = tree.get(id) else {
        return;
    };
    let mut tops = Vec::new();
    if node.instance.is_host() {
        tops.push(id);
    } else {
        host_children(tree, id, &mut tops);
    }
    for top in tops {
        if let Some(handle) = tree.get(top).and_then(|node| node.handle.as_ref()) {
            host.remove(handle);
        }
    }

    for descendant in tree.subtree(id) {
        let Some(node) = tree.remove(descendant) else {
            continue;
        };
        node.stash.run_cleanups();
        if let Some(callback) = node.instance.as_element().and_then(|element| element.props.ref_callback()) {
            callback.detach();
        }
    }
}
