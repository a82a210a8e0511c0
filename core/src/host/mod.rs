//! The display surface a root commits into.
//!
//! A [`Host`] owns platform nodes and applies the mutations the commit phase computes.
//! [`MemoryHost`] keeps them in memory and records every mutation, which is what tests
//! and headless embedders use.

mod memory;

pub use memory::{MemNodeId, MemoryHost, Mutation};

use crate::props::{AttrValue, EventHandler};

/// A display surface.
///
/// Calls arrive only from the commit phase, never while a render pass is running.
pub trait Host {
    /// Handle to a node of the surface.
    type Node: Clone + 'static;

    /// Creates a detached element.
    fn create_element(&mut self, tag: &str) -> Self::Node;

    /// Creates a detached text node.
    fn create_text(&mut self, text: &str) -> Self::Node;

    /// Sets or replaces an attribute.
    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &AttrValue);

    /// Removes an attribute.
    fn remove_attribute(&mut self, node: &Self::Node, name: &str);

    /// Registers a listener for `event`.
    fn add_event_listener(&mut self, node: &Self::Node, event: &str, handler: &EventHandler, capture: bool);

    /// Unregisters the listener added for `event` with the same capture flag.
    fn remove_event_listener(&mut self, node: &Self::Node, event: &str, capture: bool);

    /// Inserts `node` under `parent` before `before`, or last when `before` is `None`.
    /// A node that is already attached somewhere moves.
    fn insert_before(&mut self, parent: &Self::Node, node: &Self::Node, before: Option<&Self::Node>);

    /// Detaches `node` from its parent.
    fn remove(&mut self, node: &Self::Node);

    /// Replaces the content of a text node.
    fn set_text(&mut self, node: &Self::Node, text: &str);

    /// Applies a batch of mutations as one animated view transition.
    ///
    /// Surfaces without view transitions just run `apply`.
    fn start_view_transition(&mut self, apply: &mut dyn FnMut(&mut Self)) {
        apply(self);
    }
}
