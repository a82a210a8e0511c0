//! # Rivulet core
//!
//! A declarative UI engine: components describe what should be on screen as
//! [`Descriptor`] trees, the engine keeps a tree of live instances in step with them and
//! applies the minimal set of changes to a [`Host`].
//!
//! Rendering happens in two phases. The render phase evaluates components and matches
//! their output against the previous instances; it can be abandoned at any time, which
//! is how [`Boundary`] shows a fallback for children that failed or suspended. The
//! commit phase then mutates the host and runs effects.
//!
//! ```
//! use rivulet_core::{Component, Descriptor, Props, Root, element, text};
//!
//! let greeting = Component::new(|_, props: &Props, _| {
//!     let name = props.get_str("name").unwrap_or("world");
//!     Ok(element("p", Props::new(), [text(format!("Hello, {name}!"))]))
//! });
//!
//! let root = Root::in_memory();
//! let no_children: [Descriptor; 0] = [];
//! root.render(element(greeting, Props::new().attr("name", "Rivulet"), no_children))
//!     .unwrap();
//! let markup = root.with_host(|host| host.inner_markup(root.container()));
//! assert_eq!(markup, "<p>Hello, Rivulet!</p>");
//! ```

extern crate alloc;

pub mod boundary;
mod commit;
pub mod component;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod hooks;
pub mod host;
pub mod promise;
pub mod props;
mod reconcile;
mod root;
pub mod scheduler;
mod tree;

#[cfg(test)]
mod tests;

#[doc(inline)]
pub use boundary::{Boundary, error_boundary, suspense};
#[doc(inline)]
pub use component::{Component, Render};
#[doc(inline)]
pub use context::{Context, ContextStack, Provided};
#[doc(inline)]
pub use descriptor::{Descriptor, ElementDescriptor, Tag, element, fragment, text};
#[doc(inline)]
pub use error::{Error, RenderError, Thrown};
#[doc(inline)]
pub use hooks::{Cleanup, Dispatch, HookStash, Ref, Scope, Setter, StartTransition};
#[doc(inline)]
pub use host::{Host, MemNodeId, MemoryHost, Mutation};
#[doc(inline)]
pub use promise::{Pending, Promise, Resolver};
#[doc(inline)]
pub use props::{AttrValue, Event, EventHandler, NodeRef, PropValue, Props, RefCallback};
pub use root::{Root, RootBuilder};
#[doc(inline)]
pub use scheduler::{Transition, UpdateMode, start_transition};
pub use tree::NodeId;

pub use rivulet_str::{EscapedStr, Str};
