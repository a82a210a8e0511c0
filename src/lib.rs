#![doc = include_str!("../README.md")]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::future_not_send)]

pub mod debug;

pub mod prelude {
    //! The types and constructors most applications need.
    //!
    //! # Example
    //!
    //! ```rust
    //! use rivulet::prelude::*;
    //!
    //! let counter = Component::new(|scope, _, _| {
    //!     let (count, set_count) = scope.use_state(|| 0);
    //!     let increment = EventHandler::new(move |_| set_count.update(|n| n + 1));
    //!     Ok(element("button", Props::new().on("onClick", increment), [text(format!("{count}"))]))
    //! });
    //! # let _ = counter;
    //! ```
    //!
    //! Streaming a page whose data is still loading sends the fallback first:
    //!
    //! ```rust
    //! use futures::StreamExt;
    //! use rivulet::prelude::*;
    //!
    //! let (data, resolver) = Promise::new();
    //! let page = suspense(text("loading"), [Descriptor::deferred(data)]);
    //! rivulet::task::block_on(async {
    //!     let mut stream = render_to_stream(page).await.unwrap();
    //!     let shell = stream.next().await.unwrap();
    //!     assert!(shell.contains("loading"));
    //!     resolver.resolve(text("done"));
    //!     let chunk = stream.next().await.unwrap();
    //!     assert!(chunk.contains("done"));
    //! });
    //! ```
    pub use rivulet_core::{
        Boundary, Component, Context, Descriptor, EscapedStr, Event, EventHandler, NodeRef,
        Promise, Props, Render, RenderError, Root, Scope, Str, Thrown, element,
        error_boundary, fragment, start_transition, suspense, text,
    };
    pub use rivulet_html::{HtmlRenderer, render_to_stream, render_to_string};
}

#[doc(inline)]
pub use rivulet_core::*;

/// Server-side rendering.
pub use rivulet_html as html;

/// Single-threaded task queue driving promises and scheduled updates.
pub use rivulet_task as task;

pub use tracing as log;
