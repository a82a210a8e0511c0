#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::future_not_send)]

//! # Rivulet HTML
//!
//! Server-side rendering of Rivulet descriptor trees.
//!
//! [`HtmlRenderer::render_to_stream`] sends the document as soon as everything outside
//! suspended boundaries is known, then one chunk per boundary as it resolves.
//! [`HtmlRenderer::render_to_string`] waits for everything and returns one string.
//!
//! ```
//! use rivulet_core::{Props, element, text};
//! use rivulet_html::render_to_string;
//!
//! let page = element("main", Props::new().attr("class", "page"), [text("a < b")]);
//! let html = rivulet_task::block_on(render_to_string(page)).unwrap();
//! assert_eq!(html, r#"<main class="page">a &lt; b</main>"#);
//! ```

mod error;
mod markers;
mod renderer;
mod serializer;


pub use error::Error;
pub use renderer::{HtmlRenderer, RenderOptions, RenderStream, render_to_stream, render_to_string};
