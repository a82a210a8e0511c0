//! Error types for HTML rendering.

/// Errors returned by [`HtmlRenderer`](crate::HtmlRenderer).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The shell of the document could not be rendered.
    #[error(transparent)]
    Render(#[from] rivulet_core::Error),
}
