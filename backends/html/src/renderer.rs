//! Renderer configuration and the two output modes.

use std::{
    fmt,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use futures::{
    Stream, StreamExt,
    future::LocalBoxFuture,
    stream::FuturesUnordered,
};
use rivulet_core::{Descriptor, RenderError, Thrown};
use rivulet_str::{Escaper, HtmlEscaper};

use crate::{
    Error,
    markers::{self, replacement_chunk},
    serializer::{Job, Output, Replacement, Serializer, Shared},
};

/// Options of an [`HtmlRenderer`], created with [`HtmlRenderer::builder`].
#[derive(Clone)]
#[must_use]
pub struct RenderOptions {
    id_prefix: String,
    on_error: Option<Rc<dyn Fn(&RenderError)>>,
    escaper: Rc<dyn Escaper>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            id_prefix: String::new(),
            on_error: None,
            escaper: Rc::new(HtmlEscaper),
        }
    }
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOptions")
            .field("id_prefix", &self.id_prefix)
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}

impl RenderOptions {
    /// Prefix for placeholder ids, so several renders can share one document.
    ///
    /// Only ASCII alphanumerics, `-` and `_` are kept. Ids take the form
    /// `S:{prefix}-{n}`.
    pub fn id_prefix(mut self, prefix: impl AsRef<str>) -> Self {
        self.id_prefix = markers::sanitize_prefix(prefix.as_ref());
        self
    }

    /// Called with every error a boundary catches or a truncated branch drops.
    ///
    /// The hook only observes: rendering continues the same way whatever it does.
    pub fn on_error(mut self, hook: impl Fn(&RenderError) + 'static) -> Self {
        self.on_error = Some(Rc::new(hook));
        self
    }

    /// Replaces the escaper used for text and attribute values.
    pub fn escaper(mut self, escaper: impl Escaper + 'static) -> Self {
        self.escaper = Rc::new(escaper);
        self
    }

    /// Finishes configuration.
    pub fn build(self) -> HtmlRenderer {
        HtmlRenderer {
            options: Rc::new(self),
        }
    }

    pub(crate) fn prefix(&self) -> &str {
        &self.id_prefix
    }

    pub(crate) fn escaper_ref(&self) -> &dyn Escaper {
        &*self.escaper
    }

    pub(crate) fn report(&self, error: &RenderError) {
        if let Some(hook) = &self.on_error {
            hook(error);
        }
    }
}

/// Serializes descriptor trees to HTML.
///
/// Components run once with detached hooks: state setters and effects have no effect on
/// the output. Suspended boundaries show their fallback first and are replaced when their
/// content is ready.
#[derive(Debug, Clone, Default)]
pub struct HtmlRenderer {
    options: Rc<RenderOptions>,
}

impl HtmlRenderer {
    /// A renderer with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts configuring a renderer.
    pub fn builder() -> RenderOptions {
        RenderOptions::default()
    }

    /// Renders `root` as a stream of chunks.
    ///
    /// The first chunk is the whole document with a fallback in place of every
    /// suspended boundary. Each later chunk replaces one boundary, in whatever order
    /// they resolve, and is processed by the page on its own.
    ///
    /// If `root` suspends outside any boundary, this waits until it no longer does.
    ///
    /// An error boundary with a suspended descendant wraps its content in `E:n`
    /// markers so a later rejection can replace it. The markers stay in the page when
    /// nothing below the boundary fails; they are an empty `<template>` and a comment
    /// and render nothing. [`Self::render_to_string`] removes them.
    ///
    /// # Errors
    ///
    /// Returns an error when an error escapes every boundary of the first chunk.
    pub async fn render_to_stream(&self, root: impl Into<Descriptor>) -> Result<RenderStream, Error> {
        let (shell, jobs, _) = self.shell(root.into()).await?;
        Ok(RenderStream {
            shell: Some(shell),
            jobs: jobs.into_iter().map(Job::spawn).collect(),
        })
    }

    /// Renders `root` into one string, waiting for every suspended boundary.
    ///
    /// Resolved content is spliced into the buffer directly, and the markers of error
    /// boundaries that never failed are removed, so the result carries no script and no
    /// placeholder.
    ///
    /// # Errors
    ///
    /// Returns an error when an error escapes every boundary before anything suspended.
    pub async fn render_to_string(&self, root: impl Into<Descriptor>) -> Result<String, Error> {
        let (mut document, jobs, shared) = self.shell(root.into()).await?;
        let mut running: FuturesUnordered<_> = jobs.into_iter().map(Job::spawn).collect();
        while let Some(Output { replacement, jobs }) = running.next().await {
            running.extend(jobs.into_iter().map(Job::spawn));
            if let Some(Replacement { target, markup }) = replacement {
                if !markers::splice(&mut document, &target, &markup) {
                    tracing::debug!(placeholder = %target, "region already replaced");
                }
            }
        }
        for region in shared.error_regions.borrow().iter() {
            markers::unwrap_region(&mut document, region);
        }
        Ok(document)
    }

    async fn shell(&self, root: Descriptor) -> Result<(String, Vec<Job>, Rc<Shared>), Error> {
        let shared = Shared::new(self.options.clone());
        loop {
            let mut serializer = Serializer::root(shared.clone());
            let mut document = String::new();
            match serializer.write(&root, &mut document) {
                Ok(()) => {
                    let jobs = serializer.finish(&mut document);
                    tracing::debug!(bytes = document.len(), pending = jobs.len(), "shell rendered");
                    return Ok((document, jobs, shared));
                }
                Err(Thrown::Suspended(pending)) => {
                    tracing::debug!(waiting = pending.len(), "shell suspended outside any boundary");
                    rivulet_core::Pending::all(pending).await;
                }
                Err(Thrown::Error(error)) => {
                    tracing::error!(%error, "error escaped every boundary");
                    shared.options().report(&error);
                    return Err(Error::Render(rivulet_core::Error::Unhandled(error)));
                }
            }
        }
    }
}

/// Renders `root` as a stream with default options.
///
/// # Errors
///
/// See [`HtmlRenderer::render_to_stream`].
pub async fn render_to_stream(root: impl Into<Descriptor>) -> Result<RenderStream, Error> {
    HtmlRenderer::new().render_to_stream(root).await
}

/// Renders `root` into one string with default options.
///
/// # Errors
///
/// See [`HtmlRenderer::render_to_string`].
pub async fn render_to_string(root: impl Into<Descriptor>) -> Result<String, Error> {
    HtmlRenderer::new().render_to_string(root).await
}

/// The chunks of a streamed render, from [`HtmlRenderer::render_to_stream`].
#[must_use = "streams do nothing unless polled"]
pub struct RenderStream {
    shell: Option<String>,
    jobs: FuturesUnordered<LocalBoxFuture<'static, Output>>,
}

impl fmt::Debug for RenderStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderStream")
            .field("shell_sent", &self.shell.is_none())
            .field("pending", &self.jobs.len())
            .finish()
    }
}

impl Stream for RenderStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(shell) = self.shell.take() {
            return Poll::Ready(Some(shell));
        }
        loop {
            match self.jobs.poll_next_unpin(cx) {
                Poll::Ready(Some(Output { replacement, jobs })) => {
                    self.jobs.extend(jobs.into_iter().map(Job::spawn));
                    if let Some(Replacement { target, markup }) = replacement {
                        return Poll::Ready(Some(replacement_chunk(&target, &markup)));
                    }
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
