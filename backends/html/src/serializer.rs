//! Descriptor trees to markup.
//!
//! The [`Serializer`] writes everything it can synchronously. A suspended boundary
//! becomes a marked fallback region plus a [`Job`] that waits for the suspension to
//! settle and renders the boundary's children again; the job's [`Output`] names the
//! region to replace. Error boundaries with pending jobs beneath them mark their content
//! too, so an awaited rejection can replace the whole boundary with its fallback.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    task::Poll,
};

use futures::{FutureExt, future::LocalBoxFuture};
use rivulet_core::{
    AttrValue, Boundary, ContextStack, Descriptor, ElementDescriptor, HookStash, Pending,
    RenderError, Scope, Tag, Thrown,
};
use rivulet_str::EscapeCallback;

use crate::{
    RenderOptions,
    markers::{MarkerId, MarkerKind},
};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// State shared by every serializer of one render.
pub(crate) struct Shared {
    options: Rc<RenderOptions>,
    next_id: Cell<u64>,
    /// Error boundary regions written so far.
    pub(crate) error_regions: RefCell<Vec<MarkerId>>,
}

impl Shared {
    pub(crate) fn new(options: Rc<RenderOptions>) -> Rc<Self> {
        Rc::new(Self {
            options,
            next_id: Cell::new(0),
            error_regions: RefCell::new(Vec::new()),
        })
    }

    fn next_marker(&self, kind: MarkerKind) -> MarkerId {
        let n = self.next_id.get();
        self.next_id.set(n + 1);
        MarkerId::new(kind, self.options.prefix(), n)
    }

    pub(crate) fn options(&self) -> &RenderOptions {
        &self.options
    }
}

/// An error boundary as seen by jobs below it.
struct ErrorScope {
    marker: MarkerId,
    boundary: Boundary,
    contexts: ContextStack,
    parent: Option<Rc<ErrorScope>>,
    /// A job was created below this boundary, so its content is marked.
    used: Cell<bool>,
    /// The fallback already replaced the content.
    failed: Cell<bool>,
}

impl ErrorScope {
    fn caught(&self, shared: &Shared, error: &RenderError) {
        tracing::error!(boundary = %self.marker, %error, "error boundary caught an error");
        self.boundary.report(error);
        shared.options.report(error);
    }
}

/// A region to replace.
#[derive(Debug)]
pub(crate) struct Replacement {
    pub(crate) target: MarkerId,
    pub(crate) markup: String,
}

/// What a finished [`Job`] produced.
#[derive(Default)]
pub(crate) struct Output {
    pub(crate) replacement: Option<Replacement>,
    /// Boundaries that suspended inside the replacement.
    pub(crate) jobs: Vec<Job>,
}

/// The deferred content of a suspended boundary.
pub(crate) struct Job {
    marker: MarkerId,
    children: Vec<Descriptor>,
    contexts: ContextStack,
    scope: Option<Rc<ErrorScope>>,
    pending: Vec<Pending>,
    shared: Rc<Shared>,
}

impl Job {
    pub(crate) fn spawn(self) -> LocalBoxFuture<'static, Output> {
        self.run().boxed_local()
    }

    async fn run(mut self) -> Output {
        loop {
            Pending::all(core::mem::take(&mut self.pending)).await;
            if self.abandoned() {
                tracing::debug!(placeholder = %self.marker, "dropping content of a replaced region");
                return Output::default();
            }

            let mut serializer = Serializer::new(self.shared.clone(), self.contexts.clone(), self.scope.clone());
            let mut markup = String::new();
            match serializer.write_children(&self.children, &mut markup) {
                Ok(()) => {
                    tracing::debug!(placeholder = %self.marker, "boundary content resolved");
                    let jobs = serializer.finish(&mut markup);
                    return Output {
                        replacement: Some(Replacement {
                            target: self.marker,
                            markup,
                        }),
                        jobs,
                    };
                }
                Err(Thrown::Suspended(pending)) => {
                    tracing::debug!(placeholder = %self.marker, waiting = pending.len(), "boundary suspended again");
                    self.pending = pending;
                }
                Err(Thrown::Error(error)) => return self.redirect(error),
            }
        }
    }

    fn abandoned(&self) -> bool {
        let mut scope = self.scope.as_deref();
        while let Some(current) = scope {
            if current.failed.get() {
                return true;
            }
            scope = current.parent.as_deref();
        }
        false
    }

    /// Hands a rejection to the nearest error boundary above the suspended one.
    fn redirect(self, mut error: RenderError) -> Output {
        let mut scope = self.scope;
        loop {
            let Some(current) = scope else {
                tracing::error!(placeholder = %self.marker, %error, "unhandled rejection, truncating branch");
                self.shared.options.report(&error);
                return Output::default();
            };
            current.caught(&self.shared, &error);
            if current.failed.replace(true) {
                return Output::default();
            }

            let mut serializer = Serializer::new(self.shared.clone(), current.contexts.clone(), current.parent.clone());
            let mut markup = String::new();
            match serializer.write(&current.boundary.fallback(Some(&error)), &mut markup) {
                Ok(()) => {
                    let jobs = serializer.finish(&mut markup);
                    return Output {
                        replacement: Some(Replacement {
                            target: current.marker.clone(),
                            markup,
                        }),
                        jobs,
                    };
                }
                Err(Thrown::Error(next)) => {
                    error = next;
                    scope = current.parent.clone();
                }
                Err(Thrown::Suspended(_)) => {
                    tracing::error!(boundary = %current.marker, "error fallback suspended, truncating branch");
                    return Output::default();
                }
            }
        }
    }
}

/// Writes descriptors as markup, collecting the jobs of suspended boundaries.
pub(crate) struct Serializer {
    shared: Rc<Shared>,
    contexts: ContextStack,
    scope: Option<Rc<ErrorScope>>,
    jobs: Vec<Job>,
    callbacks: Vec<EscapeCallback>,
}

impl Serializer {
    /// A serializer for the top of the document.
    pub(crate) const fn root(shared: Rc<Shared>) -> Self {
        Self::new(shared, ContextStack::new(), None)
    }

    const fn new(shared: Rc<Shared>, contexts: ContextStack, scope: Option<Rc<ErrorScope>>) -> Self {
        Self {
            shared,
            contexts,
            scope,
            jobs: Vec::new(),
            callbacks: Vec::new(),
        }
    }

    /// Finalizes `chunk` with the callbacks of the raw markup written into it and returns
    /// the jobs it depends on.
    pub(crate) fn finish(self, chunk: &mut String) -> Vec<Job> {
        for callback in &self.callbacks {
            callback(chunk);
        }
        self.jobs
    }

    pub(crate) fn write(&mut self, descriptor: &Descriptor, out: &mut String) -> Result<(), Thrown> {
        match descriptor {
            Descriptor::Empty => Ok(()),
            Descriptor::Text(text) => {
                self.shared.options.escaper_ref().escape_into(text, out);
                Ok(())
            }
            Descriptor::Raw(raw) => {
                raw.write_to(self.shared.options.escaper_ref(), out);
                self.callbacks.extend(raw.callbacks().iter().cloned());
                Ok(())
            }
            Descriptor::Element(element) => self.write_element(element, out),
            Descriptor::Deferred(promise) => match promise.peek() {
                Poll::Ready(Ok(inner)) => self.write(&inner, out),
                Poll::Ready(Err(error)) => Err(Thrown::Error(error)),
                Poll::Pending => Err(Thrown::suspended(promise.pending())),
            },
        }
    }

    fn write_children(&mut self, children: &[Descriptor], out: &mut String) -> Result<(), Thrown> {
        children.iter().try_for_each(|child| self.write(child, out))
    }

    fn write_element(&mut self, element: &ElementDescriptor, out: &mut String) -> Result<(), Thrown> {
        match element.tag() {
            Tag::Intrinsic(name) => self.write_tag(name, element, out),
            Tag::Component(component) => {
                let rendered = {
                    let mut stash = HookStash::new();
                    let mut scope = Scope::detached(&mut stash, &self.contexts);
                    component.call(&mut scope, element.props(), element.children())?
                };
                self.write(&rendered, out)
            }
            Tag::Fragment => self.write_children(element.children(), out),
            Tag::Provider(provided) => {
                self.contexts.push(provided.clone());
                let result = self.write_children(element.children(), out);
                self.contexts.pop();
                result
            }
            Tag::Boundary(boundary) => self.write_boundary(boundary, element.children(), out),
        }
    }

    fn write_tag(&mut self, name: &str, element: &ElementDescriptor, out: &mut String) -> Result<(), Thrown> {
        out.push('<');
        out.push_str(name);
        for (key, value) in element.props().iter() {
            match value.to_attr() {
                None | Some(AttrValue::Bool(false)) => {}
                Some(AttrValue::Bool(true)) => {
                    out.push(' ');
                    out.push_str(key);
                }
                Some(attr) => {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    self.shared.options.escaper_ref().escape_into(&attr.to_string(), out);
                    out.push('"');
                }
            }
        }
        out.push('>');

        if VOID_ELEMENTS.contains(&name) {
            if !element.children().is_empty() {
                tracing::warn!(tag = name, "children of a void element are not serialized");
            }
            return Ok(());
        }
        self.write_children(element.children(), out)?;
        out.push_str("</");
        out.push_str(name);
        out.push('>');
        Ok(())
    }

    fn write_boundary(&mut self, boundary: &Boundary, children: &[Descriptor], out: &mut String) -> Result<(), Thrown> {
        let jobs = self.jobs.len();
        let callbacks = self.callbacks.len();
        let outer = self.scope.clone();
        let own = boundary.catches_errors().then(|| {
            Rc::new(ErrorScope {
                marker: self.shared.next_marker(MarkerKind::Error),
                boundary: boundary.clone(),
                contexts: self.contexts.clone(),
                parent: outer.clone(),
                used: Cell::new(false),
                failed: Cell::new(false),
            })
        });
        if own.is_some() {
            self.scope.clone_from(&own);
        }

        let mut content = String::new();
        let result = self.write_children(children, &mut content);
        self.scope = outer;
        let thrown = match result {
            Ok(()) => {
                match own.filter(|scope| scope.used.get()) {
                    Some(scope) => self.write_error_region(&scope, &content, out),
                    None => out.push_str(&content),
                }
                return Ok(());
            }
            Err(thrown) => thrown,
        };

        self.jobs.truncate(jobs);
        self.callbacks.truncate(callbacks);
        match thrown {
            Thrown::Suspended(pending) if boundary.catches_suspense() => {
                let marker = self.shared.next_marker(MarkerKind::Suspense);
                let mut fallback = String::new();
                self.write(&boundary.fallback(None), &mut fallback)?;
                let mut region = String::new();
                marker.write_region(&fallback, &mut region);

                let scope = own.clone().or_else(|| self.scope.clone());
                if let Some(scope) = &scope {
                    scope.used.set(true);
                }
                tracing::debug!(placeholder = %marker, waiting = pending.len(), "boundary suspended, streaming its fallback");
                self.jobs.push(Job {
                    marker,
                    children: children.to_vec(),
                    contexts: self.contexts.clone(),
                    scope,
                    pending,
                    shared: self.shared.clone(),
                });

                match own {
                    Some(scope) => self.write_error_region(&scope, &region, out),
                    None => out.push_str(&region),
                }
                Ok(())
            }
            Thrown::Error(error) if boundary.catches_errors() => {
                if let Some(scope) = &own {
                    scope.caught(&self.shared, &error);
                }
                self.write(&boundary.fallback(Some(&error)), out)
            }
            thrown => Err(thrown),
        }
    }

    fn write_error_region(&self, scope: &ErrorScope, content: &str, out: &mut String) {
        scope.marker.write_region(content, out);
        self.shared.error_regions.borrow_mut().push(scope.marker.clone());
    }
}
