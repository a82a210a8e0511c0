//! Error and suspense boundaries.
//!
//! A boundary is an element in the descriptor tree. When rendering its children throws
//! something it declared interest in, it swaps in fallback content instead of letting the
//! throw travel further up:
//!
//! - a [`Thrown::Error`] is reported to `on_error` and replaced by the error fallback, for
//!   good;
//! - a [`Thrown::Suspended`] shows the fallback until every pending promise settled, then
//!   the children are retried from scratch.
//!
//! A boundary that does not catch a kind passes it on to the next ancestor.

use alloc::rc::Rc;
use core::fmt;

use crate::{Descriptor, Props, RenderError, Thrown, descriptor::element};

type ErrorFallback = Rc<dyn Fn(&RenderError) -> Descriptor>;
type ErrorHook = Rc<dyn Fn(&RenderError)>;

#[derive(Clone, Default)]
struct Config {
    catch_errors: bool,
    catch_suspense: bool,
    fallback: Descriptor,
    error_fallback: Option<ErrorFallback>,
    on_error: Option<ErrorHook>,
}

/// A boundary configuration. Cheap to clone.
#[derive(Clone, Default)]
pub struct Boundary(Rc<Config>);

impl Boundary {
    /// A boundary that catches nothing yet, with an empty fallback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A suspense boundary showing `fallback` while its children wait.
    pub fn suspense(fallback: impl Into<Descriptor>) -> Self {
        Self::new().catch_suspense(true).with_fallback(fallback)
    }

    /// An error boundary rendering `fallback` for the caught error.
    pub fn error(fallback: impl Fn(&RenderError) -> Descriptor + 'static) -> Self {
        Self::new().catch_errors(true).with_error_fallback(fallback)
    }

    /// Sets whether errors are caught.
    #[must_use]
    pub fn catch_errors(mut self, enabled: bool) -> Self {
        Rc::make_mut(&mut self.0).catch_errors = enabled;
        self
    }

    /// Sets whether suspensions are caught.
    #[must_use]
    pub fn catch_suspense(mut self, enabled: bool) -> Self {
        Rc::make_mut(&mut self.0).catch_suspense = enabled;
        self
    }

    /// Sets the static fallback, shown while suspended and for errors when no error
    /// fallback is set.
    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<Descriptor>) -> Self {
        Rc::make_mut(&mut self.0).fallback = fallback.into();
        self
    }

    /// Sets the fallback rendered for a caught error.
    #[must_use]
    pub fn with_error_fallback(
        mut self,
        fallback: impl Fn(&RenderError) -> Descriptor + 'static,
    ) -> Self {
        Rc::make_mut(&mut self.0).error_fallback = Some(Rc::new(fallback));
        self
    }

    /// Installs a side-effect hook called with every caught error. It cannot change what
    /// gets rendered.
    #[must_use]
    pub fn on_error(mut self, hook: impl Fn(&RenderError) + 'static) -> Self {
        Rc::make_mut(&mut self.0).on_error = Some(Rc::new(hook));
        self
    }

    /// Returns `true` if errors are caught.
    #[must_use]
    pub fn catches_errors(&self) -> bool {
        self.0.catch_errors
    }

    /// Returns `true` if suspensions are caught.
    #[must_use]
    pub fn catches_suspense(&self) -> bool {
        self.0.catch_suspense
    }

    /// Whether this boundary handles `thrown`.
    #[must_use]
    pub fn catches(&self, thrown: &Thrown) -> bool {
        match thrown {
            Thrown::Error(_) => self.0.catch_errors,
            Thrown::Suspended(_) => self.0.catch_suspense,
        }
    }

    /// The fallback for a caught error, or the suspense fallback when `error` is `None`.
    #[must_use]
    pub fn fallback(&self, error: Option<&RenderError>) -> Descriptor {
        match (error, &self.0.error_fallback) {
            (Some(error), Some(render)) => render(error),
            _ => self.0.fallback.clone(),
        }
    }

    /// Passes `error` to the `on_error` hook, if any.
    pub fn report(&self, error: &RenderError) {
        if let Some(hook) = &self.0.on_error {
            hook(error);
        }
    }

    /// Whether a live instance of `self` can be reused for `other`.
    #[must_use]
    pub fn same_kind(&self, other: &Self) -> bool {
        self.0.catch_errors == other.0.catch_errors
            && self.0.catch_suspense == other.0.catch_suspense
    }

    /// Wraps `children` in this boundary.
    pub fn wrap<C>(self, children: C) -> Descriptor
    where
        C: IntoIterator,
        C::Item: Into<Descriptor>,
    {
        element(self, Props::new(), children)
    }
}

impl fmt::Debug for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Boundary")
            .field("catch_errors", &self.0.catch_errors)
            .field("catch_suspense", &self.0.catch_suspense)
            .field("fallback", &self.0.fallback)
            .finish_non_exhaustive()
    }
}

/// Shows `fallback` while `children` suspend.
pub fn suspense<C>(fallback: impl Into<Descriptor>, children: C) -> Descriptor
where
    C: IntoIterator,
    C::Item: Into<Descriptor>,
{
    Boundary::suspense(fallback).wrap(children)
}

/// Replaces `children` with `fallback(error)` when they fail.
pub fn error_boundary<C>(
    fallback: impl Fn(&RenderError) -> Descriptor + 'static,
    children: C,
) -> Descriptor
where
    C: IntoIterator,
    C::Item: Into<Descriptor>,
{
    Boundary::error(fallback).wrap(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Promise, descriptor::text};

    #[test]
    fn boundaries_only_catch_what_they_declare() {
        let (promise, _resolver) = Promise::<u8>::new();
        let suspended = Thrown::suspended(promise.pending());
        let failed = Thrown::Error(RenderError::msg("x"));

        let pending_only = Boundary::suspense(text("loading"));
        assert!(pending_only.catches(&suspended));
        assert!(!pending_only.catches(&failed));

        let errors_only = Boundary::error(|_| text("oops"));
        assert!(errors_only.catches(&failed));
        assert!(!errors_only.catches(&suspended));
    }

    #[test]
    fn error_fallback_sees_the_error() {
        let boundary = Boundary::error(|error| text(alloc::format!("failed: {error}")));
        let rendered = boundary.fallback(Some(&RenderError::msg("io")));
        assert!(matches!(rendered, Descriptor::Text(ref value) if value.as_str() == "failed: io"));
    }

    #[test]
    fn on_error_is_called_for_reports() {
        let seen = Rc::new(core::cell::Cell::new(0));
        let counter = seen.clone();
        let boundary = Boundary::error(|_| Descriptor::Empty)
            .on_error(move |_| counter.set(counter.get() + 1));
        boundary.report(&RenderError::msg("a"));
        assert_eq!(seen.get(), 1);
    }
}
