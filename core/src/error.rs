//! Error types.
//!
//! [`RenderError`] is what a component body fails with; it travels up the tree until a
//! boundary that catches errors swaps in its fallback. [`Thrown`] is the typed "throw"
//! of a render: either such an error or a suspension on pending promises. [`Error`] is
//! what reaches the caller when nothing caught it.

use alloc::{rc::Rc, vec, vec::Vec};
use core::fmt;

use rivulet_str::Str;

use crate::promise::Pending;

/// A render-time failure raised by a component or by a rejected promise.
///
/// Cloning is cheap: boundaries, `on_error` hooks and promise caches all share the same
/// underlying error.
#[derive(Clone)]
pub struct RenderError(Rc<anyhow::Error>);

impl RenderError {
    /// Creates an error from a message.
    pub fn msg(message: impl Into<Str>) -> Self {
        let message: Str = message.into();
        Self(Rc::new(anyhow::Error::msg(alloc::string::String::from(message))))
    }

    /// Creates an error from any standard error type.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Rc::new(anyhow::Error::new(error)))
    }

    /// Returns the wrapped [`anyhow::Error`].
    #[must_use]
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Attempts to downcast to a concrete error type.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Returns `true` when both values share the same underlying error.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl From<anyhow::Error> for RenderError {
    fn from(value: anyhow::Error) -> Self {
        Self(Rc::new(value))
    }
}

impl fmt::Debug for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

/// Control flow out of a component body.
#[derive(Debug, Clone)]
pub enum Thrown {
    /// The component failed.
    Error(RenderError),
    /// The component waits on promises; the nearest suspense boundary retries once all
    /// of them settled.
    Suspended(Vec<Pending>),
}

impl Thrown {
    /// Suspends on a single promise.
    #[must_use]
    pub fn suspended(pending: Pending) -> Self {
        Self::Suspended(vec![pending])
    }

    /// Returns `true` for [`Thrown::Suspended`].
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended(_))
    }

    /// Converts an escape past the root into the caller-visible error.
    #[must_use]
    pub fn into_unhandled(self) -> Error {
        match self {
            Self::Error(error) => Error::Unhandled(error),
            Self::Suspended(_) => Error::UnhandledSuspension,
        }
    }
}

impl From<RenderError> for Thrown {
    fn from(value: RenderError) -> Self {
        Self::Error(value)
    }
}

impl From<anyhow::Error> for Thrown {
    fn from(value: anyhow::Error) -> Self {
        Self::Error(value.into())
    }
}

/// Failures that escape the whole tree and reach the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A render error with no error boundary above it.
    #[error("unhandled render error: {0}")]
    Unhandled(RenderError),
    /// A component suspended with no suspense boundary above it.
    #[error("component suspended outside of any suspense boundary")]
    UnhandledSuspension,
    /// The root that owned the update has been dropped.
    #[error("root has been dropped")]
    RootDropped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[derive(Debug, thiserror::Error)]
    #[error("disk on fire")]
    struct DiskError;

    #[test]
    fn render_error_keeps_its_source() {
        let error = RenderError::new(DiskError);
        assert_eq!(error.to_string(), "disk on fire");
        assert!(error.downcast_ref::<DiskError>().is_some());
        assert!(error.ptr_eq(&error.clone()));
    }

    #[test]
    fn unhandled_error_mentions_the_cause() {
        let error = Error::Unhandled(RenderError::msg("boom"));
        assert_eq!(error.to_string(), "unhandled render error: boom");
    }

    #[test]
    fn question_mark_lifts_anyhow_errors() {
        fn fails() -> Result<(), Thrown> {
            Err(anyhow::anyhow!("nope"))?;
            Ok(())
        }
        let thrown = fails().unwrap_err();
        assert!(!thrown.is_suspended());
        assert!(matches!(thrown.into_unhandled(), Error::Unhandled(_)));
    }
}
