//! Values passed down the tree without threading them through props.

use alloc::{rc::Rc, vec::Vec};
use core::{
    any::Any,
    fmt,
    marker::PhantomData,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{Descriptor, Props, descriptor::{Tag, element}};

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// A typed context key with a default value.
pub struct Context<T> {
    id: u64,
    default: Rc<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: self.default.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Context").field(&self.id).finish()
    }
}

impl<T: 'static> Context<T> {
    /// Creates a new context; readers outside any provider see `default`.
    pub fn new(default: T) -> Self {
        Self {
            id: NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed),
            default: Rc::new(default),
            _marker: PhantomData,
        }
    }

    /// Makes `value` visible to every descendant of `children`.
    pub fn provide<C>(&self, value: T, children: C) -> Descriptor
    where
        C: IntoIterator,
        C::Item: Into<Descriptor>,
    {
        element(
            Tag::Provider(Provided {
                id: self.id,
                value: Rc::new(value),
            }),
            Props::new(),
            children,
        )
    }
}

/// A provided context value, carried by provider elements.
#[derive(Clone)]
pub struct Provided {
    id: u64,
    value: Rc<dyn Any>,
}

impl Provided {
    /// Identifies the [`Context`] this value belongs to.
    #[must_use]
    pub const fn context_id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for Provided {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provided").field("context", &self.id).finish_non_exhaustive()
    }
}

/// Providers enclosing the node being rendered, outermost first.
#[derive(Debug, Clone, Default)]
pub struct ContextStack(Vec<Provided>);

impl ContextStack {
    /// Creates an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Enters a provider.
    pub fn push(&mut self, provided: Provided) {
        self.0.push(provided);
    }

    /// Leaves the innermost provider.
    pub fn pop(&mut self) {
        self.0.pop();
    }

    /// Resolves `context` against the innermost matching provider.
    #[must_use]
    pub fn lookup<T: 'static>(&self, context: &Context<T>) -> Rc<T> {
        self.0
            .iter()
            .rev()
            .filter(|provided| provided.id == context.id)
            .find_map(|provided| provided.value.clone().downcast::<T>().ok())
            .unwrap_or_else(|| context.default.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn innermost_provider_wins() {
        let theme = Context::new("light");
        let mut stack = ContextStack::new();
        assert_eq!(*stack.lookup(&theme), "light");

        for value in ["dark", "sepia"] {
            let Descriptor::Element(provider) = theme.provide(value, [Descriptor::Empty]) else {
                unreachable!()
            };
            let Tag::Provider(provided) = provider.tag() else {
                unreachable!()
            };
            stack.push(provided.clone());
        }
        assert_eq!(*stack.lookup(&theme), "sepia");
        stack.pop();
        assert_eq!(*stack.lookup(&theme), "dark");
    }

    #[test]
    fn unrelated_contexts_do_not_leak() {
        let first = Context::new(1_u8);
        let second = Context::new(2_u8);
        let Descriptor::Element(provider) = first.provide(10, [Descriptor::Empty]) else {
            unreachable!()
        };
        let Tag::Provider(provided) = provider.tag() else {
            unreachable!()
        };
        let mut stack = ContextStack::new();
        stack.push(provided.clone());
        assert_eq!(*stack.lookup(&second), 2);
        assert_eq!(*stack.lookup(&first), 10);
    }
}
