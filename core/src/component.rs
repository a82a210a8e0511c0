//! Component functions.

use alloc::rc::Rc;
use core::fmt;

use crate::{Descriptor, Props, Thrown, hooks::Scope};

/// What a component body returns: a descriptor, or a thrown error or suspension.
pub type Render = Result<Descriptor, Thrown>;

type RenderFn = dyn Fn(&mut Scope<'_>, &Props, &[Descriptor]) -> Render;

/// A reusable component.
///
/// A component is identified by its render function: clones of one `Component` are the
/// same kind, separately built ones never are. Build a component once and clone it into
/// every descriptor; one rebuilt on each render remounts and loses its hooks.
#[derive(Clone)]
pub struct Component {
    name: &'static str,
    render: Rc<RenderFn>,
}

impl Component {
    /// Wraps a render function.
    pub fn new<F>(render: F) -> Self
    where
        F: Fn(&mut Scope<'_>, &Props, &[Descriptor]) -> Render + 'static,
    {
        Self {
            name: core::any::type_name::<F>(),
            render: Rc::new(render),
        }
    }

    /// Overrides the name used in logs.
    #[must_use]
    pub const fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// The name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` when both share one render function.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.render, &other.render)
    }

    /// Runs the render function.
    ///
    /// # Errors
    ///
    /// Whatever the component throws.
    pub fn call(&self, scope: &mut Scope<'_>, props: &Props, children: &[Descriptor]) -> Render {
        (self.render)(scope, props, children)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(&self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(_: &mut Scope<'_>, _: &Props, _: &[Descriptor]) -> Render {
        Ok(Descriptor::Empty)
    }

    fn second(_: &mut Scope<'_>, _: &Props, _: &[Descriptor]) -> Render {
        Ok(Descriptor::Empty)
    }

    #[test]
    fn identity_follows_the_function_not_its_type() {
        type RenderPtr = fn(&mut Scope<'_>, &Props, &[Descriptor]) -> Render;
        let a = Component::new(first as RenderPtr);
        let b = Component::new(second as RenderPtr);
        assert!(a.same(&a.clone()));
        assert!(!a.same(&b));
        assert!(!a.same(&Component::new(first as RenderPtr)));
    }
}
