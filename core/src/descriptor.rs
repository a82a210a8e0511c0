//! Element descriptors: the immutable trees application code produces every render.

use alloc::{rc::Rc, string::String, vec::Vec};
use core::fmt;

use rivulet_str::{EscapedStr, Str};

use crate::{
    boundary::Boundary, component::Component, context::Provided, promise::Promise,
    props::Props,
};

/// What an element descriptor renders as.
#[derive(Clone)]
pub enum Tag {
    /// A primitive display element, e.g. `div`.
    Intrinsic(Str),
    /// A component function.
    Component(Component),
    /// Children without a wrapper.
    Fragment,
    /// An error and/or suspense boundary.
    Boundary(Boundary),
    /// A context provider.
    Provider(Provided),
}

impl Tag {
    /// Whether an instance created for `self` can be reused for `other`.
    ///
    /// Boundaries match any boundary catching the same kinds and providers match any
    /// provider of the same context, so rebuilding them every render keeps their
    /// subtree alive.
    #[must_use]
    pub fn same_kind(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Intrinsic(a), Self::Intrinsic(b)) => a == b,
            (Self::Component(a), Self::Component(b)) => a.same(b),
            (Self::Fragment, Self::Fragment) => true,
            (Self::Boundary(a), Self::Boundary(b)) => a.same_kind(b),
            (Self::Provider(a), Self::Provider(b)) => a.context_id() == b.context_id(),
            _ => false,
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intrinsic(name) => write!(f, "<{name}>"),
            Self::Component(component) => write!(f, "<{}>", component.name()),
            Self::Fragment => f.write_str("<>"),
            Self::Boundary(_) => f.write_str("<Boundary>"),
            Self::Provider(_) => f.write_str("<Provider>"),
        }
    }
}

impl From<&'static str> for Tag {
    fn from(value: &'static str) -> Self {
        Self::Intrinsic(Str::from(value))
    }
}

impl From<Str> for Tag {
    fn from(value: Str) -> Self {
        Self::Intrinsic(value)
    }
}

impl From<Component> for Tag {
    fn from(value: Component) -> Self {
        Self::Component(value)
    }
}

impl From<Boundary> for Tag {
    fn from(value: Boundary) -> Self {
        Self::Boundary(value)
    }
}

/// An element node: tag, props, children and an optional list key.
#[derive(Clone)]
pub struct ElementDescriptor {
    tag: Tag,
    props: Props,
    children: Vec<Descriptor>,
    key: Option<Str>,
}

impl ElementDescriptor {
    /// The tag.
    #[must_use]
    pub const fn tag(&self) -> &Tag {
        &self.tag
    }

    /// The props.
    #[must_use]
    pub const fn props(&self) -> &Props {
        &self.props
    }

    /// The children.
    #[must_use]
    pub fn children(&self) -> &[Descriptor] {
        &self.children
    }

    /// The list key.
    #[must_use]
    pub const fn key(&self) -> Option<&Str> {
        self.key.as_ref()
    }
}

impl fmt::Debug for ElementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementDescriptor")
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("props", &self.props.len())
            .field("children", &self.children)
            .finish()
    }
}

/// A node of the declarative tree.
#[derive(Clone, Default)]
pub enum Descriptor {
    /// Renders nothing.
    #[default]
    Empty,
    /// A text node.
    Text(Str),
    /// Markup that bypasses escaping when already flagged as escaped.
    Raw(EscapedStr),
    /// An element, component, fragment, boundary or provider.
    Element(Rc<ElementDescriptor>),
    /// A subtree that is still being computed, as returned by async components.
    Deferred(Promise<Descriptor>),
}

impl Descriptor {
    /// Pre-escaped or to-be-escaped markup.
    #[must_use]
    pub const fn raw(markup: EscapedStr) -> Self {
        Self::Raw(markup)
    }

    /// A subtree that renders once `promise` resolves.
    #[must_use]
    pub const fn deferred(promise: Promise<Self>) -> Self {
        Self::Deferred(promise)
    }

    /// Sets the list key. Keys on non-element descriptors are ignored.
    #[must_use]
    pub fn keyed(self, key: impl Into<Str>) -> Self {
        match self {
            Self::Element(mut element) => {
                Rc::make_mut(&mut element).key = Some(key.into());
                Self::Element(element)
            }
            other => other,
        }
    }

    /// The list key, if this is a keyed element.
    #[must_use]
    pub fn key(&self) -> Option<&Str> {
        match self {
            Self::Element(element) => element.key(),
            _ => None,
        }
    }

    /// Returns the element, if this is one.
    #[must_use]
    pub fn as_element(&self) -> Option<&ElementDescriptor> {
        match self {
            Self::Element(element) => Some(element),
            _ => None,
        }
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Raw(raw) => f.debug_tuple("Raw").field(raw).finish(),
            Self::Element(element) => fmt::Debug::fmt(element, f),
            Self::Deferred(promise) => f.debug_tuple("Deferred").field(promise).finish(),
        }
    }
}

impl From<&'static str> for Descriptor {
    fn from(value: &'static str) -> Self {
        Self::Text(Str::from(value))
    }
}

impl From<String> for Descriptor {
    fn from(value: String) -> Self {
        Self::Text(Str::from(value))
    }
}

impl From<Str> for Descriptor {
    fn from(value: Str) -> Self {
        Self::Text(value)
    }
}

impl From<EscapedStr> for Descriptor {
    fn from(value: EscapedStr) -> Self {
        Self::Raw(value)
    }
}

impl From<Promise<Self>> for Descriptor {
    fn from(value: Promise<Self>) -> Self {
        Self::Deferred(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Descriptor {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Descriptor {
    fn from(value: Vec<T>) -> Self {
        fragment(value)
    }
}

/// Builds an element descriptor. This is the only constructor application code needs.
pub fn element<C>(tag: impl Into<Tag>, props: Props, children: C) -> Descriptor
where
    C: IntoIterator,
    C::Item: Into<Descriptor>,
{
    Descriptor::Element(Rc::new(ElementDescriptor {
        tag: tag.into(),
        props,
        children: children.into_iter().map(Into::into).collect(),
        key: None,
    }))
}

/// A text node.
pub fn text(value: impl Into<Str>) -> Descriptor {
    Descriptor::Text(value.into())
}

/// Groups children without a wrapper element.
pub fn fragment<C>(children: C) -> Descriptor
where
    C: IntoIterator,
    C::Item: Into<Descriptor>,
{
    element(Tag::Fragment, Props::new(), children)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_sets_key_on_elements_only() {
        let item = element("li", Props::new(), ["a"]).keyed("1");
        assert_eq!(item.key().map(Str::as_str), Some("1"));
        assert!(text("plain").keyed("2").key().is_none());
    }

    #[test]
    fn keyed_does_not_touch_shared_copies() {
        let original = element("li", Props::new(), ["a"]);
        let keyed = original.clone().keyed("k");
        assert!(original.key().is_none());
        assert!(keyed.key().is_some());
    }

    #[test]
    fn intrinsic_tags_compare_by_name() {
        assert!(Tag::from("div").same_kind(&Tag::from("div")));
        assert!(!Tag::from("div").same_kind(&Tag::from("span")));
        assert!(!Tag::from("div").same_kind(&Tag::Fragment));
    }
}
