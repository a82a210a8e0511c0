//! Element properties.
//!
//! Props are an ordered map from name to [`PropValue`]. Plain values become attributes
//! on the display surface; [`EventHandler`]s become listeners (names follow the
//! `on<Event>` / `on<Event>Capture` convention, see [`crate::events`]); a
//! [`RefCallback`] under the `ref` key receives the rendered handle.

use alloc::rc::Rc;
use core::{any::Any, cell::RefCell, fmt};

use indexmap::IndexMap;
use rivulet_str::Str;

/// The prop key that carries a [`RefCallback`].
pub const REF_KEY: &str = "ref";

/// Payload handed to event handlers.
#[derive(Debug, Clone, Default)]
pub struct Event {
    name: Str,
    value: Option<Str>,
}

impl Event {
    /// Creates an event with the given platform name.
    pub fn new(name: impl Into<Str>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Attaches a value, e.g. the contents of an input after an `input` event.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Str>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// The platform event name.
    #[must_use]
    pub const fn name(&self) -> &Str {
        &self.name
    }

    /// The attached value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&Str> {
        self.value.as_ref()
    }
}

/// An event listener. Two handlers are equal only if they are the same allocation.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&Event)>);

impl EventHandler {
    /// Wraps a closure.
    pub fn new(f: impl Fn(&Event) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Invokes the handler.
    pub fn call(&self, event: &Event) {
        (self.0)(event);
    }

    /// Returns `true` when both handlers share one allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        core::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl<F: Fn(&Event) + 'static> From<Rc<F>> for EventHandler {
    fn from(value: Rc<F>) -> Self {
        Self(value)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventHandler")
    }
}

/// Receives the rendered handle when its element is attached and `None` when it is
/// detached.
#[derive(Clone)]
pub struct RefCallback(Rc<dyn Fn(Option<&dyn Any>)>);

impl RefCallback {
    /// Wraps a closure.
    pub fn new(f: impl Fn(Option<&dyn Any>) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Attaches `handle`.
    pub fn attach(&self, handle: &dyn Any) {
        (self.0)(Some(handle));
    }

    /// Detaches the previous handle.
    pub fn detach(&self) {
        (self.0)(None);
    }

    /// Returns `true` when both callbacks share one allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        core::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl fmt::Debug for RefCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefCallback")
    }
}

/// A typed slot that a [`RefCallback`] fills with the rendered handle.
#[derive(Debug)]
pub struct NodeRef<N>(Rc<RefCell<Option<N>>>);

impl<N> Clone for NodeRef<N> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<N> Default for NodeRef<N> {
    fn default() -> Self {
        Self(Rc::new(RefCell::new(None)))
    }
}

impl<N: Clone + 'static> NodeRef<N> {
    /// Creates an empty ref.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the attached handle.
    #[must_use]
    pub fn get(&self) -> Option<N> {
        self.0.borrow().clone()
    }

    /// Builds the callback that fills this ref.
    #[must_use]
    pub fn callback(&self) -> RefCallback {
        let slot = self.0.clone();
        RefCallback::new(move |handle| {
            *slot.borrow_mut() = handle.and_then(|handle| handle.downcast_ref::<N>()).cloned();
        })
    }
}

/// A single prop value.
#[derive(Debug, Clone, Default)]
pub enum PropValue {
    /// Absent; removes the attribute.
    #[default]
    Null,
    /// A boolean attribute. `false` behaves like [`PropValue::Null`].
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// A string.
    Str(Str),
    /// An event listener.
    Handler(EventHandler),
    /// A ref callback.
    Ref(RefCallback),
}

impl PropValue {
    /// Converts to an attribute value, or `None` when the attribute should be absent or
    /// the value is not an attribute at all.
    #[must_use]
    pub fn to_attr(&self) -> Option<AttrValue> {
        match self {
            Self::Null | Self::Bool(false) | Self::Handler(_) | Self::Ref(_) => None,
            Self::Bool(true) => Some(AttrValue::Bool(true)),
            Self::Int(value) => Some(AttrValue::Int(*value)),
            Self::Float(value) => Some(AttrValue::Float(*value)),
            Self::Str(value) => Some(AttrValue::Str(value.clone())),
        }
    }

    /// Returns the handler, if this is one.
    #[must_use]
    pub const fn as_handler(&self) -> Option<&EventHandler> {
        match self {
            Self::Handler(handler) => Some(handler),
            _ => None,
        }
    }

    /// Returns the string, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Handler(a), Self::Handler(b)) => a.ptr_eq(b),
            (Self::Ref(a), Self::Ref(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

macro_rules! prop_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for PropValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )*
    };
}

prop_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f64 => Float,
    &'static str => Str,
    alloc::string::String => Str,
    Str => Str,
    EventHandler => Handler,
    RefCallback => Ref,
}

impl<T: Into<Self>> From<Option<T>> for PropValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A value that reaches the display surface as an attribute.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AttrValue {
    /// A present boolean attribute.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// A string.
    Str(Str),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
        }
    }
}

/// Ordered element properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props(IndexMap<Str, PropValue>);

impl Props {
    /// Creates an empty prop map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a prop, builder style.
    #[must_use]
    pub fn attr(mut self, key: impl Into<Str>, value: impl Into<PropValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds an event handler under an `on<Event>` key, builder style.
    #[must_use]
    pub fn on(self, key: impl Into<Str>, handler: impl Into<EventHandler>) -> Self {
        self.attr(key, PropValue::Handler(handler.into()))
    }

    /// Adds a ref callback, builder style.
    #[must_use]
    pub fn with_ref(self, callback: impl Into<RefCallback>) -> Self {
        self.attr(REF_KEY, PropValue::Ref(callback.into()))
    }

    /// Sets a prop in place.
    pub fn insert(&mut self, key: impl Into<Str>, value: impl Into<PropValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Looks up a prop.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.0.get(key)
    }

    /// Looks up a string prop.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropValue::as_str)
    }

    /// Looks up an integer prop.
    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(PropValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    /// Looks up a boolean prop; absent means `false`.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some(PropValue::Bool(true)))
    }

    /// Looks up an event handler.
    #[must_use]
    pub fn get_handler(&self, key: &str) -> Option<&EventHandler> {
        self.get(key).and_then(PropValue::as_handler)
    }

    /// Returns the ref callback, if any.
    #[must_use]
    pub fn ref_callback(&self) -> Option<&RefCallback> {
        match self.get(REF_KEY) {
            Some(PropValue::Ref(callback)) => Some(callback),
            _ => None,
        }
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Str, &PropValue)> {
        self.0.iter()
    }

    /// Number of props.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when there are no props.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<Str>, V: Into<PropValue>> FromIterator<(K, V)> for Props {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlers_compare_by_identity() {
        let handler = EventHandler::new(|_| {});
        let same = PropValue::Handler(handler.clone());
        let other = PropValue::Handler(EventHandler::new(|_| {}));
        assert_eq!(PropValue::Handler(handler), same);
        assert_ne!(same, other);
    }

    #[test]
    fn false_and_null_are_not_attributes() {
        assert_eq!(PropValue::Bool(false).to_attr(), None);
        assert_eq!(PropValue::Null.to_attr(), None);
        assert_eq!(
            PropValue::from("x").to_attr(),
            Some(AttrValue::Str(Str::from("x")))
        );
    }

    #[test]
    fn node_ref_follows_attach_and_detach() {
        let node_ref = NodeRef::<u32>::new();
        let callback = node_ref.callback();
        callback.attach(&7_u32);
        assert_eq!(node_ref.get(), Some(7));
        callback.detach();
        assert_eq!(node_ref.get(), None);
    }

    #[test]
    fn props_keep_insertion_order() {
        let props = Props::new().attr("id", "a").attr("class", "b").attr("id", "c");
        let keys: alloc::vec::Vec<_> = props.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, ["id", "class"]);
        assert_eq!(props.get_str("id"), Some("c"));
    }
}
