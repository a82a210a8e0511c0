//! Shared string types for Rivulet.
//!
//! [`Str`] is the string type used everywhere a tag name, attribute key, attribute
//! value or text node flows through the engine. It is either a `&'static str` or a
//! reference-counted slice, so cloning it while diffing descriptor trees never copies
//! the underlying bytes.
//!
//! [`EscapedStr`] and [`Escaper`] form the escaping boundary: the engine never decides
//! how text is escaped, it only asks an [`Escaper`] to do it unless the string is
//! already flagged as escaped.

#![no_std]

extern crate alloc;

mod escape;

pub use escape::{EscapeCallback, EscapedStr, Escaper, HtmlEscaper, escape_html};

use alloc::{boxed::Box, rc::Rc, string::String};
use core::{
    borrow::Borrow,
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    ops::Deref,
};

/// A cheaply clonable, immutable string.
#[derive(Clone)]
pub struct Str(Repr);

#[derive(Clone)]
enum Repr {
    Static(&'static str),
    Shared(Rc<str>),
}

impl Str {
    /// Creates a string from a static slice without allocating.
    #[must_use]
    pub const fn from_static(value: &'static str) -> Self {
        Self(Repr::Static(value))
    }

    /// Creates an empty string.
    #[must_use]
    pub const fn new() -> Self {
        Self::from_static("")
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match &self.0 {
            Repr::Static(value) => value,
            Repr::Shared(value) => value,
        }
    }

    /// Returns `true` when both values point at the same storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Repr::Static(a), Repr::Static(b)) => core::ptr::eq(*a, *b),
            (Repr::Shared(a), Repr::Shared(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Default for Str {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Str {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for Str {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for Str {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq for Str {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.as_str() == other.as_str()
    }
}

impl Eq for Str {}

impl PartialEq<str> for Str {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Str {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl PartialOrd for Str {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Str {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Hash for Str {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl fmt::Debug for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&'static str> for Str {
    fn from(value: &'static str) -> Self {
        Self::from_static(value)
    }
}

impl From<String> for Str {
    fn from(value: String) -> Self {
        if value.is_empty() {
            return Self::new();
        }
        Self(Repr::Shared(Rc::from(value)))
    }
}

impl From<&String> for Str {
    fn from(value: &String) -> Self {
        Self::from(value.clone())
    }
}

impl From<Rc<str>> for Str {
    fn from(value: Rc<str>) -> Self {
        Self(Repr::Shared(value))
    }
}

impl From<Box<str>> for Str {
    fn from(value: Box<str>) -> Self {
        Self(Repr::Shared(Rc::from(value)))
    }
}

impl From<Str> for String {
    fn from(value: Str) -> Self {
        Self::from(value.as_str())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Str {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Str {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn static_and_shared_compare_by_content() {
        let a = Str::from("hello");
        let b = Str::from("hello".to_string());
        assert_eq!(a, b);
        assert!(!a.ptr_eq(&b));
        assert!(a.ptr_eq(&a.clone()));
    }

    #[test]
    fn empty_string_does_not_allocate() {
        let empty = Str::from(String::new());
        assert!(matches!(empty.0, Repr::Static("")));
        assert_eq!(empty, Str::new());
    }

    #[test]
    fn display_matches_content() {
        let value = Str::from("Count: 1".to_string());
        assert_eq!(value.to_string(), "Count: 1");
        assert_eq!(&*value, "Count: 1");
    }
}
