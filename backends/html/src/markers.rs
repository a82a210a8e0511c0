//! Placeholder markers and the replacement protocol.
//!
//! A region that may be replaced later is written as
//!
//! ```html
//! <template id="S:0"></template>fallback<!--S:0-->
//! ```
//!
//! and replaced by a chunk carrying the new markup in an inert `<template>` plus a
//! script that splices it in place of everything between the two markers. Each
//! replacement only refers to its own id, so replacements can arrive in any order.
//!
//! Error regions (`E:n`) are only ever replaced by a fallback. A streamed page keeps the
//! markers of those that never failed, while a buffered render unwraps them.

use core::fmt;

/// Finds the region of the id passed as `i` and swaps in the matching template content.
const SPLICE_SCRIPT: &str = "(function(i){\
var s=document.getElementById(i),t=document.querySelector('template[data-target=\"'+i+'\"]');\
if(!s||!t)return;\
var p=s.parentNode,n=s.nextSibling;\
while(n&&!(n.nodeType===8&&n.data===i)){var x=n.nextSibling;p.removeChild(n);n=x}\
p.insertBefore(t.content,s);if(n)p.removeChild(n);p.removeChild(s);t.remove()})";

/// What a marked region stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MarkerKind {
    /// Fallback of a suspended boundary, replaced by its content.
    Suspense,
    /// Content of an error boundary, replaced by its fallback when an awaited descendant
    /// rejects.
    Error,
}

impl MarkerKind {
    const fn letter(self) -> char {
        match self {
            Self::Suspense => 'S',
            Self::Error => 'E',
        }
    }
}

/// The id of a marked region, such as `S:3`, or `S:app-3` under the prefix `app`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MarkerId(String);

impl MarkerId {
    pub(crate) fn new(kind: MarkerKind, prefix: &str, n: u64) -> Self {
        if prefix.is_empty() {
            Self(format!("{}:{n}", kind.letter()))
        } else {
            Self(format!("{}:{prefix}-{n}", kind.letter()))
        }
    }

    fn open(&self) -> String {
        format!("<template id=\"{}\"></template>", self.0)
    }

    fn close(&self) -> String {
        format!("<!--{}-->", self.0)
    }

    /// Writes `content` wrapped in this id's markers.
    pub(crate) fn write_region(&self, content: &str, out: &mut String) {
        out.push_str(&self.open());
        out.push_str(content);
        out.push_str(&self.close());
    }

    /// Byte range of this region in `document`, markers included.
    fn locate(&self, document: &str) -> Option<(usize, usize, usize, usize)> {
        let open = self.open();
        let close = self.close();
        let start = document.find(&open)?;
        let content = start + open.len();
        let end = content + document[content..].find(&close)?;
        Some((start, content, end, end + close.len()))
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The self-contained chunk replacing the region `target` with `markup`.
pub(crate) fn replacement_chunk(target: &MarkerId, markup: &str) -> String {
    format!("<template data-target=\"{target}\">{markup}</template><script>{SPLICE_SCRIPT}(\"{target}\")</script>")
}

/// Replaces the region `target` in `document`, markers included, with `markup`.
///
/// Returns `false` when the region is not in the document, typically because an
/// enclosing region was replaced first.
pub(crate) fn splice(document: &mut String, target: &MarkerId, markup: &str) -> bool {
    let Some((start, _, _, end)) = target.locate(document) else {
        return false;
    };
    document.replace_range(start..end, markup);
    true
}

/// Removes the markers of `target`, keeping what is between them.
pub(crate) fn unwrap_region(document: &mut String, target: &MarkerId) {
    if let Some((start, content, end, close)) = target.locate(document) {
        document.replace_range(end..close, "");
        document.replace_range(start..content, "");
    }
}

/// Keeps the characters of `prefix` that are safe inside both an attribute and a script
/// string.
pub(crate) fn sanitize_prefix(prefix: &str) -> String {
    prefix
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect()
}
