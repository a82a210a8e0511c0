//! Markup escaping boundary.

use alloc::{rc::Rc, string::String, vec::Vec};
use core::fmt;

use crate::Str;

/// Escapes raw text for a target markup format.
pub trait Escaper {
    /// Appends `raw`, escaped, to `out`.
    fn escape_into(&self, raw: &str, out: &mut String);
}

/// Escaper for HTML text and double-quoted attribute values.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlEscaper;

impl Escaper for HtmlEscaper {
    fn escape_into(&self, raw: &str, out: &mut String) {
        escape_html(raw, out);
    }
}

/// Escapes `&`, `<`, `>`, `"` and `'` into `out`.
pub fn escape_html(raw: &str, out: &mut String) {
    let mut last = 0;
    for (index, byte) in raw.bytes().enumerate() {
        let replacement = match byte {
            b'&' => "&amp;",
            b'<' => "&lt;",
            b'>' => "&gt;",
            b'"' => "&quot;",
            b'\'' => "&#39;",
            _ => continue,
        };
        out.push_str(&raw[last..index]);
        out.push_str(replacement);
        last = index + 1;
    }
    out.push_str(&raw[last..]);
}

/// Callback run when the chunk containing an [`EscapedStr`] is finalized.
///
/// It receives the chunk being emitted and may append to it.
pub type EscapeCallback = Rc<dyn Fn(&mut String)>;

/// Markup text together with its escaping state.
///
/// Strings created with [`EscapedStr::escaped`] are trusted and written verbatim;
/// strings created with [`EscapedStr::raw`] go through the active [`Escaper`].
#[derive(Clone, Default)]
pub struct EscapedStr {
    text: Str,
    escaped: bool,
    callbacks: Vec<EscapeCallback>,
}

impl EscapedStr {
    /// Wraps text that still needs escaping.
    pub fn raw(text: impl Into<Str>) -> Self {
        Self {
            text: text.into(),
            escaped: false,
            callbacks: Vec::new(),
        }
    }

    /// Wraps markup that is already escaped.
    pub fn escaped(text: impl Into<Str>) -> Self {
        Self {
            text: text.into(),
            escaped: true,
            callbacks: Vec::new(),
        }
    }

    /// Adds a deferred callback.
    #[must_use]
    pub fn with_callback(mut self, callback: impl Fn(&mut String) + 'static) -> Self {
        self.callbacks.push(Rc::new(callback));
        self
    }

    /// The wrapped text.
    #[must_use]
    pub const fn text(&self) -> &Str {
        &self.text
    }

    /// Whether the text is already escaped.
    #[must_use]
    pub const fn is_escaped(&self) -> bool {
        self.escaped
    }

    /// Deferred callbacks attached to this string.
    #[must_use]
    pub fn callbacks(&self) -> &[EscapeCallback] {
        &self.callbacks
    }

    /// Writes the text to `out`, escaping it first unless it is flagged as escaped.
    pub fn write_to(&self, escaper: &dyn Escaper, out: &mut String) {
        if self.escaped {
            out.push_str(&self.text);
        } else {
            escaper.escape_into(&self.text, out);
        }
    }
}

impl fmt::Debug for EscapedStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EscapedStr")
            .field("text", &self.text)
            .field("escaped", &self.escaped)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl PartialEq for EscapedStr {
    fn eq(&self, other: &Self) -> bool {
        self.escaped == other.escaped
            && self.text == other.text
            && self.callbacks.len() == other.callbacks.len()
            && self
                .callbacks
                .iter()
                .zip(&other.callbacks)
                .all(|(a, b)| Rc::ptr_eq(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;

    #[test]
    fn escapes_markup_characters() {
        let mut out = String::new();
        escape_html("<a href=\"x\">Tom & 'Jerry'</a>", &mut out);
        assert_eq!(
            out,
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn escaped_strings_are_written_verbatim() {
        let mut out = String::new();
        EscapedStr::escaped("<b>bold</b>").write_to(&HtmlEscaper, &mut out);
        EscapedStr::raw("<i>").write_to(&HtmlEscaper, &mut out);
        assert_eq!(out, "<b>bold</b>&lt;i&gt;");
    }
}
