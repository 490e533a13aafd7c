//! Boundary-allocated text buffers.
//!
//! A [`BStr`] distinguishes a null buffer from an empty one, the way text
//! fields arrive from late-bound callers. Readers normalize null to empty
//! before looking at the contents.

use std::fmt;

/// A nullable, owned text buffer.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BStr(Option<Box<str>>);

impl BStr {
    /// The null buffer.
    pub const fn null() -> Self {
        Self(None)
    }

    /// Allocate a buffer holding `text`.
    pub fn new(text: &str) -> Self {
        Self(Some(text.into()))
    }

    /// Whether no buffer is allocated.
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// The contents; a null buffer reads as empty text.
    pub fn as_str(&self) -> &str {
        self.0.as_deref().unwrap_or("")
    }

    /// Length in UTF-16 code units.
    pub fn len(&self) -> usize {
        self.as_str().encode_utf16().count()
    }

    /// Whether the buffer is null or holds empty text.
    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }

    /// Replace a null buffer with an allocated empty one.
    pub fn normalize_null(&mut self) {
        if self.0.is_none() {
            self.0 = Some("".into());
        }
    }

    /// Release the current buffer and allocate a new one holding `text`.
    pub fn reallocate(&mut self, text: &str) {
        self.0 = Some(text.into());
    }

    /// Take the buffer, leaving null behind.
    pub fn take(&mut self) -> BStr {
        BStr(self.0.take())
    }

    /// Case-insensitive comparison; null compares as empty.
    pub fn eq_ignore_case(&self, other: &str) -> bool {
        self.as_str()
            .chars()
            .flat_map(char::to_lowercase)
            .eq(other.chars().flat_map(char::to_lowercase))
    }

    /// The contents, or `None` for a null buffer.
    pub fn as_option(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Debug for BStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(text) => write!(f, "{:?}", text),
            None => f.write_str("null"),
        }
    }
}

impl fmt::Display for BStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for BStr {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for BStr {
    fn from(text: String) -> Self {
        Self(Some(text.into_boxed_str()))
    }
}

impl From<Option<&str>> for BStr {
    fn from(text: Option<&str>) -> Self {
        Self(text.map(Into::into))
    }
}
