//! Framed protocol messages.

use std::fmt;

use bytes::Bytes;

/// One terminated line read from the device, with the terminator stripped.
///
/// The protocol is latin-1 text, so every byte maps to exactly one `char` and
/// the text rendering never fails.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    raw: Bytes,
    text: String,
}

impl Message {
    pub fn new(raw: impl Into<Bytes>) -> Self {
        let raw = raw.into();
        let text = raw.iter().map(|&b| char::from(b)).collect();
        Self { raw, text }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message({:?})", self.text)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Self::new(Bytes::copy_from_slice(value.as_bytes()))
    }
}
