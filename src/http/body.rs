//! Response body values.
//!
//! Units set a [`Body`] on the context and leave the byte-level decision to
//! the finalizer: text and bytes are written verbatim, streams are copied,
//! redirects become a `Location` header, and structured values go through the
//! response encoder registered by body-format middleware.

use std::fmt;
use std::io::Read;

use bytes::Bytes;

/// A redirect target set as the response body.
///
/// Absolute URLs are sent as is; relative targets are resolved against the
/// directory of the request path. The status defaults to `302 Found` unless a
/// unit set one explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    to: String,
}

impl Redirect {
    /// Creates a redirect to `target`.
    pub fn to(target: impl Into<String>) -> Self {
        Self { to: target.into() }
    }

    /// Returns the target as given.
    pub fn target(&self) -> &str {
        &self.to
    }
}

/// The body value a unit has chosen for the response.
pub enum Body {
    /// UTF-8 text, written verbatim.
    Text(String),
    /// Raw bytes, written verbatim.
    Bytes(Bytes),
    /// A stream copied to the sink during finalization.
    Stream(Box<dyn Read + Send>),
    /// A redirect; produces a `Location` header instead of content.
    Redirect(Redirect),
    /// A structured value handed to the response encoder.
    Value(serde_json::Value),
}

impl Body {
    /// Wraps any reader as a streamed body.
    pub fn stream(reader: impl Read + Send + 'static) -> Self {
        Self::Stream(Box::new(reader))
    }

    /// Returns the body as text if it is a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the structured value if the body is a `Value`.
    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Redirect(redirect) => f.debug_tuple("Redirect").field(redirect).finish(),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes.into())
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Redirect> for Body {
    fn from(redirect: Redirect) -> Self {
        Self::Redirect(redirect)
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}
