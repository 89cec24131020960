//! Fatal framing errors.
//!
//! Every variant is terminal for the stream: once markup or byte alignment is
//! lost there is no way to find the next stanza boundary, so the only safe
//! reaction is to drop the connection.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Markup that cannot be tokenized (missing quote, `/` not followed by `>`,
    /// unbalanced end tag, input ending inside an element).
    MalformedMarkup(&'static str),
    /// Comments, CDATA sections and DTDs are not accepted on an XMPP stream.
    UnsupportedConstruct(&'static str),
    /// The in-progress top-level element grew past the configured limit.
    SizeExceeded { limit: usize, len: usize },
    /// Bytes (or UTF-16 units) that do not form valid text.
    InvalidByteSequence(&'static str),
}

impl FramingError {
    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            FramingError::MalformedMarkup(_) => "malformed_markup",
            FramingError::UnsupportedConstruct(_) => "unsupported_construct",
            FramingError::SizeExceeded { .. } => "size_exceeded",
            FramingError::InvalidByteSequence(_) => "invalid_byte_sequence",
        }
    }
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingError::MalformedMarkup(detail) => write!(f, "malformed markup: {}", detail),
            FramingError::UnsupportedConstruct(detail) => {
                write!(f, "unsupported construct: {}", detail)
            }
            FramingError::SizeExceeded { limit, len } => write!(
                f,
                "stanza size exceeded: {} code units buffered, limit is {}",
                len, limit
            ),
            FramingError::InvalidByteSequence(detail) => {
                write!(f, "invalid byte sequence: {}", detail)
            }
        }
    }
}

impl std::error::Error for FramingError {}

pub type Result<T> = core::result::Result<T, FramingError>;

/// Error returned by [`StanzaReader`](super::StanzaReader): either the
/// transport failed or the bytes it delivered could not be framed.
#[derive(Debug)]
pub enum ReadError {
    Io(std::io::Error),
    Framing(FramingError),
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Io(e) => write!(f, "read failed: {}", e),
            ReadError::Framing(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReadError::Io(e) => Some(e),
            ReadError::Framing(e) => Some(e),
        }
    }
}

// `std::io::Error` is not `Clone`; a copy keeps the kind and the message.
impl Clone for ReadError {
    fn clone(&self) -> Self {
        match self {
            ReadError::Io(e) => ReadError::Io(std::io::Error::new(e.kind(), e.to_string())),
            ReadError::Framing(e) => ReadError::Framing(e.clone()),
        }
    }
}

impl From<std::io::Error> for ReadError {
    fn from(err: std::io::Error) -> Self {
        ReadError::Io(err)
    }
}

impl From<FramingError> for ReadError {
    fn from(err: FramingError) -> Self {
        ReadError::Framing(err)
    }
}
