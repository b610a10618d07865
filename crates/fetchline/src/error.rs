//! Error types for fetchline requests and stream decoding.

use bytes::Bytes;
use thiserror::Error;

use crate::response::ResponseEnvelope;

/// Result type alias for fetchline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed source error attached to [`Error::BodyParse`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the client, the classifier, and the stream decoders.
///
/// Nothing is retried internally. The one exception is
/// [`EventSource`](crate::EventSource), which reconnects on transport and
/// read failures by design of the SSE protocol.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),

    #[error("failed to parse {kind} body (status {status}): {source}")]
    BodyParse {
        kind: &'static str,
        status: u16,
        body: Bytes,
        #[source]
        source: BoxError,
    },

    #[error("stream read error: {0}")]
    StreamRead(String),

    /// The body parsed, but the status was outside 2xx. The envelope has
    /// the same shape as a successful one.
    #[error("request failed with status {} {}", .0.status, .0.status_text)]
    HttpStatus(Box<ResponseEnvelope>),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("request aborted")]
    Aborted,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// The response envelope of an [`Error::HttpStatus`], if this is one.
    pub fn envelope(&self) -> Option<&ResponseEnvelope> {
        match self {
            Error::HttpStatus(envelope) => Some(envelope),
            _ => None,
        }
    }

    /// Consume the error and return the envelope of an [`Error::HttpStatus`].
    pub fn into_envelope(self) -> Option<ResponseEnvelope> {
        match self {
            Error::HttpStatus(envelope) => Some(*envelope),
            _ => None,
        }
    }

    /// HTTP status carried by the error, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus(envelope) => Some(envelope.status),
            Error::BodyParse { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}
