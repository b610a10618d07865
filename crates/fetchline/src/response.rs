use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde_json::Value;

use crate::body::{collect_bytes, BodyStream};
use crate::decode::{ChunkStream, SseStream};
use crate::header::HeaderMap;
use crate::request::RequestDebug;
use crate::Error;

/// A response body, either materialized or a live stream.
///
/// Buffered variants are produced by awaiting the full body once. The
/// streaming variants hold the decoder and read nothing until polled.
pub enum Body {
    /// No content-type: nothing was read.
    Empty,
    Json(Value),
    Text(String),
    Blob(Bytes),
    /// URL-encoded key/value pairs. Values are trimmed; the last duplicate
    /// key wins.
    Form(BTreeMap<String, String>),
    Events(SseStream),
    Chunks(ChunkStream),
    /// Unknown length: the raw byte chunks as they arrive.
    Stream(BodyStream),
}

impl Body {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Body::Events(_) | Body::Chunks(_) | Body::Stream(_))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Take the SSE stream out of an `Events` body.
    pub fn into_events(self) -> Option<SseStream> {
        match self {
            Body::Events(events) => Some(events),
            _ => None,
        }
    }

    /// Take the record stream out of a `Chunks` body.
    pub fn into_chunks(self) -> Option<ChunkStream> {
        match self {
            Body::Chunks(chunks) => Some(chunks),
            _ => None,
        }
    }

    /// Read whatever is left into bytes.
    ///
    /// Buffered bodies are re-serialized (JSON, text, blob, form); a raw
    /// `Stream` body is collected. Decoded event and chunk streams cannot
    /// be turned back into their wire bytes and yield `None`.
    pub async fn into_bytes(self) -> Option<Result<Bytes, Error>> {
        match self {
            Body::Empty => Some(Ok(Bytes::new())),
            Body::Json(value) => Some(Ok(Bytes::from(value.to_string()))),
            Body::Text(text) => Some(Ok(Bytes::from(text))),
            Body::Blob(bytes) => Some(Ok(bytes)),
            Body::Form(map) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(map.iter())
                    .finish();
                Some(Ok(Bytes::from(encoded)))
            }
            Body::Stream(stream) => Some(collect_bytes(stream.into_inner()).await),
            Body::Events(_) | Body::Chunks(_) => None,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Body::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Body::Blob(bytes) => f.debug_tuple("Blob").field(&bytes.len()).finish(),
            Body::Form(map) => f.debug_tuple("Form").field(map).finish(),
            Body::Events(events) => f.debug_tuple("Events").field(events).finish(),
            Body::Chunks(chunks) => f.debug_tuple("Chunks").field(chunks).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// The response head as the transport returned it.
///
/// This is the raw handle kept alongside the parsed body: the body itself
/// has been consumed, everything else is still here, including repeated
/// headers that the flat mapping joins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The uniform result of a request, for both success and failure.
#[derive(Debug)]
pub struct ResponseEnvelope {
    pub body: Body,
    /// Lowercased header names; repeated headers joined with `", "`.
    pub headers: BTreeMap<String, String>,
    pub status: u16,
    pub status_text: String,
    pub response: ResponseHead,
    /// The prepared request, when debug output was requested.
    pub debug: Option<RequestDebug>,
}

impl ResponseEnvelope {
    pub fn new(body: Body, response: ResponseHead) -> Self {
        Self {
            body,
            headers: response.headers.to_flat_map(),
            status: response.status,
            status_text: response.status_text.clone(),
            response,
            debug: None,
        }
    }

    pub fn with_debug(mut self, debug: RequestDebug) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn is_success(&self) -> bool {
        self.response.is_success()
    }

    /// Resolve on 2xx, reject with [`Error::HttpStatus`] otherwise. Both
    /// outcomes carry this same envelope.
    pub fn into_result(self) -> Result<ResponseEnvelope, Error> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::HttpStatus(Box::new(self)))
        }
    }
}

/// "Return both" result: exactly one of `response` and `error` is set.
///
/// For an HTTP status failure the envelope is reachable through
/// [`Error::envelope`].
#[derive(Debug)]
pub struct Outcome {
    pub response: Option<ResponseEnvelope>,
    pub error: Option<Error>,
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        self.response.is_some()
    }

    pub fn into_result(self) -> Result<ResponseEnvelope, Error> {
        match (self.response, self.error) {
            (Some(response), _) => Ok(response),
            (None, Some(error)) => Err(error),
            (None, None) => Err(Error::InvalidRequest("empty outcome".into())),
        }
    }
}

impl From<Result<ResponseEnvelope, Error>> for Outcome {
    fn from(result: Result<ResponseEnvelope, Error>) -> Self {
        match result {
            Ok(response) => Outcome {
                response: Some(response),
                error: None,
            },
            Err(error) => Outcome {
                response: None,
                error: Some(error),
            },
        }
    }
}
