//! The fetch primitive the client is built on.
//!
//! A [`Transport`] owns connection management and low-level I/O. It takes
//! a [`PreparedRequest`] and returns the response head plus a body
//! [`ByteStream`]; everything after that (classification, decoding,
//! envelopes) is transport-independent.

pub mod hyper_client;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

use std::future::Future;
use std::pin::Pin;

use crate::body::ByteStream;
use crate::header::HeaderMap;
use crate::request::PreparedRequest;
use crate::response::ResponseHead;
use crate::Error;

pub use hyper_client::HyperTransport;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockResponse, MockTransport};

/// Boxed future alias for transport results.
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransportResponse, Error>> + Send + 'a>>;

/// Sends a prepared request and returns the response with an unread body.
///
/// Injected into [`Client`](crate::Client) so tests can script responses.
pub trait Transport: Send + Sync {
    fn send(&self, request: PreparedRequest) -> TransportFuture<'_>;
}

/// A response whose body has not been read yet.
pub struct TransportResponse {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl TransportResponse {
    /// Split into the response head and the unread body.
    pub fn into_parts(self) -> (ResponseHead, ByteStream) {
        (
            ResponseHead {
                url: self.url,
                status: self.status,
                status_text: self.status_text,
                headers: self.headers,
            },
            self.body,
        )
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("url", &self.url)
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Reason phrase for a status code, or an empty string for unknown codes.
pub(crate) fn canonical_reason(status: u16) -> String {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or_default()
        .to_string()
}
