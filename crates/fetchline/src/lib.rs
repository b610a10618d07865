//! fetchline: an HTTP request layer that reads response bodies by type.
//!
//! A [`Client`] sends a request through a [`Transport`] and decides from
//! the response headers alone how to read the body: JSON, text, binary,
//! form data, or one of three streaming shapes. Streaming bodies come back
//! as lazy `Stream`s so the caller can consume them as they arrive.
//!
//! # Body Model
//!
//! | headers                                   | body                    |
//! |-------------------------------------------|-------------------------|
//! | `content-type: text/event-stream`         | [`Body::Events`]        |
//! | `transfer-encoding: chunked`              | [`Body::Chunks`]        |
//! | no `content-length`                       | [`Body::Stream`]        |
//! | `*json*`, `*text*`, `*blob*`, form        | buffered variants       |
//! | no `content-type`                         | [`Body::Empty`]         |
//!
//! Buffered bodies are awaited once in full. Streaming bodies hold the
//! decoder and read nothing until polled; at most one transport chunk plus
//! one incomplete frame is held in memory at a time.
//!
//! # Status Handling
//!
//! Every response, successful or not, is wrapped in the same
//! [`ResponseEnvelope`]. A 2xx status resolves with it; any other status
//! rejects with [`Error::HttpStatus`] carrying it.
//! [`Client::fetch_settled`] returns both sides in an [`Outcome`] instead.
//!
//! # Cancellation
//!
//! A request's [`CancellationToken`](tokio_util::sync::CancellationToken)
//! races the transport call and wraps the body stream, so cancelling ends
//! a pending read with [`Error::Aborted`].

pub mod body;
pub mod classify;
pub mod client;
pub mod config;
pub mod decode;
mod error;
pub mod event_source;
mod header;
pub mod parse;
pub mod request;
pub mod response;
pub mod transport;
mod utf8;

pub use body::{BodyStream, ByteStream, Cancellable, Fragments};
pub use classify::{classify, ResponseType};
pub use client::Client;
pub use config::{ClientConfig, EventSourceConfig};
pub use decode::{ChunkRecord, ChunkStream, Payload, SseEvent, SseStream};
pub use error::{BoxError, Error, Result};
pub use event_source::{ConnectionState, EventSource, ReadyState, SourceEvent};
pub use header::{Header, HeaderAccess, HeaderMap};
pub use request::{Auth, RequestBody, RequestDebug, RequestOptions};
pub use response::{Body, Outcome, ResponseEnvelope, ResponseHead};
pub use transport::{HyperTransport, Transport, TransportResponse};
pub use utf8::Utf8Decoder;

pub use http::Method;
pub use tokio_util::sync::CancellationToken;
