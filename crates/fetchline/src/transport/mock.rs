//! Scripted in-memory transport.
//!
//! Responses are queued up front and handed out in order. Bodies are
//! replayed chunk by chunk, optionally with a delay between chunks, a read
//! error at the end, or a stall that never completes. Timing uses
//! `tokio::time`, so tests on paused time run without real waiting.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tracing::trace;

use super::{canonical_reason, Transport, TransportFuture, TransportResponse};
use crate::body::{ByteStream, Fragments};
use crate::header::HeaderMap;
use crate::request::PreparedRequest;
use crate::Error;

/// A scripted response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    status_text: Option<String>,
    headers: HeaderMap,
    chunks: Vec<Bytes>,
    delay: Duration,
    read_error: Option<String>,
    stall: bool,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            status_text: None,
            headers: HeaderMap::new(),
            chunks: Vec::new(),
            delay: Duration::ZERO,
            read_error: None,
            stall: false,
        }
    }

    /// A buffered JSON response with `content-length` set.
    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status)
            .header("content-type", "application/json")
            .sized_body(value.to_string())
    }

    /// A buffered plain-text response with `content-length` set.
    pub fn text(status: u16, text: impl Into<String>) -> Self {
        Self::new(status)
            .header("content-type", "text/plain; charset=utf-8")
            .sized_body(text.into())
    }

    /// A `text/event-stream` response; each frame is written as one chunk.
    pub fn sse<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Bytes>,
    {
        Self::new(200)
            .header("content-type", "text/event-stream")
            .chunks(frames)
    }

    pub fn status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = Some(text.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn chunk(mut self, chunk: impl Into<Bytes>) -> Self {
        self.chunks.push(chunk.into());
        self
    }

    pub fn chunks<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Bytes>,
    {
        self.chunks.extend(chunks.into_iter().map(Into::into));
        self
    }

    /// Whole body as one chunk, with a matching `content-length`.
    pub fn sized_body(self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let len = body.len().to_string();
        self.header("content-length", len).chunk(body)
    }

    /// Whole body cut into `size`-byte pieces, with a matching
    /// `content-length`.
    pub fn fragmented(self, body: impl Into<Bytes>, size: usize) -> Self {
        let body = body.into();
        let len = body.len().to_string();
        self.header("content-length", len)
            .chunks(Fragments::new(body, size))
    }

    /// Wait this long before each chunk.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the body read after the last chunk.
    pub fn read_error(mut self, message: impl Into<String>) -> Self {
        self.read_error = Some(message.into());
        self
    }

    /// Never finish the body after the last chunk.
    pub fn stall(mut self) -> Self {
        self.stall = true;
        self
    }

    fn into_body(self) -> ByteStream {
        struct Replay {
            chunks: VecDeque<Bytes>,
            delay: Duration,
            read_error: Option<String>,
            stall: bool,
        }

        let replay = Replay {
            chunks: self.chunks.into(),
            delay: self.delay,
            read_error: self.read_error,
            stall: self.stall,
        };

        Box::pin(futures_util::stream::unfold(replay, |mut st| async move {
            if let Some(chunk) = st.chunks.pop_front() {
                if !st.delay.is_zero() {
                    tokio::time::sleep(st.delay).await;
                }
                return Some((Ok(chunk), st));
            }
            if let Some(message) = st.read_error.take() {
                return Some((Err(Error::StreamRead(message)), st));
            }
            if st.stall {
                std::future::pending::<()>().await;
            }
            None
        }))
    }
}

enum Reply {
    Respond(MockResponse),
    Fail(String),
    Hang,
}

/// Transport that replays queued [`MockResponse`]s and records requests.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<PreparedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: MockResponse) -> &Self {
        self.lock_replies().push_back(Reply::Respond(response));
        self
    }

    /// Queue a connection failure.
    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.lock_replies().push_back(Reply::Fail(message.into()));
        self
    }

    /// Queue a request that never gets a response head.
    pub fn push_hang(&self) -> &Self {
        self.lock_replies().push_back(Reply::Hang);
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.lock_replies().len()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Reply>> {
        self.replies.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MockTransport {
    fn send(&self, request: PreparedRequest) -> TransportFuture<'_> {
        let url = request.url.clone();
        trace!(method = %request.method, %url, "mock transport request");
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let reply = self.lock_replies().pop_front();

        Box::pin(async move {
            match reply {
                Some(Reply::Respond(response)) => Ok(TransportResponse {
                    url,
                    status: response.status,
                    status_text: response
                        .status_text
                        .clone()
                        .unwrap_or_else(|| canonical_reason(response.status)),
                    headers: response.headers.clone(),
                    body: response.into_body(),
                }),
                Some(Reply::Fail(message)) => Err(Error::Transport(message)),
                Some(Reply::Hang) => std::future::pending().await,
                None => Err(Error::Transport(format!("no scripted response for {url}"))),
            }
        })
    }
}
