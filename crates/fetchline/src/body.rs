//! Response body streams.
//!
//! Every transport hands its body over as a [`ByteStream`]. This module
//! provides the cancellation wrapper that ties a body reader to the
//! request's [`CancellationToken`], the zero-copy [`Fragments`] splitter
//! that replays a buffered body in pieces, and the full-body collector used
//! by the buffering parsers.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::Error;

/// A type-erased, fallible async stream of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// A [`ByteStream`] that is also `Sync`.
///
/// Bodies travel inside [`Error::HttpStatus`], which must be `Sync` to
/// cross `anyhow` and thread boundaries. Polling takes `&mut self`, so the
/// mutex is never locked.
pub struct BodyStream {
    inner: Mutex<ByteStream>,
}

impl BodyStream {
    pub fn new(stream: ByteStream) -> Self {
        Self {
            inner: Mutex::new(stream),
        }
    }

    pub fn into_inner(self) -> ByteStream {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl From<ByteStream> for BodyStream {
    fn from(stream: ByteStream) -> Self {
        Self::new(stream)
    }
}

impl Stream for BodyStream {
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let inner = self.get_mut().inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        inner.as_mut().poll_next(cx)
    }
}

/// Ends a body stream with [`Error::Aborted`] once its token is cancelled.
///
/// A consumer suspended on "read next chunk" is woken by the cancellation
/// and gets the error instead of hanging on a stalled transport. After the
/// first error or the end of the inner stream, the inner stream is dropped
/// and every later poll returns `None`.
pub struct Cancellable {
    inner: Option<ByteStream>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl Cancellable {
    pub fn new(inner: ByteStream, token: CancellationToken) -> Self {
        Self {
            inner: Some(inner),
            cancelled: Box::pin(token.cancelled_owned()),
        }
    }
}

impl Stream for Cancellable {
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        if this.cancelled.as_mut().poll(cx).is_ready() {
            this.inner = None;
            return Poll::Ready(Some(Err(Error::Aborted)));
        }

        match inner.as_mut().poll_next(cx) {
            Poll::Ready(None) => {
                this.inner = None;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                this.inner = None;
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }
}

/// A buffered body cut into fixed-size fragments.
///
/// Fragments are `Bytes::slice` views into the one allocation. The cuts
/// ignore UTF-8 and frame boundaries, the same way network reads do.
#[derive(Debug, Clone)]
pub struct Fragments {
    body: Bytes,
    size: usize,
    offset: usize,
}

impl Fragments {
    pub fn new(body: impl Into<Bytes>, size: usize) -> Self {
        assert!(size > 0, "fragment size must be non-zero");
        Self {
            body: body.into(),
            size,
            offset: 0,
        }
    }

    pub fn into_stream(self) -> ByteStream {
        Box::pin(futures_util::stream::iter(self.map(Ok)))
    }
}

impl Iterator for Fragments {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.offset >= self.body.len() {
            return None;
        }
        let end = (self.offset + self.size).min(self.body.len());
        let fragment = self.body.slice(self.offset..end);
        self.offset = end;
        Some(fragment)
    }
}

/// Poll a body stream to completion and concatenate all chunks.
pub(crate) async fn collect_bytes(mut stream: ByteStream) -> Result<Bytes, Error> {
    let mut collected = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        collected.extend_from_slice(&chunk?);
    }
    Ok(collected.freeze())
}
