//! Chunked-transfer body decoding.
//!
//! Each chunk delivered by the transport becomes exactly one record: the
//! chunk's text, trimmed, parsed as JSON when possible. Only the bytes of a
//! UTF-8 sequence split across two chunks are carried over.

use std::fmt;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures_core::Stream;
use tracing::debug;

use super::{ChunkRecord, Payload};
use crate::body::{BodyStream, ByteStream};
use crate::utf8::Utf8Decoder;
use crate::Error;

/// Decode one chunk's text: trim surrounding whitespace, then try JSON.
///
/// `"  42  "` becomes the number `42`; text that is not JSON is returned
/// trimmed.
pub fn decode_chunk(text: &str) -> ChunkRecord {
    Payload::parse(text.trim())
}

/// Lazy sequence of [`ChunkRecord`]s, one per transport chunk.
pub struct ChunkStream {
    inner: Option<BodyStream>,
    utf8: Utf8Decoder,
}

impl ChunkStream {
    pub fn new(body: ByteStream) -> Self {
        Self {
            inner: Some(BodyStream::new(body)),
            utf8: Utf8Decoder::new(),
        }
    }
}

impl fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkStream")
            .field("open", &self.inner.is_some())
            .finish()
    }
}

impl Stream for ChunkStream {
    type Item = Result<ChunkRecord, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match ready!(Pin::new(inner).poll_next(cx)) {
            Some(Ok(chunk)) => {
                let text = this.utf8.decode(&chunk);
                Poll::Ready(Some(Ok(decode_chunk(&text))))
            }
            Some(Err(e)) => {
                this.inner = None;
                Poll::Ready(Some(Err(e)))
            }
            None => {
                if this.utf8.pending_len() > 0 {
                    debug!(
                        bytes = this.utf8.pending_len(),
                        "chunked body ended inside a utf-8 sequence"
                    );
                }
                this.inner = None;
                Poll::Ready(None)
            }
        }
    }
}
