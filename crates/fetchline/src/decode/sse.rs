//! Server-Sent Events decoding.
//!
//! Frames are separated by a blank line (`\n\n`). Each frame holds
//! `field: value` lines; `event`, `data`, `id` and `retry` are recognized,
//! lines starting with `:` are comments, and anything else is ignored.
//! Several `data:` lines in one frame are joined with `\n`.
//!
//! An `event: close` frame is an application-level end-of-stream signal:
//! it is emitted, then the stream ends and drops the transport reader even
//! if the connection is still open.

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures_core::Stream;
use tracing::{debug, trace};

use super::Payload;
use crate::body::{BodyStream, ByteStream};
use crate::utf8::Utf8Decoder;
use crate::Error;

/// Event name used when a frame carries no `event:` line.
pub const DEFAULT_EVENT: &str = "message";

/// Event name the producer sends as its last frame.
pub const CLOSE_EVENT: &str = "close";

/// One decoded SSE frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: String,
    pub data: Payload,
    pub id: Option<String>,
    /// Reconnection delay requested by the server, in milliseconds.
    pub retry: Option<u64>,
}

impl SseEvent {
    pub fn new(event: impl Into<String>, data: Payload) -> Self {
        Self {
            event: event.into(),
            data,
            id: None,
            retry: None,
        }
    }

    pub fn is_close(&self) -> bool {
        self.event == CLOSE_EVENT
    }
}

/// Parse one complete frame (without its terminating blank line).
///
/// Returns `None` for frames with no recognized field, such as comment
/// keep-alives.
pub fn parse_frame(frame: &str) -> Option<SseEvent> {
    let mut event: Option<&str> = None;
    let mut data: Option<String> = None;
    let mut id = None;
    let mut retry = None;
    let mut recognized = false;

    for line in frame.split('\n') {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.trim()),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value),
            "data" => match data.as_mut() {
                Some(buf) => {
                    buf.push('\n');
                    buf.push_str(value);
                }
                None => data = Some(value.to_string()),
            },
            "id" => id = Some(value.to_string()),
            "retry" => retry = value.parse::<u64>().ok(),
            _ => continue,
        }
        recognized = true;
    }

    if !recognized {
        return None;
    }

    let event = event
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_EVENT);
    Some(SseEvent {
        event: event.to_string(),
        data: data.as_deref().map(Payload::parse).unwrap_or_default(),
        id,
        retry,
    })
}

/// Push-based SSE decoder state.
///
/// The buffer never holds a complete frame after [`push`](Self::push)
/// returns: every call splits it into zero or more complete frames and one
/// trailing remainder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    utf8: Utf8Decoder,
    buffer: String,
    /// Byte offset in `buffer` before which no `\n\n` can start.
    scanned: usize,
    /// A trailing `\r` held back until the next chunk shows whether it
    /// begins a `\r\n`.
    pending_cr: bool,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return the frames it completed.
    ///
    /// After a `close` frame the decoder is done: later chunks are ignored.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        if self.done {
            return Vec::new();
        }

        let text = self.utf8.decode(chunk);
        self.append_normalized(&text);

        let mut events = Vec::new();
        let mut consumed = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.buffer[from..].find("\n\n") {
            let end = from + offset;
            let frame = &self.buffer[consumed..end];
            consumed = end + 2;
            from = consumed;

            if let Some(event) = parse_frame(frame) {
                trace!(event = %event.event, "decoded sse frame");
                let close = event.is_close();
                events.push(event);
                if close {
                    self.done = true;
                    break;
                }
            }
        }

        if self.done {
            self.buffer.clear();
            self.scanned = 0;
            self.pending_cr = false;
        } else {
            self.buffer.drain(..consumed);
            // A final '\n' may pair with the first byte of the next chunk.
            self.scanned = self.buffer.len() - usize::from(self.buffer.ends_with('\n'));
        }
        events
    }

    /// Append decoded text with `\r\n` folded to `\n`, touching only the
    /// new text and at most one held-back `\r`.
    fn append_normalized(&mut self, text: &str) {
        let mut text = text;
        if self.pending_cr {
            if text.is_empty() {
                return;
            }
            self.pending_cr = false;
            match text.strip_prefix('\n') {
                Some(rest) => {
                    self.buffer.push('\n');
                    text = rest;
                }
                None => self.buffer.push('\r'),
            }
        }
        if let Some(rest) = text.strip_suffix('\r') {
            self.pending_cr = true;
            text = rest;
        }
        if text.contains("\r\n") {
            self.buffer.push_str(&text.replace("\r\n", "\n"));
        } else {
            self.buffer.push_str(text);
        }
    }

    /// End of input. Unterminated text is discarded; returns how many
    /// bytes of text were dropped.
    pub fn finish(&mut self) -> usize {
        let dropped =
            self.buffer.len() + usize::from(self.pending_cr) + self.utf8.finish().len();
        self.buffer.clear();
        self.scanned = 0;
        self.pending_cr = false;
        self.done = true;
        dropped
    }

    /// Whether a `close` frame was seen or input has ended.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The incomplete remainder waiting for more bytes.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }
}

/// Lazy sequence of [`SseEvent`]s decoded from a byte stream.
///
/// Forward-only and not restartable. A read error is yielded once and
/// ends the sequence.
pub struct SseStream {
    inner: Option<BodyStream>,
    decoder: SseDecoder,
    ready: VecDeque<SseEvent>,
}

impl SseStream {
    pub fn new(body: ByteStream) -> Self {
        Self {
            inner: Some(BodyStream::new(body)),
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
        }
    }
}

impl fmt::Debug for SseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseStream")
            .field("open", &self.inner.is_some())
            .field("ready", &self.ready.len())
            .field("buffered", &self.decoder.buffered().len())
            .finish()
    }
}

impl Stream for SseStream {
    type Item = Result<SseEvent, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(event) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };

            match ready!(Pin::new(inner).poll_next(cx)) {
                Some(Ok(chunk)) => {
                    this.ready.extend(this.decoder.push(&chunk));
                    if this.decoder.is_done() {
                        debug!("sse close event received, releasing reader");
                        this.inner = None;
                    }
                }
                Some(Err(e)) => {
                    this.inner = None;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    let dropped = this.decoder.finish();
                    if dropped > 0 {
                        debug!(bytes = dropped, "discarding unterminated sse frame");
                    }
                    this.inner = None;
                    return Poll::Ready(None);
                }
            }
        }
    }
}
