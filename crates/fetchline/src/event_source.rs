//! Reconnecting Server-Sent Events client.
//!
//! [`ConnectionState`] is the pure state machine:
//!
//! ```text
//! Connecting -> Open -> (Reconnecting(delay) -> Connecting)* -> Closed
//! ```
//!
//! [`EventSource`] drives it from a single loop that owns the connection,
//! the decoder, and the reconnect timer, and hands the results out as a
//! `Stream` of [`SourceEvent`]s.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::config::EventSourceConfig;
use crate::decode::{Payload, SseEvent, SseStream};
use crate::request::RequestOptions;
use crate::response::Body;
use crate::Error;

/// Connection lifecycle, as observed from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    /// Waiting out the given delay before the next attempt.
    Reconnecting(Duration),
    Closed,
}

/// What an [`EventSource`] yields.
#[derive(Debug)]
pub enum SourceEvent {
    /// A connection was established.
    Open,
    Event(SseEvent),
    /// A connection attempt or read failed. Followed by a reconnect unless
    /// the failure is permanent.
    Error(Error),
    /// The server sent its `close` event; the source is done.
    Close(Payload),
}

/// Reconnect bookkeeping with exponential backoff.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    state: ReadyState,
    retry: Duration,
    backoff: Duration,
    max_backoff: Duration,
    failures: u32,
}

impl ConnectionState {
    pub fn new(config: &EventSourceConfig) -> Self {
        Self::with_retry(config.retry(), config.max_backoff())
    }

    pub fn with_retry(retry: Duration, max_backoff: Duration) -> Self {
        Self {
            state: ReadyState::Connecting,
            retry,
            backoff: retry.min(max_backoff),
            max_backoff,
            failures: 0,
        }
    }

    pub fn state(&self) -> ReadyState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ReadyState::Closed
    }

    /// Consecutive failures since the last successful open.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Delay the next failure will wait before reconnecting.
    pub fn next_backoff(&self) -> Duration {
        self.backoff
    }

    pub fn on_open(&mut self) {
        if self.is_closed() {
            return;
        }
        self.state = ReadyState::Open;
        self.failures = 0;
        self.backoff = self.retry.min(self.max_backoff);
    }

    /// Record a failed attempt or a dropped connection and return the delay
    /// before the next attempt.
    pub fn on_failure(&mut self) -> Duration {
        if self.is_closed() {
            return Duration::ZERO;
        }
        let delay = self.backoff;
        self.failures += 1;
        self.backoff = (self.backoff * 2).min(self.max_backoff);
        self.state = ReadyState::Reconnecting(delay);
        delay
    }

    /// The reconnect delay has elapsed.
    pub fn on_delay_elapsed(&mut self) {
        if matches!(self.state, ReadyState::Reconnecting(_)) {
            self.state = ReadyState::Connecting;
        }
    }

    /// Apply a server-sent `retry:` value. It becomes the new base delay.
    pub fn set_retry(&mut self, retry: Duration) {
        self.retry = retry;
        if self.failures == 0 {
            self.backoff = retry.min(self.max_backoff);
        }
    }

    pub fn close(&mut self) {
        self.state = ReadyState::Closed;
    }
}

/// A reconnecting SSE subscription.
///
/// Nothing is sent until the stream is first polled. The stream ends after
/// a `close` event, a permanent error, a clean end of the response body, or
/// [`close`](Self::close).
pub struct EventSource {
    url: String,
    events: Pin<Box<dyn Stream<Item = SourceEvent> + Send>>,
    token: CancellationToken,
    state: watch::Receiver<ReadyState>,
}

impl EventSource {
    pub fn new(client: Client, url: &str, mut options: RequestOptions) -> Self {
        let token = options
            .cancel
            .take()
            .map(|parent| parent.child_token())
            .unwrap_or_else(CancellationToken::new);
        let conn = ConnectionState::new(&client.config().event_source);
        let (state_tx, state) = watch::channel(conn.state());

        let driver = Driver {
            client,
            url: url.to_string(),
            options,
            conn,
            token: token.clone(),
            events: None,
            last_event_id: None,
            state_tx,
        };
        let events = futures_util::stream::unfold(driver, |mut driver| async move {
            let event = driver.next_event().await?;
            Some((event, driver))
        });

        Self {
            url: url.to_string(),
            events: Box::pin(events),
            token,
            state,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn ready_state(&self) -> ReadyState {
        if self.token.is_cancelled() {
            return ReadyState::Closed;
        }
        *self.state.borrow()
    }

    /// Stop the subscription. A pending read or reconnect delay is
    /// interrupted and the stream ends.
    pub fn close(&self) {
        self.token.cancel();
    }
}

impl Stream for EventSource {
    type Item = SourceEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("url", &self.url)
            .field("state", &self.ready_state())
            .finish_non_exhaustive()
    }
}

struct Driver {
    client: Client,
    url: String,
    options: RequestOptions,
    conn: ConnectionState,
    token: CancellationToken,
    events: Option<SseStream>,
    last_event_id: Option<String>,
    state_tx: watch::Sender<ReadyState>,
}

impl Driver {
    async fn next_event(&mut self) -> Option<SourceEvent> {
        loop {
            if self.token.is_cancelled() {
                self.shut_down();
                return None;
            }

            match self.conn.state() {
                ReadyState::Closed => return None,
                ReadyState::Reconnecting(delay) => {
                    tokio::select! {
                        _ = self.token.cancelled() => {
                            self.shut_down();
                            return None;
                        }
                        _ = tokio::time::sleep(delay) => {
                            self.conn.on_delay_elapsed();
                            self.publish();
                        }
                    }
                }
                ReadyState::Connecting => {
                    let options = self.request_options();
                    debug!(
                        url = %self.url,
                        attempt = self.conn.failures() + 1,
                        "event source connecting"
                    );
                    match connect(&self.client, &self.url, options).await {
                        Ok(events) => {
                            self.events = Some(events);
                            self.conn.on_open();
                            self.publish();
                            info!(url = %self.url, "event source open");
                            return Some(SourceEvent::Open);
                        }
                        Err(Error::Aborted) => {
                            self.shut_down();
                            return None;
                        }
                        Err(e) if is_permanent(&e) => {
                            warn!(error = %e, url = %self.url, "event source closed");
                            self.shut_down();
                            return Some(SourceEvent::Error(e));
                        }
                        Err(e) => return Some(self.fail(e)),
                    }
                }
                ReadyState::Open => {
                    let Some(events) = self.events.as_mut() else {
                        self.conn.on_failure();
                        self.publish();
                        continue;
                    };
                    match events.next().await {
                        Some(Ok(event)) => return Some(self.deliver(event)),
                        Some(Err(Error::Aborted)) => {
                            self.shut_down();
                            return None;
                        }
                        Some(Err(e)) => return Some(self.fail(e)),
                        None => {
                            debug!(url = %self.url, "event stream ended");
                            self.shut_down();
                            return None;
                        }
                    }
                }
            }
        }
    }

    fn request_options(&self) -> RequestOptions {
        let mut options = self.options.clone();
        options.cancel = Some(self.token.clone());
        options.raw_response = false;
        options.headers.set("accept", "text/event-stream");
        options.headers.set("cache-control", "no-cache");
        if let Some(id) = &self.last_event_id {
            options.headers.set("last-event-id", id.as_str());
        }
        options
    }

    fn deliver(&mut self, event: SseEvent) -> SourceEvent {
        if let Some(id) = &event.id {
            self.last_event_id = Some(id.clone());
        }
        if let Some(retry) = event.retry {
            self.conn.set_retry(Duration::from_millis(retry));
        }
        if event.is_close() {
            debug!(url = %self.url, "event source received close");
            self.shut_down();
            return SourceEvent::Close(event.data);
        }
        SourceEvent::Event(event)
    }

    fn fail(&mut self, error: Error) -> SourceEvent {
        self.events = None;
        let delay = self.conn.on_failure();
        self.publish();
        warn!(
            error = %error,
            url = %self.url,
            delay_ms = delay.as_millis() as u64,
            "event source reconnecting"
        );
        SourceEvent::Error(error)
    }

    fn shut_down(&mut self) {
        self.events = None;
        self.conn.close();
        self.publish();
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.conn.state());
    }
}

async fn connect(client: &Client, url: &str, options: RequestOptions) -> Result<SseStream, Error> {
    let envelope = client.fetch(url, options).await?;
    let content_type = envelope.headers.get("content-type").cloned();
    match envelope.body {
        Body::Events(events) => Ok(events),
        _ => Err(Error::UnsupportedContentType(content_type.unwrap_or_default())),
    }
}

/// Failures that reconnecting cannot fix.
fn is_permanent(error: &Error) -> bool {
    !matches!(
        error,
        Error::Transport(_) | Error::StreamRead(_) | Error::Timeout(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockResponse, MockTransport};
    use serde_json::json;
    use std::sync::Arc;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn source(mock: &Arc<MockTransport>) -> EventSource {
        Client::with_transport(mock.clone())
            .event_source("http://api.test/events", RequestOptions::new())
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut conn = ConnectionState::with_retry(secs(3), secs(60));
        assert_eq!(conn.state(), ReadyState::Connecting);

        let delays: Vec<_> = (0..7).map(|_| conn.on_failure()).collect();
        assert_eq!(
            delays,
            vec![secs(3), secs(6), secs(12), secs(24), secs(48), secs(60), secs(60)]
        );
        assert_eq!(conn.state(), ReadyState::Reconnecting(secs(60)));
        assert_eq!(conn.failures(), 7);
    }

    #[test]
    fn open_resets_backoff() {
        let mut conn = ConnectionState::with_retry(secs(3), secs(60));
        conn.on_failure();
        conn.on_failure();
        conn.on_delay_elapsed();
        assert_eq!(conn.state(), ReadyState::Connecting);

        conn.on_open();
        assert_eq!(conn.state(), ReadyState::Open);
        assert_eq!(conn.failures(), 0);
        assert_eq!(conn.next_backoff(), secs(3));
    }

    #[test]
    fn server_retry_replaces_base() {
        let mut conn = ConnectionState::with_retry(secs(3), secs(60));
        conn.on_open();
        conn.set_retry(Duration::from_millis(500));
        assert_eq!(conn.on_failure(), Duration::from_millis(500));
        assert_eq!(conn.on_failure(), Duration::from_millis(1000));

        conn.on_delay_elapsed();
        conn.on_open();
        assert_eq!(conn.next_backoff(), Duration::from_millis(500));
    }

    #[test]
    fn closed_is_terminal() {
        let mut conn = ConnectionState::new(&EventSourceConfig::default());
        conn.close();
        conn.on_open();
        assert_eq!(conn.on_failure(), Duration::ZERO);
        conn.on_delay_elapsed();
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn delivers_events_until_close() {
        let mock = Arc::new(MockTransport::new());
        mock.push(MockResponse::sse([
            "data: {\"n\":1}\n\n",
            "event: status\ndata: busy\n\n",
            "event: close\ndata: {\"reason\":\"done\"}\n\n",
            "data: never\n\n",
        ]));

        let events: Vec<_> = source(&mock).collect().await;
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], SourceEvent::Open));
        match &events[1] {
            SourceEvent::Event(e) => assert_eq!(e.data.as_json(), Some(&json!({"n": 1}))),
            other => panic!("unexpected {other:?}"),
        }
        match &events[2] {
            SourceEvent::Event(e) => {
                assert_eq!(e.event, "status");
                assert_eq!(e.data.as_raw(), Some("busy"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &events[3] {
            SourceEvent::Close(data) => assert_eq!(data.as_json(), Some(&json!({"reason": "done"}))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connection_failure_reconnects_after_backoff() {
        let mock = Arc::new(MockTransport::new());
        mock.push_failure("connection refused");
        mock.push(MockResponse::sse(["data: 1\n\n", "event: close\n\n"]));

        let mut es = source(&mock);
        let start = tokio::time::Instant::now();

        assert!(matches!(es.next().await, Some(SourceEvent::Error(Error::Transport(_)))));
        assert_eq!(es.ready_state(), ReadyState::Reconnecting(secs(3)));
        assert!(matches!(es.next().await, Some(SourceEvent::Open)));
        assert!(start.elapsed() >= secs(3));
        assert_eq!(es.ready_state(), ReadyState::Open);
        assert!(matches!(es.next().await, Some(SourceEvent::Event(_))));
        assert!(matches!(es.next().await, Some(SourceEvent::Close(_))));
        assert!(es.next().await.is_none());
        assert_eq!(es.ready_state(), ReadyState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn read_error_reconnects_with_last_event_id() {
        let mock = Arc::new(MockTransport::new());
        mock.push(MockResponse::sse(["id: 41\ndata: a\n\n"]).read_error("connection reset"));
        mock.push(MockResponse::sse(["id: 42\ndata: b\n\n", "event: close\n\n"]));

        let mut es = source(&mock);
        assert!(matches!(es.next().await, Some(SourceEvent::Open)));
        assert!(matches!(es.next().await, Some(SourceEvent::Event(_))));
        assert!(matches!(es.next().await, Some(SourceEvent::Error(Error::StreamRead(_)))));
        assert!(matches!(es.next().await, Some(SourceEvent::Open)));

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].headers.get("last-event-id"), None);
        assert_eq!(requests[1].headers.get("last-event-id"), Some("41"));
        assert_eq!(requests[1].headers.get("accept"), Some("text/event-stream"));
    }

    #[tokio::test(start_paused = true)]
    async fn server_retry_sets_reconnect_delay() {
        let mock = Arc::new(MockTransport::new());
        mock.push(MockResponse::sse(["retry: 250\ndata: a\n\n"]).read_error("reset"));
        mock.push(MockResponse::sse(["event: close\n\n"]));

        let mut es = source(&mock);
        assert!(matches!(es.next().await, Some(SourceEvent::Open)));
        assert!(matches!(es.next().await, Some(SourceEvent::Event(_))));
        assert!(matches!(es.next().await, Some(SourceEvent::Error(_))));
        assert_eq!(
            es.ready_state(),
            ReadyState::Reconnecting(Duration::from_millis(250))
        );
    }

    #[tokio::test]
    async fn http_error_closes_permanently() {
        let mock = Arc::new(MockTransport::new());
        mock.push(MockResponse::json(404, &json!({"message": "gone"})));
        mock.push(MockResponse::sse(["data: unreachable\n\n"]));

        let events: Vec<_> = source(&mock).collect().await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            SourceEvent::Error(e) => assert_eq!(e.status(), Some(404)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(mock.remaining(), 1);
    }

    #[tokio::test]
    async fn non_sse_response_closes_permanently() {
        let mock = Arc::new(MockTransport::new());
        mock.push(MockResponse::json(200, &json!({"ok": true})));

        let events: Vec<_> = source(&mock).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            SourceEvent::Error(Error::UnsupportedContentType(ref ct)) if ct == "application/json"
        ));
    }

    #[tokio::test]
    async fn clean_end_does_not_reconnect() {
        let mock = Arc::new(MockTransport::new());
        mock.push(MockResponse::sse(["data: only\n\n"]));
        mock.push(MockResponse::sse(["data: unreachable\n\n"]));

        let events: Vec<_> = source(&mock).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(mock.remaining(), 1);
    }

    #[tokio::test]
    async fn close_interrupts_pending_read() {
        let mock = Arc::new(MockTransport::new());
        mock.push(MockResponse::sse(["data: first\n\n"]).stall());

        let mut es = source(&mock);
        assert!(matches!(es.next().await, Some(SourceEvent::Open)));
        assert!(matches!(es.next().await, Some(SourceEvent::Event(_))));

        es.close();
        assert_eq!(es.ready_state(), ReadyState::Closed);
        assert!(es.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn close_interrupts_reconnect_delay() {
        let mock = Arc::new(MockTransport::new());
        mock.push_failure("refused");

        let mut es = source(&mock);
        assert!(matches!(es.next().await, Some(SourceEvent::Error(_))));
        es.close();
        assert!(es.next().await.is_none());
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn parent_token_cancels_source() {
        let mock = Arc::new(MockTransport::new());
        mock.push_hang();
        let parent = CancellationToken::new();

        let mut es = Client::with_transport(mock.clone()).event_source(
            "http://api.test/events",
            RequestOptions::new().cancel_token(parent.clone()),
        );
        let cancel = parent.clone();
        tokio::spawn(async move { cancel.cancel() });
        assert!(es.next().await.is_none());
    }
}
