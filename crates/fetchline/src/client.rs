//! The request client.
//!
//! A [`Client`] pairs a [`Transport`] with immutable [`ClientConfig`]
//! defaults. Each call prepares the request, races the transport against
//! the request's cancellation token and optional timeout, then classifies
//! and reads the body into a [`ResponseEnvelope`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::body::{BodyStream, ByteStream, Cancellable};
use crate::classify::classify;
use crate::config::ClientConfig;
use crate::event_source::EventSource;
use crate::header::HeaderMap;
use crate::parse::read_body;
use crate::request::{join_url, prepare, PreparedRequest, RequestOptions};
use crate::response::{Body, Outcome, ResponseEnvelope};
use crate::transport::{HyperTransport, Transport, TransportResponse};
use crate::Error;

/// Cheap to clone; clones share the transport and configuration.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    config: Arc<ClientConfig>,
    default_headers: Arc<HeaderMap>,
}

impl Client {
    /// A client over plain HTTP/1.1 with default configuration.
    pub fn new() -> Self {
        Self::from_config(ClientConfig::default())
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self::with_transport(Arc::new(HyperTransport::new())).with_config(config)
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: Arc::new(ClientConfig::default()),
            default_headers: Arc::new(HeaderMap::new()),
        }
    }

    /// Replace the configuration, keeping the transport.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.default_headers = Arc::new(config.default_headers());
        self.config = Arc::new(config);
        self
    }

    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        let config = (*self.config).clone().with_base_url(base_url);
        self.with_config(config)
    }

    /// A new client sharing this one's transport and defaults that
    /// resolves relative paths against `base_url`.
    pub fn create(&self, base_url: impl Into<String>) -> Self {
        self.clone().with_base_url(base_url)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Resolve `url` against the configured base URL. Absolute URLs pass
    /// through unchanged; anything that does not parse on its own is a path.
    pub fn resolve_url(&self, url: &str) -> String {
        match &self.config.base_url {
            Some(base) if Url::parse(url).is_err() => join_url(base, url),
            _ => url.to_string(),
        }
    }

    /// Send a request and read its response.
    ///
    /// Resolves with the envelope on 2xx. Any other status rejects with
    /// [`Error::HttpStatus`] carrying the same envelope.
    pub async fn fetch(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<ResponseEnvelope, Error> {
        let url = self.resolve_url(url);
        let prepared = prepare(&url, &self.default_headers, &options)?;
        let debug_info = options.debug.then(|| prepared.debug_info());
        let token = options.cancel.clone().unwrap_or_else(CancellationToken::new);
        let timeout = options.timeout.or_else(|| self.config.timeout());

        debug!(method = %prepared.method, url = %prepared.url, "sending request");
        let response = self.send(prepared, &token, timeout).await?;
        let (head, body) = response.into_parts();
        let body: ByteStream = Box::pin(Cancellable::new(body, token));
        debug!(status = head.status, url = %head.url, "response received");

        let envelope = if options.raw_response {
            ResponseEnvelope::new(Body::Stream(BodyStream::new(body)), head)
        } else {
            let kind = classify(&head.headers)?;
            let body = read_body(kind, head.status, body).await?;
            ResponseEnvelope::new(body, head)
        };
        let envelope = match debug_info {
            Some(info) => envelope.with_debug(info),
            None => envelope,
        };

        if options.raw_response {
            return Ok(envelope);
        }
        if !envelope.is_success() {
            warn!(
                status = envelope.status,
                url = %envelope.response.url,
                "request failed"
            );
        }
        envelope.into_result()
    }

    /// Like [`fetch`](Self::fetch), but never rejects: the result and the
    /// error come back side by side.
    pub async fn fetch_settled(&self, url: &str, options: RequestOptions) -> Outcome {
        self.fetch(url, options).await.into()
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<ResponseEnvelope, Error> {
        self.fetch(url, options.method(Method::GET)).await
    }

    pub async fn post(&self, url: &str, options: RequestOptions) -> Result<ResponseEnvelope, Error> {
        self.fetch(url, options.method(Method::POST)).await
    }

    pub async fn put(&self, url: &str, options: RequestOptions) -> Result<ResponseEnvelope, Error> {
        self.fetch(url, options.method(Method::PUT)).await
    }

    pub async fn patch(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<ResponseEnvelope, Error> {
        self.fetch(url, options.method(Method::PATCH)).await
    }

    pub async fn delete(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<ResponseEnvelope, Error> {
        self.fetch(url, options.method(Method::DELETE)).await
    }

    /// Open a reconnecting event source on `url`.
    pub fn event_source(&self, url: &str, options: RequestOptions) -> EventSource {
        EventSource::new(self.clone(), url, options)
    }

    async fn send(
        &self,
        request: PreparedRequest,
        token: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<TransportResponse, Error> {
        let call = self.transport.send(request);
        let call = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, call)
                    .await
                    .map_err(|_| Error::Timeout(limit))?,
                None => call.await,
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("request aborted before response");
                Err(Error::Aborted)
            }
            result = call => result,
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
