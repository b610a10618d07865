//! Plain HTTP/1.1 transport over hyper's pooled legacy client.

use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use super::{canonical_reason, Transport, TransportFuture, TransportResponse};
use crate::header::HeaderMap;
use crate::request::PreparedRequest;
use crate::Error;

/// Transport backed by `hyper_util`'s connection-pooling client.
///
/// TLS is not configured; `https` URLs fail at connect time.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new() -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    async fn execute(&self, request: PreparedRequest) -> Result<TransportResponse, Error> {
        let uri: http::Uri = request
            .url
            .parse()
            .map_err(|e| Error::InvalidRequest(format!("invalid url {}: {e}", request.url)))?;

        let mut builder = http::Request::builder()
            .method(request.method.clone())
            .uri(uri);
        for header in request.headers.iter() {
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }
        let req = builder
            .body(Full::new(request.body.unwrap_or_default()))
            .map_err(|e| Error::InvalidRequest(e.to_string()))?;

        debug!(method = %request.method, url = %request.url, "sending request");
        let resp = self.client.request(req).await.map_err(|e| {
            debug!(error = %e, url = %request.url, "request failed");
            Error::Transport(e.to_string())
        })?;

        let status = resp.status();
        // Prefer the reason phrase the server actually sent.
        let status_text = resp
            .extensions()
            .get::<hyper::ext::ReasonPhrase>()
            .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
            .unwrap_or_else(|| canonical_reason(status.as_u16()));
        let headers = HeaderMap::from(resp.headers());
        debug!(status = status.as_u16(), url = %request.url, "response head received");

        let body = resp
            .into_body()
            .into_data_stream()
            .map_err(|e| Error::StreamRead(e.to_string()));

        Ok(TransportResponse {
            url: request.url,
            status: status.as_u16(),
            status_text,
            headers,
            body: Box::pin(body),
        })
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    fn send(&self, request: PreparedRequest) -> TransportFuture<'_> {
        Box::pin(self.execute(request))
    }
}
