//! Request shaping: options, query strings, auth headers and body encoding.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::Method;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::header::HeaderMap;
use crate::Error;

const JSON: &str = "application/json";
const FORM: &str = "application/x-www-form-urlencoded";
const TEXT: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// Credentials turned into an `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    Bearer(String),
    /// Password may be omitted, e.g. for an implicit grant.
    Basic {
        username: String,
        password: Option<String>,
    },
}

impl Auth {
    pub fn bearer(token: impl Into<String>) -> Self {
        Auth::Bearer(token.into())
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Auth::Basic {
            username: username.into(),
            password: Some(password.into()),
        }
    }

    /// The `Authorization` header value.
    pub fn header_value(&self) -> Result<String, Error> {
        match self {
            Auth::Bearer(token) => Ok(format!("Bearer {token}")),
            Auth::Basic { username, password } => {
                if username.is_empty() {
                    return Err(Error::InvalidRequest(
                        "basic authentication requires a username".into(),
                    ));
                }
                let credentials = format!("{username}:{}", password.as_deref().unwrap_or(""));
                Ok(format!("Basic {}", STANDARD.encode(credentials)))
            }
        }
    }
}

/// A request body before encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Form(Vec<(String, String)>),
    Text(String),
    Bytes(Bytes),
}

impl RequestBody {
    /// Content-type implied by the body's shape.
    fn content_type(&self) -> &'static str {
        match self {
            RequestBody::Json(_) => JSON,
            RequestBody::Form(_) => FORM,
            RequestBody::Text(_) => TEXT,
            RequestBody::Bytes(_) => OCTET_STREAM,
        }
    }
}

/// Per-call request options.
///
/// Options are plain values; nothing here is shared between requests.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    /// Query pairs appended to the URL in insertion order.
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub auth: Option<Auth>,
    /// Attach the prepared request to the response envelope.
    pub debug: bool,
    /// Skip classification and status checks; hand back the raw byte stream.
    pub raw_response: bool,
    /// Aborts the request and any body stream it produced.
    pub cancel: Option<CancellationToken>,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append several query pairs at once.
    pub fn queries<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    pub fn form<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let pairs = pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.body = Some(RequestBody::Form(pairs));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(text.into()));
        self
    }

    pub fn bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = Some(RequestBody::Bytes(bytes.into()));
        self
    }

    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn bearer(self, token: impl Into<String>) -> Self {
        self.auth(Auth::bearer(token))
    }

    pub fn basic(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth(Auth::basic(username, password))
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn raw_response(mut self) -> Self {
        self.raw_response = true;
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// The final `{url, method, headers, body}` handed to a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl PreparedRequest {
    pub fn debug_info(&self) -> RequestDebug {
        RequestDebug {
            method: self.method.to_string(),
            url: self.url.clone(),
            headers: self.headers.to_flat_map(),
            body: self
                .body
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).into_owned()),
        }
    }
}

/// Snapshot of a prepared request, attached to envelopes in debug mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestDebug {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

/// Build the transport request from a URL, client default headers and
/// per-call options.
pub fn prepare(
    url: &str,
    defaults: &HeaderMap,
    options: &RequestOptions,
) -> Result<PreparedRequest, Error> {
    let method = options.method.clone();
    let url = append_query(url, &options.query)?;
    let mut headers = defaults.merged(&options.headers);

    // GET stays simple and OPTIONS preflights keep the caller's headers.
    if method != Method::GET && method != Method::OPTIONS && !headers.contains("content-type") {
        let inferred = options
            .body
            .as_ref()
            .map(RequestBody::content_type)
            .unwrap_or(JSON);
        headers.set("content-type", inferred);
    }

    if let Some(auth) = &options.auth {
        headers.set("authorization", auth.header_value()?);
    }

    let body = match (&options.body, headers.get("content-type")) {
        _ if method == Method::GET => None,
        (None, _) | (_, None) => None,
        (Some(body), Some(content_type)) => Some(encode_body(body, content_type)?),
    };

    Ok(PreparedRequest {
        method,
        url,
        headers,
        body,
    })
}

/// Append URL-encoded query pairs to `url`.
pub fn append_query(url: &str, query: &[(String, String)]) -> Result<String, Error> {
    if query.is_empty() {
        return Ok(url.to_string());
    }
    let mut parsed =
        Url::parse(url).map_err(|e| Error::InvalidRequest(format!("invalid url {url}: {e}")))?;
    parsed.query_pairs_mut().extend_pairs(query);
    Ok(parsed.to_string())
}

/// Join a base URL and a path with exactly one `/` between them.
pub fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

fn encode_body(body: &RequestBody, content_type: &str) -> Result<Bytes, Error> {
    let content_type = content_type.to_ascii_lowercase();
    if content_type.contains("x-www-form-urlencoded") {
        return Ok(Bytes::from(encode_form(body)?));
    }
    if content_type.contains("json") {
        return match body {
            RequestBody::Json(value) => to_json(value),
            RequestBody::Form(pairs) => {
                let object: serde_json::Map<String, Value> = pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                to_json(&Value::Object(object))
            }
            // Text is taken as already-serialized JSON.
            RequestBody::Text(text) => Ok(Bytes::from(text.clone())),
            RequestBody::Bytes(bytes) => Ok(bytes.clone()),
        };
    }
    match body {
        RequestBody::Json(value) => to_json(value),
        RequestBody::Form(_) => Ok(Bytes::from(encode_form(body)?)),
        RequestBody::Text(text) => Ok(Bytes::from(text.clone())),
        RequestBody::Bytes(bytes) => Ok(bytes.clone()),
    }
}

fn to_json(value: &Value) -> Result<Bytes, Error> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| Error::InvalidRequest(format!("cannot serialize json body: {e}")))
}

fn encode_form(body: &RequestBody) -> Result<String, Error> {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    match body {
        RequestBody::Form(pairs) => {
            serializer.extend_pairs(pairs);
        }
        RequestBody::Json(Value::Object(object)) => {
            for (key, value) in object {
                match value {
                    Value::String(s) => serializer.append_pair(key, s),
                    other => serializer.append_pair(key, &other.to_string()),
                };
            }
        }
        RequestBody::Text(text) => return Ok(text.clone()),
        RequestBody::Json(_) | RequestBody::Bytes(_) => {
            return Err(Error::InvalidRequest(
                "form-encoded bodies need key/value pairs or a flat json object".into(),
            ));
        }
    }
    Ok(serializer.finish())
}
