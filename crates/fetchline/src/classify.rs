//! Response type classification.
//!
//! Picks how a response body is interpreted from its headers alone. The
//! order of checks matters: an SSE response also advertises a text
//! content-type, and a chunked or unknown-length response may carry any
//! nominal content-type, so the streaming checks run before the
//! substring matches.

use std::fmt;

use crate::header::HeaderAccess;
use crate::Error;

/// How a response body is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    Json,
    Text,
    Blob,
    FormData,
    Sse,
    Chunked,
    Stream,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Json => "json",
            ResponseType::Text => "text",
            ResponseType::Blob => "blob",
            ResponseType::FormData => "formData",
            ResponseType::Sse => "sse",
            ResponseType::Chunked => "chunked",
            ResponseType::Stream => "stream",
        }
    }

    /// Whether the body is handed out lazily instead of awaited in full.
    pub fn is_streaming(&self) -> bool {
        matches!(
            self,
            ResponseType::Sse | ResponseType::Chunked | ResponseType::Stream
        )
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a response by its headers.
///
/// Returns `Ok(None)` when there is no content-type (e.g. 204 No Content);
/// the caller treats that as an empty body.
pub fn classify(headers: &impl HeaderAccess) -> Result<Option<ResponseType>, Error> {
    let Some(content_type) = headers.header("content-type") else {
        return Ok(None);
    };

    if is_event_stream(content_type) {
        return Ok(Some(ResponseType::Sse));
    }

    if headers
        .header("transfer-encoding")
        .is_some_and(is_chunked)
    {
        return Ok(Some(ResponseType::Chunked));
    }

    if headers.header("content-length").is_none() {
        return Ok(Some(ResponseType::Stream));
    }

    let lowered = content_type.to_ascii_lowercase();
    if lowered.contains("json") {
        return Ok(Some(ResponseType::Json));
    }
    if lowered.contains("text") {
        return Ok(Some(ResponseType::Text));
    }
    if lowered.contains("blob") || lowered.contains("image") || lowered.contains("octet-stream") {
        return Ok(Some(ResponseType::Blob));
    }
    if lowered.contains("x-www-form-urlencoded") {
        return Ok(Some(ResponseType::FormData));
    }

    Err(Error::UnsupportedContentType(content_type.to_string()))
}

/// `text/event-stream`, ignoring parameters such as `; charset=utf-8`.
fn is_event_stream(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("text/event-stream"))
}

/// Whether a `Transfer-Encoding` value lists the `chunked` coding.
fn is_chunked(transfer_encoding: &str) -> bool {
    transfer_encoding
        .split(',')
        .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderMap;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn no_content_type_is_none() {
        assert_eq!(classify(&HeaderMap::new()).unwrap(), None);
        let h = headers(&[("content-length", "0")]);
        assert_eq!(classify(&h).unwrap(), None);
    }

    #[test]
    fn event_stream_wins_over_everything() {
        for extra in [
            vec![],
            vec![("content-length", "120")],
            vec![("transfer-encoding", "chunked")],
            vec![("transfer-encoding", "chunked"), ("content-length", "5")],
        ] {
            let mut h = headers(&[("content-type", "text/event-stream")]);
            for (n, v) in extra {
                h.insert(n, v);
            }
            assert_eq!(classify(&h).unwrap(), Some(ResponseType::Sse));
        }
    }

    #[test]
    fn event_stream_with_parameters() {
        let h = headers(&[("Content-Type", "Text/Event-Stream; charset=utf-8")]);
        assert_eq!(classify(&h).unwrap(), Some(ResponseType::Sse));
    }

    #[test]
    fn chunked_beats_content_type() {
        for ct in ["application/json", "text/plain", "application/x-unknown"] {
            let h = headers(&[("content-type", ct), ("Transfer-Encoding", "gzip, chunked")]);
            assert_eq!(classify(&h).unwrap(), Some(ResponseType::Chunked), "{ct}");
        }
    }

    #[test]
    fn missing_length_is_stream() {
        let h = headers(&[("content-type", "application/json")]);
        assert_eq!(classify(&h).unwrap(), Some(ResponseType::Stream));
    }

    #[test]
    fn buffered_types_by_substring() {
        let cases = [
            ("application/json; charset=utf-8", ResponseType::Json),
            ("application/problem+json", ResponseType::Json),
            ("text/html", ResponseType::Text),
            ("text/plain", ResponseType::Text),
            ("application/blob", ResponseType::Blob),
            ("image/png", ResponseType::Blob),
            ("application/octet-stream", ResponseType::Blob),
            ("application/x-www-form-urlencoded", ResponseType::FormData),
        ];
        for (ct, expected) in cases {
            let h = headers(&[("content-type", ct), ("content-length", "10")]);
            assert_eq!(classify(&h).unwrap(), Some(expected), "{ct}");
        }
    }

    #[test]
    fn unsupported_content_type_carries_raw_value() {
        let h = headers(&[("content-type", "application/x-protobuf"), ("content-length", "3")]);
        match classify(&h) {
            Err(Error::UnsupportedContentType(ct)) => assert_eq!(ct, "application/x-protobuf"),
            other => panic!("expected UnsupportedContentType, got {other:?}"),
        }
    }

    #[test]
    fn display_uses_tag_names() {
        assert_eq!(ResponseType::FormData.to_string(), "formData");
        assert!(ResponseType::Chunked.is_streaming());
        assert!(!ResponseType::Json.is_streaming());
    }
}
