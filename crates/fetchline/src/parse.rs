//! Turns a classified body stream into a [`Body`].
//!
//! Buffering types await the whole body once; streaming types wrap it in
//! a decoder and return immediately.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::debug;

use crate::body::{collect_bytes, BodyStream, ByteStream};
use crate::classify::ResponseType;
use crate::decode::{ChunkStream, SseStream};
use crate::response::Body;
use crate::Error;

/// Interpret `body` according to its classification.
///
/// `status` is only used to annotate parse errors.
pub async fn read_body(
    kind: Option<ResponseType>,
    status: u16,
    body: ByteStream,
) -> Result<Body, Error> {
    let Some(kind) = kind else {
        return Ok(Body::Empty);
    };

    match kind {
        ResponseType::Sse => Ok(Body::Events(SseStream::new(body))),
        ResponseType::Chunked => Ok(Body::Chunks(ChunkStream::new(body))),
        ResponseType::Stream => Ok(Body::Stream(BodyStream::new(body))),
        ResponseType::Json => {
            let bytes = collect_bytes(body).await?;
            debug!(bytes = bytes.len(), "parsing json body");
            match serde_json::from_slice(&bytes) {
                Ok(value) => Ok(Body::Json(value)),
                Err(e) => Err(Error::BodyParse {
                    kind: kind.as_str(),
                    status,
                    body: bytes,
                    source: Box::new(e),
                }),
            }
        }
        ResponseType::Text => {
            let bytes = collect_bytes(body).await?;
            Ok(Body::Text(String::from_utf8_lossy(&bytes).into_owned()))
        }
        ResponseType::Blob => Ok(Body::Blob(collect_bytes(body).await?)),
        ResponseType::FormData => {
            let bytes = collect_bytes(body).await?;
            Ok(Body::Form(parse_form(&bytes)))
        }
    }
}

/// Parse an `application/x-www-form-urlencoded` body into a flat map.
///
/// Values are trimmed and a repeated key keeps its last value.
pub fn parse_form(bytes: &Bytes) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(bytes)
        .map(|(key, value)| (key.into_owned(), value.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Fragments;
    use futures_util::StreamExt;
    use serde_json::json;

    fn body(text: &'static str, chunk_size: usize) -> ByteStream {
        Fragments::new(text, chunk_size).into_stream()
    }

    #[tokio::test]
    async fn json_body_across_chunks() {
        let parsed = read_body(Some(ResponseType::Json), 200, body(r#"{"a":[1,2,3]}"#, 4))
            .await
            .unwrap();
        assert_eq!(parsed.as_json(), Some(&json!({"a": [1, 2, 3]})));
    }

    #[tokio::test]
    async fn malformed_json_is_body_parse_error() {
        let err = read_body(Some(ResponseType::Json), 502, body("{not json", 64))
            .await
            .unwrap_err();
        match err {
            Error::BodyParse {
                kind, status, body, ..
            } => {
                assert_eq!(kind, "json");
                assert_eq!(status, 502);
                assert_eq!(body.as_ref(), b"{not json");
            }
            other => panic!("expected BodyParse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn text_body_is_lossy() {
        let raw: ByteStream = Box::pin(futures_util::stream::iter(vec![Ok(Bytes::from_static(
            b"ok \xFF",
        ))]));
        let parsed = read_body(Some(ResponseType::Text), 200, raw).await.unwrap();
        assert_eq!(parsed.as_text(), Some("ok \u{FFFD}"));
    }

    #[tokio::test]
    async fn form_body_is_flattened() {
        let parsed = read_body(
            Some(ResponseType::FormData),
            200,
            body("name=Zell+Liew&role=%20admin%20&role=owner", 5),
        )
        .await
        .unwrap();
        let Body::Form(map) = parsed else {
            panic!("expected form body");
        };
        assert_eq!(map.get("name").map(String::as_str), Some("Zell Liew"));
        assert_eq!(map.get("role").map(String::as_str), Some("owner"));
    }

    #[tokio::test]
    async fn blob_keeps_bytes() {
        let parsed = read_body(Some(ResponseType::Blob), 200, body("\u{1}\u{2}\u{3}", 1))
            .await
            .unwrap();
        assert!(matches!(parsed, Body::Blob(ref b) if b[..] == [1u8, 2, 3]));
    }

    #[tokio::test]
    async fn no_type_reads_nothing() {
        let untouched: ByteStream = Box::pin(futures_util::stream::pending::<Result<Bytes, Error>>());
        let parsed = read_body(None, 204, untouched).await.unwrap();
        assert!(matches!(parsed, Body::Empty));
    }

    #[tokio::test]
    async fn streaming_types_return_without_reading() {
        let pending = || -> ByteStream { Box::pin(futures_util::stream::pending::<Result<Bytes, Error>>()) };
        for kind in [ResponseType::Sse, ResponseType::Chunked, ResponseType::Stream] {
            let parsed = read_body(Some(kind), 200, pending()).await.unwrap();
            assert!(parsed.is_streaming(), "{kind}");
        }

        let parsed = read_body(Some(ResponseType::Sse), 200, body("data: 1\n\n", 3))
            .await
            .unwrap();
        let events: Vec<_> = parsed.into_events().unwrap().collect().await;
        assert_eq!(events.len(), 1);
    }
}
