//! Incremental decoders for streaming response bodies.
//!
//! - [`SseStream`] resynchronizes on the blank-line frame delimiter, since
//!   producer write boundaries carry no meaning in SSE.
//! - [`ChunkStream`] trusts transport chunk boundaries and emits one record
//!   per chunk.
//!
//! Both wrap a [`ByteStream`](crate::ByteStream) and are themselves lazy
//! `Stream`s: nothing is read until the consumer polls.

mod chunked;
mod sse;

pub use chunked::{decode_chunk, ChunkStream};
pub use sse::{parse_frame, SseDecoder, SseEvent, SseStream, CLOSE_EVENT, DEFAULT_EVENT};

use serde_json::Value;

/// A decoded payload: JSON when the text parses as JSON, the raw text
/// otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Raw(String),
}

impl Payload {
    /// Parse `text` as JSON, keeping it verbatim if that fails.
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Raw(text.to_string()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Payload::Json(_) => None,
            Payload::Raw(text) => Some(text),
        }
    }

    /// Convert to a JSON value; raw text becomes a JSON string.
    pub fn into_json(self) -> Value {
        match self {
            Payload::Json(value) => value,
            Payload::Raw(text) => Value::String(text),
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Raw(String::new())
    }
}

/// One record of a chunked body.
pub type ChunkRecord = Payload;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_prefers_json() {
        assert_eq!(Payload::parse(r#"{"a":1}"#), Payload::Json(json!({"a": 1})));
        assert_eq!(Payload::parse("42"), Payload::Json(json!(42)));
        assert_eq!(Payload::parse(r#""quoted""#), Payload::Json(json!("quoted")));
    }

    #[test]
    fn parse_falls_back_to_raw() {
        assert_eq!(
            Payload::parse("Status update at 3"),
            Payload::Raw("Status update at 3".into())
        );
        assert_eq!(Payload::parse(""), Payload::Raw(String::new()));
    }

    #[test]
    fn into_json_wraps_raw_text() {
        assert_eq!(Payload::Raw("hi".into()).into_json(), json!("hi"));
        assert_eq!(Payload::Json(json!([1])).into_json(), json!([1]));
    }
}
