use std::io::Write;

use anyhow::{anyhow, bail, Context};
use clap::Args;
use fetchline::{Body, Client, Error, Method, RequestOptions, ResponseEnvelope, SseEvent};
use futures_util::StreamExt;
use serde_json::{json, Value};

use super::{parse_pair, RequestFlags};

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Absolute URL, or a path when a base URL is configured.
    pub url: String,

    /// HTTP method.
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    #[command(flatten)]
    pub flags: RequestFlags,

    /// JSON request body.
    #[arg(long, conflicts_with_all = ["form", "data"])]
    pub json: Option<String>,

    /// URL-encoded form field, `key=value`. Repeatable.
    #[arg(long, value_name = "KEY=VALUE", conflicts_with = "data")]
    pub form: Vec<String>,

    /// Plain-text request body.
    #[arg(short, long)]
    pub data: Option<String>,

    /// Print the status line and response headers to stderr.
    #[arg(short, long)]
    pub include: bool,

    /// Print the prepared request to stderr.
    #[arg(long)]
    pub debug: bool,

    /// Print the body bytes as received, without decoding or status checks.
    #[arg(long)]
    pub raw: bool,
}

impl RequestArgs {
    pub fn options(&self) -> anyhow::Result<RequestOptions> {
        let method = Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())?;
        let mut options = self.flags.apply(RequestOptions::new().method(method))?;

        if let Some(raw) = &self.json {
            let value: Value = serde_json::from_str(raw)
                .map_err(|e| anyhow!("--json is not valid JSON: {e}"))?;
            options = options.json(value);
        } else if !self.form.is_empty() {
            let pairs = self
                .form
                .iter()
                .map(|raw| parse_pair(raw))
                .collect::<anyhow::Result<Vec<_>>>()?;
            options = options.form(pairs);
        } else if let Some(text) = &self.data {
            options = options.text(text.as_str());
        }

        options = options.debug(self.debug);
        if self.raw {
            options = options.raw_response();
        }
        Ok(options)
    }
}

pub async fn run(client: &Client, args: RequestArgs) -> anyhow::Result<()> {
    let options = args.options()?;

    let (envelope, failed) = match client.fetch(&args.url, options).await {
        Ok(envelope) => (envelope, false),
        Err(Error::HttpStatus(envelope)) => (*envelope, true),
        Err(e) => return Err(e).context(format!("{} {}", args.method, args.url)),
    };

    let status = envelope.status;
    let status_text = envelope.status_text.clone();
    print_envelope(envelope, args.include).await?;

    if failed {
        bail!("request failed with status {status} {status_text}");
    }
    Ok(())
}

async fn print_envelope(envelope: ResponseEnvelope, include: bool) -> anyhow::Result<()> {
    if let Some(debug) = &envelope.debug {
        eprintln!("{}", serde_json::to_string_pretty(debug)?);
    }
    if include {
        eprintln!("HTTP {} {}", envelope.status, envelope.status_text);
        for (name, value) in &envelope.headers {
            eprintln!("{name}: {value}");
        }
        eprintln!();
    }
    print_body(envelope.body).await
}

async fn print_body(body: Body) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    match body {
        Body::Empty => {}
        Body::Json(value) => writeln!(stdout, "{}", serde_json::to_string_pretty(&value)?)?,
        Body::Text(text) => writeln!(stdout, "{text}")?,
        Body::Blob(bytes) => stdout.write_all(&bytes)?,
        Body::Form(fields) => writeln!(stdout, "{}", serde_json::to_string_pretty(&fields)?)?,
        Body::Events(mut events) => {
            while let Some(event) = events.next().await {
                let event = event.context("reading event stream")?;
                writeln!(stdout, "{}", event_json(event))?;
                stdout.flush()?;
            }
        }
        Body::Chunks(mut records) => {
            while let Some(record) = records.next().await {
                let record = record.context("reading chunked stream")?;
                writeln!(stdout, "{}", record.into_json())?;
                stdout.flush()?;
            }
        }
        Body::Stream(mut chunks) => {
            while let Some(chunk) = chunks.next().await {
                stdout.write_all(&chunk.context("reading response body")?)?;
                stdout.flush()?;
            }
        }
    }
    Ok(())
}

/// One JSON line per event: `{"event", "data", "id"?, "retry"?}`.
pub fn event_json(event: SseEvent) -> Value {
    let mut line = json!({
        "event": event.event,
        "data": event.data.into_json(),
    });
    if let Some(id) = event.id {
        line["id"] = Value::String(id);
    }
    if let Some(retry) = event.retry {
        line["retry"] = json!(retry);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use fetchline::{HeaderMap, Payload, ResponseHead};

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: RequestArgs,
    }

    fn parse(argv: &[&str]) -> RequestArgs {
        let mut full = vec!["fetchline"];
        full.extend_from_slice(argv);
        Harness::try_parse_from(full).unwrap().args
    }

    #[test]
    fn json_body_and_method() {
        let args = parse(&["http://api.test/users", "-X", "post", "--json", r#"{"a":1}"#]);
        let options = args.options().unwrap();
        assert_eq!(options.method, Method::POST);
        assert_eq!(options.body, Some(fetchline::RequestBody::Json(json!({"a": 1}))));
    }

    #[test]
    fn form_fields_in_order() {
        let args = parse(&["http://api.test/", "-X", "PUT", "--form", "a=1", "--form", "b=two"]);
        let options = args.options().unwrap();
        assert_eq!(
            options.body,
            Some(fetchline::RequestBody::Form(vec![
                ("a".into(), "1".into()),
                ("b".into(), "two".into()),
            ]))
        );
    }

    #[test]
    fn invalid_json_is_rejected() {
        let args = parse(&["http://api.test/", "--json", "{nope"]);
        assert!(args.options().is_err());
    }

    #[test]
    fn json_conflicts_with_form() {
        let argv = ["fetchline", "http://api.test/", "--json", "{}", "--form", "a=1"];
        assert!(Harness::try_parse_from(argv).is_err());
    }

    #[test]
    fn raw_and_debug_flags() {
        let args = parse(&["http://api.test/", "--raw", "--debug"]);
        let options = args.options().unwrap();
        assert!(options.raw_response);
        assert!(options.debug);
    }

    #[test]
    fn event_line_shape() {
        let mut event = SseEvent::new("status", Payload::Raw("busy".into()));
        event.id = Some("9".into());
        assert_eq!(
            event_json(event),
            json!({"event": "status", "data": "busy", "id": "9"})
        );

        let event = SseEvent::new("message", Payload::Json(json!({"n": 1})));
        assert_eq!(event_json(event), json!({"event": "message", "data": {"n": 1}}));
    }

    #[test]
    fn status_error_keeps_envelope_through_context() {
        let head = ResponseHead {
            url: "http://api.test/missing".into(),
            status: 404,
            status_text: "Not Found".into(),
            headers: HeaderMap::new(),
        };
        let failed: Result<(), Error> =
            Err(Error::HttpStatus(Box::new(ResponseEnvelope::new(Body::Empty, head))));

        let err = failed.context("GET /missing").unwrap_err();
        assert_eq!(err.to_string(), "GET /missing");
        let source = err.downcast_ref::<Error>().unwrap();
        assert_eq!(source.status(), Some(404));
        assert!(source.envelope().is_some());
    }
}
