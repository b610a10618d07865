use std::io::Write;

use clap::Args;
use fetchline::{CancellationToken, Client, RequestOptions, SourceEvent};
use futures_util::StreamExt;
use serde_json::json;
use tracing::{info, warn};

use super::request::event_json;
use super::RequestFlags;

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Event stream URL, or a path when a base URL is configured.
    pub url: String,

    #[command(flatten)]
    pub flags: RequestFlags,

    /// Stop after this many events.
    #[arg(short = 'n', long)]
    pub max_events: Option<usize>,
}

/// Print events as JSON lines until the server closes the stream, a
/// permanent error occurs, `--max-events` is reached, or Ctrl-C.
pub async fn run(client: &Client, args: ListenArgs) -> anyhow::Result<()> {
    let stop = CancellationToken::new();
    let on_signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let options = args.flags.apply(RequestOptions::new().cancel_token(stop.clone()))?;
    let mut source = client.event_source(&args.url, options);
    let mut stdout = std::io::stdout();
    let mut received = 0usize;

    while let Some(event) = source.next().await {
        match event {
            SourceEvent::Open => info!(url = %args.url, "connected"),
            SourceEvent::Event(event) => {
                writeln!(stdout, "{}", event_json(event))?;
                stdout.flush()?;
                received += 1;
                if args.max_events.is_some_and(|max| received >= max) {
                    source.close();
                }
            }
            SourceEvent::Error(e) => warn!(error = %e, "event source error"),
            SourceEvent::Close(data) => {
                writeln!(stdout, "{}", json!({"event": "close", "data": data.into_json()}))?;
            }
        }
    }

    info!(events = received, "event source finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: ListenArgs,
    }

    #[test]
    fn parses_limits_and_auth() {
        let harness = Harness::try_parse_from([
            "fetchline",
            "http://api.test/events",
            "-n",
            "5",
            "--bearer",
            "t0k",
            "-H",
            "Last-Event-ID: 12",
        ])
        .unwrap();
        assert_eq!(harness.args.max_events, Some(5));
        assert_eq!(harness.args.flags.bearer.as_deref(), Some("t0k"));
        assert_eq!(harness.args.flags.headers, vec!["Last-Event-ID: 12".to_string()]);
    }

    #[test]
    fn bearer_conflicts_with_basic() {
        let result = Harness::try_parse_from([
            "fetchline",
            "http://api.test/events",
            "--bearer",
            "t0k",
            "--basic",
            "a:b",
        ]);
        assert!(result.is_err());
    }
}
