//! fetchline: send HTTP requests from the command line.
//!
//! # Usage
//!
//! ```text
//! fetchline request http://localhost:3000/users -X POST --json '{"name":"zell"}'
//! fetchline --base-url http://localhost:3000 request /search -q term=rust -i
//! fetchline listen http://localhost:3000/events --max-events 10
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "fetchline",
    about = "HTTP client with typed and streaming response bodies",
    version,
    propagate_version = true
)]
struct Cli {
    /// Client config file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Base URL that relative paths are resolved against.
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a request and print the response body.
    ///
    /// JSON and form bodies are pretty-printed, SSE events and chunked
    /// records are printed one JSON object per line as they arrive.
    Request(commands::request::RequestArgs),
    /// Subscribe to a Server-Sent Events endpoint, reconnecting on failure.
    Listen(commands::listen::ListenArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fetchline=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = commands::build_client(cli.config.as_deref(), cli.base_url.as_deref())?;

    match cli.command {
        Commands::Request(args) => commands::request::run(&client, args).await,
        Commands::Listen(args) => commands::listen::run(&client, args).await,
    }
}
