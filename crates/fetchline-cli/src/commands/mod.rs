pub mod listen;
pub mod request;

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Args;
use fetchline::{Client, ClientConfig, RequestOptions};

/// Flags shared by every command that sends a request.
#[derive(Args, Debug, Clone, Default)]
pub struct RequestFlags {
    /// Extra request header, `Name: value`. Repeatable.
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    pub headers: Vec<String>,

    /// Query parameter, `key=value`. Repeatable.
    #[arg(short, long = "query", value_name = "KEY=VALUE")]
    pub query: Vec<String>,

    /// Bearer token for the Authorization header.
    #[arg(long, conflicts_with = "basic")]
    pub bearer: Option<String>,

    /// Basic auth credentials, `user:password`.
    #[arg(long, value_name = "USER:PASSWORD")]
    pub basic: Option<String>,

    /// Give up waiting for the response head after this many milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl RequestFlags {
    pub fn apply(&self, mut options: RequestOptions) -> anyhow::Result<RequestOptions> {
        for raw in &self.headers {
            let (name, value) = parse_header(raw)?;
            options = options.header(name, value);
        }
        for raw in &self.query {
            let (key, value) = parse_pair(raw)?;
            options = options.query(key, value);
        }
        if let Some(token) = &self.bearer {
            options = options.bearer(token.as_str());
        }
        if let Some(raw) = &self.basic {
            let (user, password) = parse_basic(raw);
            options = options.basic(user, password);
        }
        if let Some(ms) = self.timeout_ms {
            options = options.timeout(Duration::from_millis(ms));
        }
        Ok(options)
    }
}

/// Load the client config (if any) and apply the `--base-url` override.
pub fn build_client(config: Option<&Path>, base_url: Option<&str>) -> anyhow::Result<Client> {
    let mut config = match config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(base_url) = base_url {
        config = config.with_base_url(base_url);
    }
    Ok(Client::from_config(config))
}

/// `Name: value` header syntax.
pub fn parse_header(raw: &str) -> anyhow::Result<(String, String)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("invalid header {raw:?}, expected `Name: value`");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("invalid header {raw:?}, name is empty");
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// `key=value` syntax for query and form pairs. The value may be empty.
pub fn parse_pair(raw: &str) -> anyhow::Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, _)) if key.is_empty() => bail!("invalid pair {raw:?}, key is empty"),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => bail!("invalid pair {raw:?}, expected `key=value`"),
    }
}

/// `user:password`; a missing `:` means no password.
pub fn parse_basic(raw: &str) -> (String, String) {
    match raw.split_once(':') {
        Some((user, password)) => (user.to_string(), password.to_string()),
        None => (raw.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchline::request::prepare;
    use fetchline::HeaderMap;

    #[test]
    fn header_syntax() {
        assert_eq!(
            parse_header("Accept: application/json").unwrap(),
            ("Accept".into(), "application/json".into())
        );
        assert_eq!(
            parse_header("x-trace:a:b").unwrap(),
            ("x-trace".into(), "a:b".into())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn pair_syntax() {
        assert_eq!(parse_pair("q=rust lang").unwrap(), ("q".into(), "rust lang".into()));
        assert_eq!(parse_pair("empty=").unwrap(), ("empty".into(), String::new()));
        assert_eq!(parse_pair("a=b=c").unwrap(), ("a".into(), "b=c".into()));
        assert!(parse_pair("=x").is_err());
        assert!(parse_pair("flag").is_err());
    }

    #[test]
    fn basic_syntax() {
        assert_eq!(parse_basic("zell:secret"), ("zell".into(), "secret".into()));
        assert_eq!(parse_basic("zell"), ("zell".into(), String::new()));
    }

    #[test]
    fn flags_shape_the_request() {
        let flags = RequestFlags {
            headers: vec!["X-Trace: abc".into()],
            query: vec!["page=2".into()],
            bearer: Some("t0k".into()),
            timeout_ms: Some(1500),
            ..Default::default()
        };
        let options = flags.apply(RequestOptions::new()).unwrap();
        assert_eq!(options.timeout, Some(Duration::from_millis(1500)));

        let prepared = prepare("http://api.test/items", &HeaderMap::new(), &options).unwrap();
        assert_eq!(prepared.url, "http://api.test/items?page=2");
        assert_eq!(prepared.headers.get("x-trace"), Some("abc"));
        assert_eq!(prepared.headers.get("authorization"), Some("Bearer t0k"));
    }

    #[test]
    fn missing_config_file_fails() {
        let err = build_client(Some(Path::new("/nonexistent/fetchline.toml")), None).unwrap_err();
        assert!(err.to_string().contains("loading"));
    }

    #[test]
    fn base_url_override() {
        let client = build_client(None, Some("http://api.test")).unwrap();
        assert_eq!(client.resolve_url("/users"), "http://api.test/users");
    }
}
