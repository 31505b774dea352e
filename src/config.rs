use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use reqwest::{Method, Url};

/// SkillBridge API client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Base URL of the SkillBridge API
    #[arg(short = 'u', long, env = "SKILLBRIDGE_API_URL", default_value = "http://localhost:3000/api")]
    pub base_url: String,

    /// Initial access token
    #[arg(short = 't', long = "token", env = "SKILLBRIDGE_ACCESS_TOKEN")]
    pub access_token: Option<String>,

    /// Refresh cookie value used to authorize the refresh endpoint
    #[arg(long, env = "SKILLBRIDGE_REFRESH_COOKIE")]
    pub refresh_cookie: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// JSON body to send with the request
    #[arg(short = 'd', long)]
    pub data: Option<String>,

    /// HTTP method, or the path when only one argument is given
    pub method_or_path: Option<String>,

    /// API path (e.g. /projects)
    pub path: Option<String>,
}

/// Log output format for the binary
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// A single request issued by the binary
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

#[derive(Clone, Debug)]
pub struct Config {
    // API endpoints
    pub base_url: String,
    pub refresh_path: String,
    pub logout_redirect: String,

    // Credentials
    pub access_token: Option<String>,
    pub refresh_cookie: Option<String>,
    pub login_email: Option<String>,
    pub login_password: Option<String>,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,

    // What the binary should do; None means "who am I"
    pub invocation: Option<Invocation>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            logout_redirect: "/login".to_string(),
            access_token: None,
            refresh_cookie: None,
            login_email: None,
            login_password: None,
            http_max_connections: 20,
            http_connect_timeout: 10,
            http_request_timeout: 30,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            invocation: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_args(CliArgs::parse())
    }

    /// Build configuration from parsed arguments plus env-only settings
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let defaults = Config::default();

        let invocation = parse_invocation(
            args.method_or_path.as_deref(),
            args.path.as_deref(),
            args.data.as_deref(),
        )?;

        Ok(Config {
            base_url: args.base_url,
            refresh_path: std::env::var("SKILLBRIDGE_REFRESH_PATH")
                .unwrap_or(defaults.refresh_path),
            logout_redirect: std::env::var("SKILLBRIDGE_LOGIN_PATH")
                .unwrap_or(defaults.logout_redirect),

            access_token: args.access_token.filter(|t| !t.is_empty()),
            refresh_cookie: args.refresh_cookie.filter(|c| !c.is_empty()),
            login_email: std::env::var("SKILLBRIDGE_EMAIL").ok(),
            login_password: std::env::var("SKILLBRIDGE_PASSWORD").ok(),

            http_max_connections: std::env::var("HTTP_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.http_max_connections),

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.http_connect_timeout),

            http_request_timeout: args.http_timeout,

            log_level: args.log_level,
            log_format: args.log_format,

            invocation,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .with_context(|| format!("SKILLBRIDGE_API_URL is not a valid URL: {}", self.base_url))?;

        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!(
                "SKILLBRIDGE_API_URL must use http or https, got: {}",
                url.scheme()
            );
        }

        if !self.refresh_path.starts_with('/') {
            anyhow::bail!(
                "SKILLBRIDGE_REFRESH_PATH must start with '/': {}",
                self.refresh_path
            );
        }

        if self.http_request_timeout == 0 || self.http_connect_timeout == 0 {
            anyhow::bail!("HTTP timeouts must be greater than zero");
        }

        Ok(())
    }

    /// Full URL of the refresh endpoint
    pub fn refresh_url(&self) -> Result<Url> {
        join_url(&self.base_url, &self.refresh_path)
    }
}

/// Join an API path onto the base URL, keeping the base path prefix
pub fn join_url(base_url: &str, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).with_context(|| format!("Invalid request URL: {}", joined))
}

/// Parse positional `[METHOD] PATH` plus optional JSON body
fn parse_invocation(
    method_or_path: Option<&str>,
    path: Option<&str>,
    data: Option<&str>,
) -> Result<Option<Invocation>> {
    let body = data
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--data must be valid JSON")?;

    let (method, path) = match (method_or_path, path) {
        (None, _) => return Ok(None),
        (Some(path), None) => {
            let method = if body.is_some() { Method::POST } else { Method::GET };
            (method, path)
        }
        (Some(method), Some(path)) => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())
                .with_context(|| format!("Invalid HTTP method: {}", method))?;
            (method, path)
        }
    };

    Ok(Some(Invocation {
        method,
        path: path.to_string(),
        body,
    }))
}
