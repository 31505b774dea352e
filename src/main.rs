use anyhow::{Context, Result};
use std::sync::Arc;

use skillbridge_client::auth::token_preview;
use skillbridge_client::config::{Config, Invocation, LogFormat};
use skillbridge_client::{ApiRequest, RedirectLogout, SkillBridgeClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    match config.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    tracing::debug!("API base URL: {}", config.base_url);

    let logout = Arc::new(RedirectLogout::new(config.logout_redirect.clone()));
    let client = SkillBridgeClient::new(&config, logout.clone())
        .context("Failed to initialize SkillBridge client")?;

    match client.access_token() {
        Some(token) => tracing::info!("Using configured access token ({})", token_preview(&token)),
        None => login_from_env(&client, &config).await?,
    }

    let result = match config.invocation {
        Some(ref invocation) => run_invocation(&client, invocation).await,
        None => client
            .current_user()
            .await
            .map(|user| serde_json::to_value(user).unwrap_or_default()),
    };

    if let Some(entry_point) = logout.redirected_to() {
        anyhow::bail!("Session expired, log in again at {}", entry_point);
    }

    let body = result.context("Request failed")?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    let stats = client.stats();
    tracing::debug!(
        refresh_attempts = stats.refresh_attempts,
        replayed_requests = stats.replayed_requests,
        "Done"
    );

    Ok(())
}

/// Log in with SKILLBRIDGE_EMAIL / SKILLBRIDGE_PASSWORD when no token was given
async fn login_from_env(client: &SkillBridgeClient, config: &Config) -> Result<()> {
    match (&config.login_email, &config.login_password) {
        (Some(email), Some(password)) => {
            let user = client
                .login(email, password)
                .await
                .context("Login failed")?;
            tracing::info!("✅ Logged in as {} ({:?})", user.email, user.role);
        }
        _ => {
            tracing::warn!(
                "No access token configured; relying on the refresh cookie to obtain one"
            );
        }
    }
    Ok(())
}

/// Issue the request described on the command line
async fn run_invocation(
    client: &SkillBridgeClient,
    invocation: &Invocation,
) -> Result<serde_json::Value, skillbridge_client::ApiError> {
    let mut request = ApiRequest::new(invocation.method.clone(), invocation.path.clone());
    if let Some(ref body) = invocation.body {
        request = request.json(body.clone());
    }

    let response = client.request(request).await?;
    let text = response
        .text()
        .await
        .map_err(|e| skillbridge_client::ApiError::Decode(e.to_string()))?;

    if text.is_empty() {
        return Ok(serde_json::Value::Null);
    }

    // Non-JSON bodies are printed as a string
    Ok(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
}
