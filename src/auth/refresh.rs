// Token refresh call

use anyhow::{Context, Result};
use reqwest::{Client, Url};

use super::types::{Envelope, TokenGrant};

/// Call the refresh endpoint and return the new token grant
///
/// No bearer token is attached: the session cookie held by `client`'s
/// cookie store is what authorizes this call.
pub async fn refresh_access_token(client: &Client, url: &Url) -> Result<TokenGrant> {
    tracing::debug!(url = %url, "Refreshing access token...");

    let response = client
        .post(url.clone())
        .send()
        .await
        .context("Failed to send refresh request")?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        tracing::error!(
            status = status.as_u16(),
            body = %error_text,
            "Refresh endpoint rejected the request"
        );
        anyhow::bail!("Refresh failed: {} - {}", status, error_text);
    }

    let envelope: Envelope<TokenGrant> = response
        .json()
        .await
        .context("Failed to parse refresh response")?;

    if !envelope.success {
        anyhow::bail!(
            "Refresh response reported failure: {}",
            envelope.message.unwrap_or_default()
        );
    }

    if envelope.data.access_token.is_empty() {
        anyhow::bail!("Refresh response does not contain accessToken");
    }

    tracing::info!(user_id = %envelope.data.user.id, "Access token refreshed");

    Ok(envelope.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn grant_body(token: &str) -> String {
        json!({
            "success": true,
            "data": {
                "accessToken": token,
                "user": {"id": "u1", "email": "ada@example.com", "name": "Ada", "role": "client"}
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_refresh_success_without_bearer_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/auth/refresh")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(grant_body("token-2"))
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/auth/refresh", server.url())).unwrap();
        let grant = refresh_access_token(&Client::new(), &url).await.unwrap();

        assert_eq!(grant.access_token, "token-2");
        assert_eq!(grant.user.email, "ada@example.com");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_non_success_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(401)
            .with_body("refresh token revoked")
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/auth/refresh", server.url())).unwrap();
        let err = refresh_access_token(&Client::new(), &url)
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("401"));
        assert!(msg.contains("refresh token revoked"));
    }

    #[tokio::test]
    async fn test_refresh_empty_token_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(grant_body(""))
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/auth/refresh", server.url())).unwrap();
        let err = refresh_access_token(&Client::new(), &url)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("accessToken"));
    }

    #[tokio::test]
    async fn test_refresh_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/auth/refresh", server.url())).unwrap();
        let err = refresh_access_token(&Client::new(), &url)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to parse refresh response"));
    }

    #[tokio::test]
    async fn test_refresh_envelope_failure_flag() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "success": false,
                    "message": "session expired",
                    "data": {
                        "accessToken": "ignored",
                        "user": {"id": "u1", "email": "a@b.c", "name": "A", "role": "admin"}
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/auth/refresh", server.url())).unwrap();
        let err = refresh_access_token(&Client::new(), &url)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("session expired"));
    }
}
