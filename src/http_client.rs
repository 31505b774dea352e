use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Request, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthManager, AuthStats, LogoutHandler};
use crate::config::{self, Config};
use crate::error::ApiError;

/// Cookie name the API uses for the long-lived refresh credential
const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Description of a single outbound call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<serde_json::Value>,
    timeout: Option<Duration>,

    /// Set by the client once the request has been through a refresh
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attach a JSON body (sent with `Content-Type: application/json`)
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Override the client's default request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// HTTP client for the SkillBridge API with single-flight token refresh
pub struct SkillBridgeClient {
    /// Shared HTTP client with connection pooling and cookie store
    client: Client,

    /// API base URL, requests are resolved relative to it
    base_url: String,

    /// Token slot and refresh gate
    auth: AuthManager,
}

impl SkillBridgeClient {
    /// Create a new client from configuration
    pub fn new(config: &Config, logout: Arc<dyn LogoutHandler>) -> Result<Self, ApiError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| ApiError::ConfigError(format!("Invalid base URL: {}", e)))?;
        let refresh_url = config
            .refresh_url()
            .map_err(|e| ApiError::ConfigError(format!("{:#}", e)))?;

        let jar = Arc::new(Jar::default());
        if let Some(ref cookie) = config.refresh_cookie {
            let cookie = if cookie.contains('=') {
                cookie.clone()
            } else {
                format!("{}={}", REFRESH_COOKIE_NAME, cookie)
            };
            jar.add_cookie_str(&format!("{}; Path=/", cookie), &base);
            tracing::debug!("Seeded refresh cookie for {}", base);
        }

        let client = Client::builder()
            .cookie_provider(jar)
            .pool_max_idle_per_host(config.http_max_connections)
            .connect_timeout(Duration::from_secs(config.http_connect_timeout))
            .timeout(Duration::from_secs(config.http_request_timeout))
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        let auth = AuthManager::new(
            client.clone(),
            refresh_url,
            config.access_token.clone(),
            logout,
        );

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            auth,
        })
    }

    /// Replace the in-memory access token
    pub fn set_access_token(&self, token: impl Into<String>) {
        self.auth.set_access_token(token);
    }

    /// Current access token, if any
    pub fn access_token(&self) -> Option<String> {
        self.auth.access_token()
    }

    /// Wipe the in-memory access token
    pub fn clear_access_token(&self) {
        self.auth.clear_access_token();
    }

    pub fn stats(&self) -> AuthStats {
        self.auth.stats()
    }

    /// Execute a request, refreshing the token and replaying once on 401
    ///
    /// Returns the response for any 2xx status. Any other status, a second
    /// 401, a transport failure or a failed refresh is returned as an error.
    pub async fn request(&self, mut request: ApiRequest) -> Result<Response, ApiError> {
        let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();

        tracing::debug!(
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
            "Sending HTTP request"
        );

        let mut token = self.auth.access_token();

        loop {
            let result = self
                .execute_once(&request, token.as_deref(), &request_id)
                .await;

            match result {
                Err(ApiError::AuthExpired) if !request.retried => {
                    tracing::warn!(
                        request_id = %request_id,
                        "Received 401, waiting for token refresh"
                    );

                    request.retried = true;
                    token = Some(self.auth.recover(token.as_deref()).await?);
                    self.auth.record_replay();

                    tracing::debug!(request_id = %request_id, "Replaying request with new token");
                    continue;
                }
                Err(ApiError::AuthExpired) => {
                    tracing::error!(
                        request_id = %request_id,
                        path = %request.path,
                        "Request rejected again after token refresh"
                    );
                    return Err(ApiError::RequestFailed {
                        status: Some(StatusCode::UNAUTHORIZED.as_u16()),
                        message: "Access token rejected after refresh".to_string(),
                    });
                }
                other => return other,
            }
        }
    }

    /// Send one attempt with the given token; 401 maps to `AuthExpired`
    pub(crate) async fn execute_once(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
        request_id: &str,
    ) -> Result<Response, ApiError> {
        let req = self.build_request(request, token)?;
        let url = req.url().clone();

        let response = match self.client.execute(req).await {
            Ok(response) => response,
            Err(e) => {
                // Categorize the error for better debugging
                let error_kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection_failed"
                } else if e.is_request() {
                    "request_error"
                } else if e.is_body() {
                    "body_error"
                } else {
                    "unknown"
                };

                tracing::warn!(
                    request_id = %request_id,
                    error_kind = error_kind,
                    error = %e,
                    url = %url,
                    "HTTP request error"
                );

                return Err(ApiError::RequestFailed {
                    status: None,
                    message: format!("{}: {}", error_kind, e),
                });
            }
        };

        let status = response.status();
        tracing::debug!(request_id = %request_id, status = %status, "Received HTTP response");

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::AuthExpired);
        }

        let error_text = response.text().await.unwrap_or_default();
        tracing::error!(
            request_id = %request_id,
            status = status.as_u16(),
            url = %url,
            response_body = %error_text,
            "HTTP request failed with error response"
        );

        Err(ApiError::RequestFailed {
            status: Some(status.as_u16()),
            message: error_text,
        })
    }

    /// Build the outbound request, attaching the bearer token when present
    fn build_request(&self, request: &ApiRequest, token: Option<&str>) -> Result<Request, ApiError> {
        let url = config::join_url(&self.base_url, &request.path)
            .map_err(|e| ApiError::ConfigError(format!("{:#}", e)))?;

        // The client owns the Authorization header
        let mut headers = request.headers.clone();
        headers.remove(AUTHORIZATION);

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(headers);

        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        builder.build().map_err(|e| {
            ApiError::Internal(anyhow::anyhow!("Failed to build request: {}", e))
        })
    }

    /// GET a path and decode the JSON response
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(ApiRequest::get(path)).await
    }

    /// POST a JSON body and decode the JSON response
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(ApiRequest::post(path).json(to_json(body)?)).await
    }

    /// PUT a JSON body and decode the JSON response
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(ApiRequest::put(path).json(to_json(body)?)).await
    }

    /// PATCH a JSON body and decode the JSON response
    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(ApiRequest::patch(path).json(to_json(body)?)).await
    }

    /// DELETE a path, ignoring any response body
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.request(ApiRequest::delete(path)).await?;
        Ok(())
    }

    async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let response = self.request(request).await?;
        decode_json(response).await
    }
}

fn to_json<B: Serialize + ?Sized>(body: &B) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(body)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to serialize body: {}", e)))
}

/// Decode a successful response body; 204/205 decode from JSON null
pub(crate) async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();

    if status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT {
        return serde_json::from_value(serde_json::Value::Null).map_err(|_| {
            ApiError::Decode(format!(
                "No content response ({}), but response type cannot be built from an empty body",
                status.as_u16()
            ))
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::Decode(format!("Failed to read response body: {}", e)))?;

    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}
