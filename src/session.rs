// Account session calls: login, logout, current user
//
// Login and logout bypass the refresh gate: a 401 from either is a final
// answer, not an expired token.

use crate::auth::{token_preview, Envelope, LoginRequest, TokenGrant, User};
use crate::error::ApiError;
use crate::http_client::{decode_json, ApiRequest, SkillBridgeClient};

impl SkillBridgeClient {
    /// Log in with email and password, storing the returned access token
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let body = serde_json::to_value(LoginRequest { email, password })
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to serialize login: {}", e)))?;

        tracing::info!(request_id = %request_id, email = %email, "Logging in");

        let response = match self
            .execute_once(&ApiRequest::post("/auth/login").json(body), None, &request_id)
            .await
        {
            Err(ApiError::AuthExpired) => {
                return Err(ApiError::RequestFailed {
                    status: Some(401),
                    message: "Invalid email or password".to_string(),
                })
            }
            other => other?,
        };

        let envelope: Envelope<TokenGrant> = decode_json(response).await?;
        if envelope.data.access_token.is_empty() {
            return Err(ApiError::Decode(
                "Login response does not contain accessToken".to_string(),
            ));
        }

        tracing::info!(
            user_id = %envelope.data.user.id,
            token = %token_preview(&envelope.data.access_token),
            "Login successful"
        );

        self.set_access_token(envelope.data.access_token);
        Ok(envelope.data.user)
    }

    /// Log out on the server and always drop the local token
    pub async fn logout(&self) -> Result<(), ApiError> {
        let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let token = self.access_token();

        let result = self
            .execute_once(&ApiRequest::post("/auth/logout"), token.as_deref(), &request_id)
            .await;

        self.clear_access_token();

        match result {
            Ok(_) => {
                tracing::info!(request_id = %request_id, "Logged out");
                Ok(())
            }
            // Session already gone server-side
            Err(ApiError::AuthExpired) => Ok(()),
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Server logout failed");
                Err(e)
            }
        }
    }

    /// Fetch the account behind the current token
    pub async fn current_user(&self) -> Result<User, ApiError> {
        let envelope: Envelope<User> = self.get_json("/auth/me").await?;
        Ok(envelope.data)
    }
}
