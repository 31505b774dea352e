// Error handling module
// Defines the error taxonomy surfaced to callers of the client

use thiserror::Error;

/// Errors that can occur while issuing a request
#[derive(Error, Debug)]
pub enum ApiError {
    /// Server rejected the bearer token (401)
    /// Absorbed by the client on first occurrence, never returned from `request`
    #[error("Access token expired")]
    AuthExpired,

    /// Token refresh failed; every request waiting on that refresh gets this
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// Non-auth error response, repeated auth failure, or transport failure
    #[error("Request failed: {}", format_request_failed(.status, .message))]
    RequestFailed {
        status: Option<u16>,
        message: String,
    },

    /// Successful response whose body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn format_request_failed(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("{} - {}", status, message),
        None => message.to_string(),
    }
}

impl ApiError {
    /// HTTP status associated with this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::AuthExpired => Some(401),
            ApiError::RequestFailed { status, .. } => *status,
            _ => None,
        }
    }

    /// True when the server rejected the credentials, before or after a retry
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::AuthExpired | ApiError::RefreshFailed(_))
            || self.status() == Some(401)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ApiError::AuthExpired;
        assert_eq!(err.to_string(), "Access token expired");

        let err = ApiError::RefreshFailed("401 Unauthorized".to_string());
        assert_eq!(err.to_string(), "Token refresh failed: 401 Unauthorized");

        let err = ApiError::RequestFailed {
            status: Some(404),
            message: "Project not found".to_string(),
        };
        assert_eq!(err.to_string(), "Request failed: 404 - Project not found");
    }

    #[test]
    fn test_transport_failure_message() {
        let err = ApiError::RequestFailed {
            status: None,
            message: "connection_failed: tcp connect error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Request failed: connection_failed: tcp connect error"
        );
    }

    #[test]
    fn test_config_error_message() {
        let err = ApiError::ConfigError("Missing base URL".to_string());
        assert_eq!(err.to_string(), "Configuration error: Missing base URL");
    }

    #[test]
    fn test_internal_error_message() {
        let err = ApiError::Internal(anyhow::anyhow!("Something went wrong"));
        assert_eq!(err.to_string(), "Internal error: Something went wrong");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::AuthExpired.status(), Some(401));
        assert_eq!(
            ApiError::RequestFailed {
                status: Some(503),
                message: String::new(),
            }
            .status(),
            Some(503)
        );
        assert_eq!(
            ApiError::RequestFailed {
                status: None,
                message: "timeout".to_string(),
            }
            .status(),
            None
        );
        assert_eq!(ApiError::RefreshFailed("x".to_string()).status(), None);
        assert_eq!(ApiError::Decode("x".to_string()).status(), None);
    }

    #[test]
    fn test_is_auth_failure() {
        assert!(ApiError::AuthExpired.is_auth_failure());
        assert!(ApiError::RefreshFailed("x".to_string()).is_auth_failure());
        assert!(ApiError::RequestFailed {
            status: Some(401),
            message: "still unauthorized".to_string(),
        }
        .is_auth_failure());

        assert!(!ApiError::RequestFailed {
            status: Some(403),
            message: "forbidden".to_string(),
        }
        .is_auth_failure());
        assert!(!ApiError::Internal(anyhow::anyhow!("boom")).is_auth_failure());
    }
}
