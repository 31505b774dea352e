// SkillBridge Client - authenticated HTTP client with single-flight token refresh

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod session;

pub use auth::{AuthStats, LogoutHandler, RedirectLogout, User, UserRole};
pub use error::ApiError;
pub use http_client::{ApiRequest, SkillBridgeClient};
