// Authentication module
// Owns the access token and the single-flight refresh gate

mod types;
mod token;
mod logout;
mod manager;
mod refresh;

pub use logout::{LogoutHandler, RedirectLogout};
pub use manager::{AuthManager, AuthStats};
pub use token::token_preview;
pub use types::{Envelope, LoginRequest, TokenGrant, User, UserRole};
