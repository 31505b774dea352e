// Forced logout side effect

use std::sync::{Mutex, PoisonError};

/// Invoked once per failed refresh, after the token has been cleared
pub trait LogoutHandler: Send + Sync {
    fn force_logout(&self, reason: &str);
}

/// Default handler: records a hard redirect to the unauthenticated entry point
///
/// The host application polls `redirected_to` (or swaps in its own handler)
/// to tear down whatever session state it holds.
#[derive(Debug)]
pub struct RedirectLogout {
    entry_point: String,
    redirected: Mutex<Option<String>>,
}

impl RedirectLogout {
    pub fn new(entry_point: impl Into<String>) -> Self {
        Self {
            entry_point: entry_point.into(),
            redirected: Mutex::new(None),
        }
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Target of the last forced redirect, if one happened
    pub fn redirected_to(&self) -> Option<String> {
        self.redirected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LogoutHandler for RedirectLogout {
    fn force_logout(&self, reason: &str) {
        tracing::warn!(
            entry_point = %self.entry_point,
            reason = %reason,
            "Forcing logout, redirecting to unauthenticated entry point"
        );
        *self
            .redirected
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(self.entry_point.clone());
    }
}

impl<F> LogoutHandler for F
where
    F: Fn(&str) + Send + Sync,
{
    fn force_logout(&self, reason: &str) {
        self(reason)
    }
}
