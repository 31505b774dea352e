use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Client, Url};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::logout::LogoutHandler;
use super::refresh;
use super::token::{token_preview, TokenStore};
use crate::error::ApiError;

/// How one refresh cycle settled; every waiter sees the same value
#[derive(Debug, Clone)]
enum RefreshOutcome {
    /// New token stored in the slot
    Refreshed(String),
    /// Slot was set or cleared while the refresh ran; holds what it has now
    Superseded(Option<String>),
    /// Refresh call failed and the session was ended
    Failed(String),
}

/// One refresh cycle; every waiter awaits a clone of the same future
type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Snapshot of authentication counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthStats {
    pub refresh_attempts: u64,
    pub refresh_successes: u64,
    pub refresh_failures: u64,
    pub replayed_requests: u64,
    pub forced_logouts: u64,
    pub last_refresh_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct StatsCollector {
    refresh_attempts: AtomicU64,
    refresh_successes: AtomicU64,
    refresh_failures: AtomicU64,
    replayed_requests: AtomicU64,
    forced_logouts: AtomicU64,
    last_refresh_at: Mutex<Option<DateTime<Utc>>>,
}

impl StatsCollector {
    fn snapshot(&self) -> AuthStats {
        AuthStats {
            refresh_attempts: self.refresh_attempts.load(Ordering::Relaxed),
            refresh_successes: self.refresh_successes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            replayed_requests: self.replayed_requests.load(Ordering::Relaxed),
            forced_logouts: self.forced_logouts.load(Ordering::Relaxed),
            last_refresh_at: *self
                .last_refresh_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

/// Authentication manager
/// Owns the access token slot and the single-flight refresh gate
pub struct AuthManager {
    /// Current access token
    token: TokenStore,

    /// Refresh currently in flight, if any
    /// Check-and-set happens under this lock with no await while held
    in_flight: Arc<Mutex<Option<PendingRefresh>>>,

    /// HTTP client for refresh requests (shares the cookie store)
    client: Client,

    /// Refresh endpoint
    refresh_url: Url,

    /// Forced logout side effect
    logout: Arc<dyn LogoutHandler>,

    stats: Arc<StatsCollector>,
}

impl AuthManager {
    /// Create a new AuthManager
    pub fn new(
        client: Client,
        refresh_url: Url,
        initial_token: Option<String>,
        logout: Arc<dyn LogoutHandler>,
    ) -> Self {
        Self {
            token: TokenStore::new(initial_token),
            in_flight: Arc::new(Mutex::new(None)),
            client,
            refresh_url,
            logout,
            stats: Arc::new(StatsCollector::default()),
        }
    }

    /// Get the current access token, if any
    pub fn access_token(&self) -> Option<String> {
        self.token.get()
    }

    /// Replace the current access token
    pub fn set_access_token(&self, token: impl Into<String>) {
        self.token.set(token);
    }

    /// Wipe the current access token
    pub fn clear_access_token(&self) {
        self.token.clear();
    }

    /// True while a refresh call is outstanding
    #[cfg(test)]
    pub(crate) fn is_refreshing(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn stats(&self) -> AuthStats {
        self.stats.snapshot()
    }

    pub(crate) fn record_replay(&self) {
        self.stats.replayed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Obtain a token to replay a request that failed with 401
    ///
    /// `sent_with` is the token the failed request carried. Joins the refresh
    /// in flight if there is one, otherwise starts one. If the token already
    /// changed since the request was sent, the current token is returned
    /// without refreshing again.
    pub async fn recover(&self, sent_with: Option<&str>) -> Result<String, ApiError> {
        let pending = {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);

            if let Some(pending) = slot.clone() {
                tracing::debug!("Refresh already in flight, queueing request");
                pending
            } else {
                let (current, generation) = self.token.snapshot();
                match (current, sent_with) {
                    (Some(current), sent) if sent != Some(current.as_str()) => {
                        tracing::debug!(
                            token = %token_preview(&current),
                            "Token rotated since request was sent, replaying without refresh"
                        );
                        return Ok(current);
                    }
                    (None, Some(_)) => {
                        // Cleared by logout or a failed refresh after this request left
                        return Err(session_ended());
                    }
                    _ => {
                        let pending = self.start_refresh(generation);
                        *slot = Some(pending.clone());
                        pending
                    }
                }
            }
        };

        match pending.await {
            RefreshOutcome::Refreshed(token) | RefreshOutcome::Superseded(Some(token)) => Ok(token),
            RefreshOutcome::Superseded(None) => Err(session_ended()),
            RefreshOutcome::Failed(reason) => Err(ApiError::RefreshFailed(reason)),
        }
    }

    /// Spawn the refresh call; the returned future settles once for all waiters
    ///
    /// `generation` is the token slot generation the refresh was started
    /// from. The result is only written back if the slot has not changed
    /// since, so a logout or login during the refresh is never overwritten.
    fn start_refresh(&self, generation: u64) -> PendingRefresh {
        tracing::info!("Access token rejected, starting refresh");
        self.stats.refresh_attempts.fetch_add(1, Ordering::Relaxed);

        let client = self.client.clone();
        let url = self.refresh_url.clone();
        let token = self.token.clone();
        let in_flight = self.in_flight.clone();
        let logout = self.logout.clone();
        let stats = self.stats.clone();

        let task = tokio::spawn(async move {
            let result = refresh::refresh_access_token(&client, &url).await;

            let outcome = {
                let mut slot = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                let outcome = match result {
                    Ok(grant) => {
                        let new_token = grant.access_token;
                        match token.set_if_unchanged(generation, new_token.clone()) {
                            Ok(()) => RefreshOutcome::Refreshed(new_token),
                            Err(current) => RefreshOutcome::Superseded(current),
                        }
                    }
                    Err(e) => match token.clear_if_unchanged(generation) {
                        Ok(()) => RefreshOutcome::Failed(format!("{:#}", e)),
                        Err(current) => RefreshOutcome::Superseded(current),
                    },
                };
                *slot = None;
                outcome
            };

            match &outcome {
                RefreshOutcome::Refreshed(new_token) => {
                    stats.refresh_successes.fetch_add(1, Ordering::Relaxed);
                    *stats
                        .last_refresh_at
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
                    tracing::info!(
                        token = %token_preview(new_token),
                        "Refresh succeeded, replaying queued requests"
                    );
                }
                RefreshOutcome::Superseded(current) => {
                    tracing::info!(
                        logged_in = current.is_some(),
                        "Token changed while refreshing, discarding refresh result"
                    );
                }
                RefreshOutcome::Failed(reason) => {
                    stats.refresh_failures.fetch_add(1, Ordering::Relaxed);
                    stats.forced_logouts.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(reason = %reason, "Refresh failed, rejecting queued requests");
                    logout.force_logout(reason);
                }
            }

            outcome
        });

        let in_flight = self.in_flight.clone();
        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    // Task died before settling; unblock the gate for the next request
                    *in_flight.lock().unwrap_or_else(PoisonError::into_inner) = None;
                    RefreshOutcome::Failed(format!("Refresh task aborted: {}", e))
                }
            }
        }
        .boxed()
        .shared()
    }
}

fn session_ended() -> ApiError {
    ApiError::RequestFailed {
        status: Some(401),
        message: "Session ended while request was in flight".to_string(),
    }
}
