//! Single-flight token refresh.
//!
//! When a request fails authorization the client asks the coordinator for a
//! fresh access token. The first caller while idle becomes the *leader* and
//! performs the refresh itself; every caller arriving while that refresh is
//! in flight is queued as a waiter and suspended. When the refresh settles,
//! waiters are released in arrival order, all in one pass, with the new
//! token or with a failure. At most one refresh call is ever on the wire, so
//! a rotating refresh token is never spent twice.
//!
//! The in-flight flag, the waiter queue and writes to the credential store
//! all happen under the coordinator's lock; the lock is never held across an
//! `.await`.

use crate::credentials::{CredentialStore, TokenPair};
use crate::error::{ApiError, ApiResult};
use crate::terminator::SessionTerminator;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Exchanges a refresh token for a new token pair.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Perform one refresh call.
    async fn refresh(&self, refresh_token: &str) -> ApiResult<TokenPair>;
}

type Waiter = oneshot::Sender<ApiResult<String>>;

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    waiters: VecDeque<Waiter>,
    refreshes: u64,
    generation: u64,
}

enum Ticket {
    Ready(String),
    Lead(u64),
    Wait(oneshot::Receiver<ApiResult<String>>),
}

/// Why a refresh cycle failed.
#[derive(Debug)]
enum RefreshFailure {
    MissingRefreshToken,
    Rejected(ApiError),
    TimedOut(Duration),
}

impl RefreshFailure {
    fn into_error(self) -> ApiError {
        match self {
            Self::MissingRefreshToken => ApiError::unauthenticated("no refresh token available"),
            Self::Rejected(err) => {
                ApiError::session_expired(format!("token refresh failed: {err}"))
            }
            Self::TimedOut(after) => {
                ApiError::session_expired(format!("token refresh timed out after {after:?}"))
            }
        }
    }
}

/// Coordinates token refreshes across concurrent requests.
pub struct RefreshCoordinator {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    terminator: SessionTerminator,
    refresh_timeout: Duration,
    state: Mutex<RefreshState>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RefreshCoordinator")
            .field("in_flight", &state.in_flight)
            .field("waiters", &state.waiters.len())
            .field("refreshes", &state.refreshes)
            .field("refresh_timeout", &self.refresh_timeout)
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    /// Create an idle coordinator.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        terminator: SessionTerminator,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            store,
            refresher,
            terminator,
            refresh_timeout,
            state: Mutex::new(RefreshState::default()),
        }
    }

    /// Obtain an access token to replay a request that failed authorization.
    ///
    /// `stale` is the access token the failed request carried. If the
    /// coordinator is idle and the store already holds a different token, a
    /// refresh completed while the request was on the wire and that token is
    /// returned without refreshing again.
    pub async fn fresh_token(&self, stale: Option<&str>) -> ApiResult<String> {
        let ticket = {
            let mut state = self.state.lock();
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                debug!(position = state.waiters.len(), "Refresh in flight; queueing request");
                Ticket::Wait(rx)
            } else {
                match self.store.access_token() {
                    Some(current) if stale != Some(current.as_str()) => Ticket::Ready(current),
                    _ => {
                        state.in_flight = true;
                        Ticket::Lead(state.generation)
                    }
                }
            }
        };

        match ticket {
            Ticket::Ready(token) => {
                debug!("Access token already rotated; skipping refresh");
                Ok(token)
            }
            Ticket::Wait(rx) => rx
                .await
                .unwrap_or_else(|_| Err(ApiError::network("token refresh was abandoned"))),
            Ticket::Lead(generation) => self.lead(generation).await,
        }
    }

    /// Persist a pair obtained from a login or code verification.
    pub fn install(&self, pair: &TokenPair) {
        let mut state = self.state.lock();
        state.generation += 1;
        self.store.store(pair);
        self.terminator.rearm();
        info!("Session established");
    }

    /// Clear credentials for a deliberate sign-out.
    pub fn sign_out(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        self.terminator.sign_out();
        info!("Signed out");
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().in_flight
    }

    /// Number of callers suspended behind the current refresh.
    pub fn pending_waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Number of refresh calls made so far.
    pub fn refresh_count(&self) -> u64 {
        self.state.lock().refreshes
    }

    async fn lead(&self, generation: u64) -> ApiResult<String> {
        let mut guard = LeaderGuard {
            coordinator: self,
            settled: false,
        };
        let outcome = self.run_refresh().await;
        guard.settled = true;
        self.settle(outcome, generation)
    }

    async fn run_refresh(&self) -> Result<TokenPair, RefreshFailure> {
        let Some(refresh_token) = self.store.refresh_token() else {
            info!("No refresh token stored; ending session without refreshing");
            return Err(RefreshFailure::MissingRefreshToken);
        };

        self.state.lock().refreshes += 1;
        info!("Refreshing access token");

        match tokio::time::timeout(self.refresh_timeout, self.refresher.refresh(&refresh_token))
            .await
        {
            Ok(Ok(pair)) => Ok(pair),
            Ok(Err(err)) => Err(RefreshFailure::Rejected(err)),
            Err(_) => Err(RefreshFailure::TimedOut(self.refresh_timeout)),
        }
    }

    fn settle(
        &self,
        outcome: Result<TokenPair, RefreshFailure>,
        generation: u64,
    ) -> ApiResult<String> {
        let mut state = self.state.lock();
        let waiters = std::mem::take(&mut state.waiters);
        state.in_flight = false;

        if state.generation != generation {
            // Signed out or signed in again while the refresh was on the wire.
            drop(state);
            info!(released = waiters.len(), "Session changed during refresh; discarding result");
            let current = self
                .store
                .access_token()
                .ok_or_else(|| ApiError::unauthenticated("signed out during token refresh"));
            for waiter in waiters {
                let _ = waiter.send(current.clone());
            }
            return current;
        }

        match outcome {
            Ok(pair) => {
                self.store.store(&pair);
                info!(released = waiters.len(), "Access token refreshed");
                for waiter in waiters {
                    let _ = waiter.send(Ok(pair.access_token.clone()));
                }
                Ok(pair.access_token)
            }
            Err(failure) => {
                warn!(reason = ?failure, released = waiters.len(), "Token refresh failed");
                let error = failure.into_error();
                let fire = self.terminator.end();
                for waiter in waiters {
                    let _ = waiter.send(Err(error.clone()));
                }
                drop(state);

                if fire {
                    self.terminator.notify();
                }
                Err(error)
            }
        }
    }
}

/// Returns the coordinator to idle if the leader is dropped mid-refresh.
struct LeaderGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.coordinator.state.lock();
        let waiters = std::mem::take(&mut state.waiters);
        state.in_flight = false;
        warn!(abandoned = waiters.len(), "Token refresh cancelled before completion");
        for waiter in waiters {
            let _ = waiter.send(Err(ApiError::network("token refresh was cancelled")));
        }
    }
}
