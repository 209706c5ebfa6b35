//! Session termination.

use crate::credentials::CredentialStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Host callback run when the session ends involuntarily.
///
/// Receives the configured login entry point to navigate to. Implemented for
/// any `Fn(&str) + Send + Sync` closure.
#[cfg_attr(test, mockall::automock)]
pub trait SessionHook: Send + Sync {
    /// The session is gone; the user has to sign in again at `login_path`.
    fn session_expired(&self, login_path: &str);
}

impl<F> SessionHook for F
where
    F: Fn(&str) + Send + Sync,
{
    fn session_expired(&self, login_path: &str) {
        self(login_path)
    }
}

/// Hook that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyHook;

impl SessionHook for LogOnlyHook {
    fn session_expired(&self, login_path: &str) {
        info!(login_path, "Session expired; no navigation hook installed");
    }
}

/// Clears credentials and notifies the host, once per session.
///
/// After the first termination further calls are no-ops until a new session
/// is installed with [`SessionTerminator::rearm`].
#[derive(Clone)]
pub struct SessionTerminator {
    store: Arc<dyn CredentialStore>,
    hook: Arc<dyn SessionHook>,
    login_path: Arc<str>,
    ended: Arc<AtomicBool>,
}

impl std::fmt::Debug for SessionTerminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTerminator")
            .field("login_path", &self.login_path)
            .field("ended", &self.ended.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SessionTerminator {
    /// Create a terminator that sends the host to `login_path`.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hook: Arc<dyn SessionHook>,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            store,
            hook,
            login_path: Arc::from(login_path.into()),
            ended: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Clear credentials and run the hook. Returns whether anything happened.
    pub fn terminate(&self) -> bool {
        let fired = self.end();
        if fired {
            self.notify();
        }
        fired
    }

    /// Clear both tokens and mark the session ended, without notifying.
    ///
    /// Returns `true` the first time per session.
    pub(crate) fn end(&self) -> bool {
        if self.ended.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.store.clear();
        true
    }

    /// Run the host hook.
    pub(crate) fn notify(&self) {
        info!(login_path = %self.login_path, "Session terminated; redirecting to login");
        self.hook.session_expired(&self.login_path);
    }

    /// Clear credentials for a deliberate sign-out. The hook is not run.
    pub(crate) fn sign_out(&self) {
        self.ended.store(true, Ordering::SeqCst);
        self.store.clear();
    }

    /// A new session was established.
    pub(crate) fn rearm(&self) {
        self.ended.store(false, Ordering::SeqCst);
    }

    /// Login entry point handed to the hook.
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Whether the current session has ended.
    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}
