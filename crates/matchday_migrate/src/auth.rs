//! Authentication and connectivity seams.
//!
//! The auth subsystem is an external collaborator; the engine only needs
//! one call from it: refresh the session or report a definitive failure.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;

/// Errors the auth collaborator can report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The session is gone for good; the user must sign in again.
    #[error("session expired; re-authenticate and retry")]
    Reauthenticate,

    /// The auth service itself could not be reached.
    #[error("auth service unreachable: {0}")]
    Unreachable(String),
}

/// A refreshed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Account the session belongs to.
    pub account_id: String,
    /// Expiry time, if the backend communicates one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Creates a session with no known expiry.
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            expires_at: None,
        }
    }

    /// Returns true if the session expires within the given margin.
    /// An unknown expiry counts as near-expiry so long operations keep
    /// re-validating rather than assuming the token is immortal.
    pub fn is_near_expiry(&self, margin: Duration) -> bool {
        match self.expires_at {
            Some(at) => at - Utc::now() < margin,
            None => true,
        }
    }
}

/// The auth collaborator contract.
pub trait AuthService: Send + Sync {
    /// Returns a valid session or a definitive failure.
    fn refresh_session(&self) -> Result<Session, AuthError>;
}

/// Network reachability check.
pub trait NetworkMonitor: Send + Sync {
    /// Returns true if the network is currently reachable.
    fn is_online(&self) -> bool;
}

/// A monitor that always reports the network as reachable.
#[derive(Debug, Default)]
pub struct AlwaysOnline;

impl NetworkMonitor for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// A switchable in-memory monitor.
#[derive(Debug)]
pub struct MemoryNetwork {
    online: AtomicBool,
}

impl MemoryNetwork {
    /// Creates a monitor in the given state.
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    /// Flips reachability.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl NetworkMonitor for MemoryNetwork {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// An in-memory auth service with failure injection.
#[derive(Debug)]
pub struct StaticAuth {
    account_id: String,
    refresh_count: AtomicUsize,
    /// Refreshes fail once this many have succeeded (for simulating a
    /// token expiring mid-operation). `usize::MAX` means never.
    fail_after: Mutex<usize>,
    session_ttl: Mutex<Option<Duration>>,
}

impl StaticAuth {
    /// Creates an auth service that always refreshes successfully.
    /// Sessions carry no expiry unless [`StaticAuth::set_session_ttl`]
    /// is called.
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            refresh_count: AtomicUsize::new(0),
            fail_after: Mutex::new(usize::MAX),
            session_ttl: Mutex::new(None),
        }
    }

    /// Gives refreshed sessions an expiry this far in the future.
    pub fn set_session_ttl(&self, ttl: Duration) {
        *self.session_ttl.lock() = Some(ttl);
    }

    /// Makes every refresh fail.
    pub fn set_failing(&self, failing: bool) {
        *self.fail_after.lock() = if failing { 0 } else { usize::MAX };
    }

    /// Lets `n` refreshes succeed, then fails the rest.
    pub fn fail_after_refreshes(&self, n: usize) {
        *self.fail_after.lock() = n;
    }

    /// How many refreshes have been attempted.
    pub fn refresh_count(&self) -> usize {
        self.refresh_count.load(Ordering::SeqCst)
    }
}

impl AuthService for StaticAuth {
    fn refresh_session(&self) -> Result<Session, AuthError> {
        let attempt = self.refresh_count.fetch_add(1, Ordering::SeqCst);
        if attempt >= *self.fail_after.lock() {
            return Err(AuthError::Reauthenticate);
        }
        Ok(Session {
            account_id: self.account_id.clone(),
            expires_at: (*self.session_ttl.lock()).map(|ttl| Utc::now() + ttl),
        })
    }
}
