//! ---
//! omnii_section: "02-session-lifecycle"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Session lifecycle engine for the Omnii connector."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use tokio::sync::watch;

/// Short-lived session issued by a handshake. Memory-only, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub established_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            established_at: Utc::now(),
        }
    }
}

/// Single synchronized holder for the active session.
///
/// Writers are the engine (publish on handshake) and the heartbeat scheduler
/// (clear on loss). Readers always observe a complete session value and can
/// await the transition into the active state, which the deferred-report
/// flush relies on.
#[derive(Debug)]
pub struct SessionHolder {
    tx: watch::Sender<Option<Session>>,
}

impl SessionHolder {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Install a new session, discarding any prior one. At most one session
    /// is active at a time; the superseded value is returned for logging.
    pub fn publish(&self, session: Session) -> Option<Session> {
        self.tx.send_replace(Some(session))
    }

    /// Drop the active session, returning what was held.
    pub fn clear(&self) -> Option<Session> {
        self.tx.send_replace(None)
    }

    /// Drop the active session only if it still carries the given id.
    ///
    /// Guards against a raced clear after the engine has already published a
    /// replacement session.
    pub fn clear_if(&self, session_id: &str) -> bool {
        self.tx.send_if_modified(|current| {
            if current.as_ref().map(|s| s.session_id.as_str()) == Some(session_id) {
                *current = None;
                true
            } else {
                false
            }
        })
    }

    /// Snapshot of the currently active session.
    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    /// Observe session transitions.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}

impl Default for SessionHolder {
    fn default() -> Self {
        Self::new()
    }
}
