//! ---
//! omnii_section: "02-session-lifecycle"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Session lifecycle engine for the Omnii connector."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
use std::sync::Arc;

use omnii_common::BackoffConfig;
use omnii_enrollment::{Credential, EnrollmentStore};
use omnii_rpc::{OmniiApi, RpcError};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::holder::{Session, SessionHolder};
use crate::metrics::SessionMetrics;
use crate::EngineError;

/// Lifecycle position of the connector relative to the Omnii service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Unenrolled,
    Enrolling,
    Enrolled,
    Handshaking,
    Active,
}

impl ClientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientState::Unenrolled => "unenrolled",
            ClientState::Enrolling => "enrolling",
            ClientState::Enrolled => "enrolled",
            ClientState::Handshaking => "handshaking",
            ClientState::Active => "active",
        }
    }
}

/// Drives enrollment and handshake against the Omnii service.
///
/// Owns the credential store and the only write path into the session
/// holder's publish side; heartbeat loss clears are the holder's other
/// writer.
pub struct SessionClient {
    api: Arc<dyn OmniiApi>,
    store: EnrollmentStore,
    holder: Arc<SessionHolder>,
    enrollment_code: String,
    backoff: BackoffConfig,
    state: RwLock<ClientState>,
    metrics: Option<SessionMetrics>,
}

impl SessionClient {
    pub fn new(
        api: Arc<dyn OmniiApi>,
        store: EnrollmentStore,
        holder: Arc<SessionHolder>,
        enrollment_code: impl Into<String>,
        backoff: BackoffConfig,
        metrics: Option<SessionMetrics>,
    ) -> Self {
        Self {
            api,
            store,
            holder,
            enrollment_code: enrollment_code.into(),
            backoff,
            state: RwLock::new(ClientState::Unenrolled),
            metrics,
        }
    }

    /// Current lifecycle state, for diagnostics.
    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    fn set_state(&self, state: ClientState) {
        *self.state.write() = state;
    }

    /// Return the usable credential, enrolling with the configured code only
    /// when none is persisted. A valid stored credential short-circuits
    /// without any network call.
    pub async fn ensure_credential(&self) -> Result<Credential, EngineError> {
        if let Some(credential) = self.store.load()? {
            self.set_state(ClientState::Enrolled);
            debug!(instance_id = %credential.instance_id, "using persisted credential");
            return Ok(credential);
        }

        self.set_state(ClientState::Enrolling);
        info!("no credential found; enrolling with the Omnii service");

        let mut backoff = Backoff::from_config(&self.backoff);
        loop {
            match self.api.enroll(&self.enrollment_code).await {
                Ok(enrollment) => {
                    let credential = Credential {
                        instance_id: enrollment.instance_id,
                        token: enrollment.token,
                    };
                    self.store.save(&credential)?;
                    self.set_state(ClientState::Enrolled);
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_enrollment();
                    }
                    info!(instance_id = %credential.instance_id, "enrolled");
                    return Ok(credential);
                }
                Err(RpcError::EnrollmentRejected(reason)) => {
                    self.set_state(ClientState::Unenrolled);
                    return Err(EngineError::EnrollmentRejected(reason));
                }
                Err(RpcError::AuthRejected) => {
                    self.set_state(ClientState::Unenrolled);
                    return Err(EngineError::EnrollmentRejected(
                        "authentication rejected during enrollment".to_owned(),
                    ));
                }
                Err(err) if err.is_transient() => {
                    let attempts = backoff.attempt() + 1;
                    if attempts >= self.backoff.enroll_attempt_cap {
                        warn!(attempts, error = %err, "enrollment retries exhausted");
                        self.set_state(ClientState::Unenrolled);
                        return Err(EngineError::RetriesExhausted {
                            operation: "enrollment",
                            attempts,
                        });
                    }
                    warn!(attempt = attempts, error = %err, "enrollment failed; backing off");
                    backoff.wait().await;
                }
                Err(err) => {
                    self.set_state(ClientState::Unenrolled);
                    return Err(err.into());
                }
            }
        }
    }

    /// Exchange the credential for a fresh session and publish it.
    ///
    /// A successful handshake always supersedes the prior session id. An
    /// `AuthRejected` answer clears the stored credential so the next cycle
    /// enrolls from scratch.
    pub async fn establish(&self, credential: &Credential) -> Result<Session, EngineError> {
        self.set_state(ClientState::Handshaking);

        let mut backoff = Backoff::from_config(&self.backoff);
        loop {
            match self
                .api
                .handshake(&credential.instance_id, &credential.token)
                .await
            {
                Ok(session_id) => {
                    let session = Session::new(session_id);
                    if let Some(previous) = self.holder.publish(session.clone()) {
                        debug!(superseded = %previous.session_id, "prior session discarded");
                    }
                    self.set_state(ClientState::Active);
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_handshake();
                    }
                    info!(session_id = %session.session_id, "session established");
                    return Ok(session);
                }
                Err(RpcError::AuthRejected) => {
                    warn!("token rejected; clearing credential for re-enrollment");
                    self.store.clear()?;
                    self.set_state(ClientState::Unenrolled);
                    return Err(EngineError::AuthRejected);
                }
                Err(err) if err.is_transient() => {
                    let attempts = backoff.attempt() + 1;
                    if attempts >= self.backoff.handshake_attempt_cap {
                        warn!(attempts, error = %err, "handshake retries exhausted");
                        self.set_state(ClientState::Enrolled);
                        return Err(EngineError::RetriesExhausted {
                            operation: "handshake",
                            attempts,
                        });
                    }
                    warn!(attempt = attempts, error = %err, "handshake failed; backing off");
                    backoff.wait().await;
                }
                Err(err) => {
                    self.set_state(ClientState::Enrolled);
                    return Err(err.into());
                }
            }
        }
    }
}
