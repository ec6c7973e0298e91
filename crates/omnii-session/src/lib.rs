//! ---
//! omnii_section: "02-session-lifecycle"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Session lifecycle engine for the Omnii connector."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
//! The session lifecycle engine: enrollment, handshake, heartbeat keep-alive
//! with failure detection, update/stats reporting, and remote update trigger
//! handling. Everything here is transport-agnostic; the wire lives behind
//! the [`omnii_rpc::OmniiApi`] and [`omnii_supervisor::ManagementApi`] seams.

use omnii_enrollment::EnrollmentError;
use omnii_rpc::RpcError;

/// Error type for the session engine.
///
/// Transient RPC failures never surface here; each loop retires its own
/// class locally and only non-recoverable conditions reach the binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The enrollment code was refused by the server. Fatal; the operator
    /// must provision a fresh code.
    #[error("enrollment rejected: {0}")]
    EnrollmentRejected(String),
    /// The persisted token was refused. The credential has been cleared and
    /// the next cycle enrolls from scratch.
    #[error("authentication rejected; credential cleared")]
    AuthRejected,
    /// A bounded retry loop ran out of attempts and escalates to the
    /// enclosing state transition.
    #[error("{operation} retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
    },
    /// Non-transient RPC failure (e.g. an unusable endpoint).
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// Credential store failure.
    #[error(transparent)]
    Store(#[from] EnrollmentError),
}

pub mod backoff;
pub mod client;
pub mod engine;
pub mod heartbeat;
pub mod holder;
pub mod metrics;
pub mod reporter;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::Backoff;
pub use client::{ClientState, SessionClient};
pub use engine::ConnectorEngine;
pub use heartbeat::{HeartbeatScheduler, LossReason, SessionEvent};
pub use holder::{Session, SessionHolder};
pub use metrics::SessionMetrics;
pub use reporter::{StatsReporter, UpdateReporter};
pub use trigger::UpdateTriggerHandler;
