//! ---
//! omnii_section: "05-networking-external-interfaces"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Protocol definitions and gRPC client for the Omnii service."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
use tonic::Code;

/// Failure classes surfaced by calls against the Omnii service.
///
/// Each scheduling loop handles its own transient class locally; only the
/// non-retryable variants propagate to the engine's state transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// Network-level or server-side hiccup worth retrying under backoff.
    #[error("transient rpc failure: {0}")]
    Transient(String),
    /// The stored token is no longer accepted; forces re-enrollment.
    #[error("authentication rejected by the server")]
    AuthRejected,
    /// The enrollment code is invalid or expired; surfaced to the operator.
    #[error("enrollment rejected: {0}")]
    EnrollmentRejected(String),
    /// The server no longer recognises the session id.
    #[error("session no longer valid")]
    SessionInvalid,
    /// The configured endpoint cannot be used at all.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl RpcError {
    /// Whether the failure is expected to clear on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::Transient(_))
    }
}

impl From<tonic::Status> for RpcError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            Code::Unauthenticated | Code::PermissionDenied => RpcError::AuthRejected,
            Code::FailedPrecondition => RpcError::SessionInvalid,
            code => RpcError::Transient(format!("{}: {}", code, status.message())),
        }
    }
}

impl From<tonic::transport::Error> for RpcError {
    fn from(err: tonic::transport::Error) -> Self {
        RpcError::Transient(err.to_string())
    }
}
