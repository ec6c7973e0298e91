//! ---
//! omnii_section: "03-persistence-logging"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Enrollment persistence and credential storage."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Persistence of the enrollment credential across restarts.
//!
//! The credential is the only durable state the connector owns. Writes are
//! atomic (temp file + rename) so a crash mid-save can never leave a
//! half-written document that later loads as valid.

/// Result alias used throughout the enrollment crate.
pub type Result<T> = std::result::Result<T, EnrollmentError>;

/// Error type for the enrollment persistence subsystem.
#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    /// Wrapper for IO errors encountered while reading/writing the store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub mod store;

pub use store::{Credential, EnrollmentStore};
