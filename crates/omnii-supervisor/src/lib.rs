//! ---
//! omnii_section: "05-networking-external-interfaces"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Client for the local management API."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
//! Access to the local management API: component version facts, host system
//! info, core runtime stats, and update initiation. The connector never
//! performs updates itself; it only asks this API to start them.

use async_trait::async_trait;
use omnii_rpc::{ComponentUpdate, CoreStats, SystemInfo, UpdateTrigger};

/// Result alias used throughout the supervisor crate.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Error type for local management API calls.
///
/// These failures are logged and counted but never affect session state.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The API answered but reported an error envelope.
    #[error("management api error: {0}")]
    Api(String),
    /// No access token was supplied via `SUPERVISOR_TOKEN`.
    #[error("SUPERVISOR_TOKEN is not set")]
    MissingToken,
}

/// Facts and actions the session engine needs from the local platform.
///
/// The HTTP client below is the production path; tests substitute in-memory
/// fakes behind the same trait.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Current host and platform facts for full-info heartbeats.
    async fn system_info(&self) -> Result<SystemInfo>;
    /// Update status of supervisor, core, OS, and every installed add-on.
    async fn update_components(&self) -> Result<Vec<ComponentUpdate>>;
    /// Resource statistics of the core runtime container.
    async fn core_stats(&self) -> Result<CoreStats>;
    /// Ask the platform to begin updating the triggered component.
    async fn start_update(&self, trigger: &UpdateTrigger) -> Result<()>;
}

pub mod client;

pub use client::SupervisorClient;
