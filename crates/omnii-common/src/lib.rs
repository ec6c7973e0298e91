//! ---
//! omnii_section: "01-core-functionality"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Shared primitives and utilities for the connector runtime."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
//! Core shared primitives for the Omnii connector workspace.
//! This crate exposes configuration loading, logging, and version
//! metadata utilities consumed across the workspace.

pub mod config;
pub mod logging;
pub mod version;

pub use config::{
    BackoffConfig, ConnectorConfig, LoadedConnectorConfig, LoggingConfig, MetricsConfig,
    SupervisorConfig, TlsConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use version::VersionInfo;
