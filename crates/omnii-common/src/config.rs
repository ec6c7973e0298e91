//! ---
//! omnii_section: "01-core-functionality"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Shared primitives and utilities for the connector runtime."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data")
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_full_info_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_update_report_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_stats_report_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_rpc_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_supervisor_url() -> String {
    "http://supervisor".to_owned()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("/data/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    "0.0.0.0:9090"
        .parse()
        .expect("valid default metrics address")
}

fn default_backoff_initial() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(60)
}

fn default_enroll_attempt_cap() -> u32 {
    5
}

fn default_handshake_attempt_cap() -> u32 {
    10
}

/// Primary configuration object for the connector runtime.
///
/// The canonical source is the add-on options document at
/// `/data/options.json`; only `server_url` and `enrollment_code` are
/// mandatory there, everything else carries a default.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// gRPC endpoint of the Omnii service, e.g. `http://192.168.1.10:50051`.
    pub server_url: String,
    /// One-time enrollment code provisioned by the operator.
    pub enrollment_code: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_heartbeat_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub heartbeat_interval: Duration,
    /// How often a heartbeat carries the full system info payload.
    #[serde(default = "default_full_info_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub full_info_interval: Duration,
    #[serde(default = "default_update_report_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub update_report_interval: Duration,
    #[serde(default = "default_stats_report_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub stats_report_interval: Duration,
    /// Consecutive heartbeat failures tolerated before the session is
    /// declared lost.
    #[serde(default = "default_failure_threshold")]
    pub heartbeat_failure_threshold: u32,
    /// Per-call deadline applied to every RPC.
    #[serde(default = "default_rpc_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub rpc_timeout: Duration,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where a [`ConnectorConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedConnectorConfig {
    pub config: ConnectorConfig,
    pub source: PathBuf,
}

impl ConnectorConfig {
    pub const ENV_CONFIG_PATH: &str = "OMNII_CONFIG";

    /// Load configuration from disk, respecting the `OMNII_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedConnectorConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedConnectorConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedConnectorConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = serde_json::from_str::<ConnectorConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the persisted credential document under the data directory.
    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join("credentials.json")
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            return Err(anyhow!("configuration must set server_url"));
        }
        if self.enrollment_code.trim().is_empty() {
            return Err(anyhow!("configuration must set enrollment_code"));
        }
        if self.heartbeat_failure_threshold == 0 {
            return Err(anyhow!("heartbeat_failure_threshold must be at least 1"));
        }
        for (name, interval) in [
            ("heartbeat_interval", self.heartbeat_interval),
            ("update_report_interval", self.update_report_interval),
            ("stats_report_interval", self.stats_report_interval),
            ("rpc_timeout", self.rpc_timeout),
        ] {
            if interval.is_zero() {
                return Err(anyhow!("{} must be non-zero", name));
            }
        }
        self.backoff.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for ConnectorConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: ConnectorConfig =
            serde_json::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// TLS settings for the Omnii channel. Plaintext when no CA is configured
/// and the endpoint scheme is `http`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TlsConfig {
    /// PEM bundle used to verify the server certificate.
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
    /// Override for the domain name checked against the certificate.
    #[serde(default)]
    pub domain: Option<String>,
}

/// Location of the local management API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_supervisor_url")]
    pub base_url: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            base_url: default_supervisor_url(),
        }
    }
}

/// Retry schedule shared by the enrollment and handshake paths.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_initial")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub initial_delay: Duration,
    #[serde(default = "default_backoff_max")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub max_delay: Duration,
    /// Transient-failure attempts per enrollment cycle.
    #[serde(default = "default_enroll_attempt_cap")]
    pub enroll_attempt_cap: u32,
    /// Transient-failure attempts per handshake cycle.
    #[serde(default = "default_handshake_attempt_cap")]
    pub handshake_attempt_cap: u32,
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay.is_zero() {
            return Err(anyhow!("backoff initial_delay must be non-zero"));
        }
        if self.max_delay < self.initial_delay {
            return Err(anyhow!("backoff max_delay must not undercut initial_delay"));
        }
        if self.enroll_attempt_cap == 0 || self.handshake_attempt_cap == 0 {
            return Err(anyhow!("backoff attempt caps must be at least 1"));
        }
        Ok(())
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_backoff_initial(),
            max_delay: default_backoff_max(),
            enroll_attempt_cap: default_enroll_attempt_cap(),
            handshake_attempt_cap: default_handshake_attempt_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}
