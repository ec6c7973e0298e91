//! ---
//! omnii_section: "05-networking-external-interfaces"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Client for the local management API."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use omnii_common::SupervisorConfig;
use omnii_rpc::{ComponentKind, ComponentUpdate, CoreStats, SystemInfo, UpdateTrigger};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{ManagementApi, Result, SupervisorError};

/// Environment variable carrying the management API access token.
pub const TOKEN_ENV: &str = "SUPERVISOR_TOKEN";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
// Update installation can run for minutes; give the initiation call headroom.
const UPDATE_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client for the local management API.
pub struct SupervisorClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl SupervisorClient {
    /// Build a client from configuration, taking the token from the process
    /// environment. A missing token is tolerated at construction; calls will
    /// fail with [`SupervisorError::MissingToken`] until it is provided.
    pub fn from_config(config: &SupervisorConfig) -> Result<Self> {
        let token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty());
        if token.is_none() {
            warn!("{} is not set; management API calls will fail", TOKEN_ENV);
        }
        Ok(Self::new(config.base_url.clone(), token))
    }

    /// Build a client with an explicit token (or none).
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("default reqwest client construction cannot fail");
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token,
            http,
        }
    }

    fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or(SupervisorError::MissingToken)
    }

    async fn fetch_data<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let token = self.token()?;
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;

        let envelope: Envelope<T> = response.json().await?;
        envelope.into_data(path)
    }

    fn update_path(trigger: &UpdateTrigger) -> Result<String> {
        let path = match trigger.kind {
            ComponentKind::Supervisor => "/supervisor/update".to_owned(),
            ComponentKind::Core => "/core/update".to_owned(),
            ComponentKind::Os => "/os/update".to_owned(),
            ComponentKind::Addon => {
                let slug = trigger
                    .addon_slug
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        SupervisorError::Api("addon update requires a slug".to_owned())
                    })?;
                format!("/addons/{}/update", slug)
            }
        };
        Ok(path)
    }
}

#[async_trait]
impl ManagementApi for SupervisorClient {
    async fn system_info(&self) -> Result<SystemInfo> {
        let raw: RawHostInfo = self.fetch_data("/info").await?;
        Ok(raw.into())
    }

    async fn update_components(&self) -> Result<Vec<ComponentUpdate>> {
        let mut components = Vec::new();

        for (path, kind, display) in [
            ("/supervisor/info", ComponentKind::Supervisor, "Supervisor"),
            ("/core/info", ComponentKind::Core, "Core"),
            ("/os/info", ComponentKind::Os, "Operating System"),
        ] {
            match self.fetch_data::<RawComponentInfo>(path).await {
                Ok(raw) => components.push(raw.into_component(kind, display)),
                Err(SupervisorError::MissingToken) => return Err(SupervisorError::MissingToken),
                Err(err) => {
                    warn!(path, error = %err, "component info unavailable; skipping");
                }
            }
        }

        match self.fetch_data::<RawAddonList>("/addons").await {
            Ok(list) => {
                for addon in list.addons {
                    components.push(addon.into_component());
                }
            }
            Err(SupervisorError::MissingToken) => return Err(SupervisorError::MissingToken),
            Err(err) => {
                warn!(error = %err, "addon list unavailable; skipping");
            }
        }

        Ok(components)
    }

    async fn core_stats(&self) -> Result<CoreStats> {
        let raw: RawCoreStats = self.fetch_data("/core/stats").await?;
        Ok(raw.into())
    }

    async fn start_update(&self, trigger: &UpdateTrigger) -> Result<()> {
        let token = self.token()?;
        let path = Self::update_path(trigger)?;
        debug!(component = %trigger.kind, slug = trigger.addon_slug.as_deref().unwrap_or(""), "requesting component update");

        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .timeout(UPDATE_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        let envelope: Envelope<serde_json::Value> = response.json().await?;
        if envelope.result != "ok" {
            return Err(SupervisorError::Api(
                envelope
                    .message
                    .unwrap_or_else(|| "update initiation refused".to_owned()),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    result: String,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

impl<T> Envelope<T> {
    fn into_data(self, path: &str) -> Result<T> {
        if self.result != "ok" {
            return Err(SupervisorError::Api(
                self.message
                    .unwrap_or_else(|| format!("error envelope from {}", path)),
            ));
        }
        self.data
            .ok_or_else(|| SupervisorError::Api(format!("empty data envelope from {}", path)))
    }
}

#[derive(Debug, Deserialize)]
struct RawHostInfo {
    #[serde(default)]
    supervisor: String,
    #[serde(default)]
    core: String,
    #[serde(default)]
    os: String,
    #[serde(default)]
    docker: String,
    #[serde(default)]
    hostname: String,
    #[serde(default)]
    operating_system: String,
    #[serde(default)]
    machine: String,
    #[serde(default)]
    arch: String,
    #[serde(default)]
    channel: String,
    #[serde(default)]
    state: String,
}

impl From<RawHostInfo> for SystemInfo {
    fn from(raw: RawHostInfo) -> Self {
        SystemInfo {
            supervisor_version: raw.supervisor,
            core_version: raw.core,
            os_version: raw.os,
            docker_version: raw.docker,
            hostname: raw.hostname,
            operating_system: raw.operating_system,
            machine: raw.machine,
            arch: raw.arch,
            channel: raw.channel,
            state: raw.state,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawComponentInfo {
    #[serde(default)]
    version: String,
    #[serde(default)]
    version_latest: String,
    #[serde(default)]
    update_available: Option<bool>,
}

impl RawComponentInfo {
    fn into_component(self, kind: ComponentKind, display: &str) -> ComponentUpdate {
        let mut component =
            ComponentUpdate::new(kind, self.version, self.version_latest).with_name(display);
        if let Some(declared) = self.update_available {
            component = component.with_declared_availability(declared);
        }
        component
    }
}

#[derive(Debug, Deserialize)]
struct RawAddonList {
    #[serde(default)]
    addons: Vec<RawAddon>,
}

#[derive(Debug, Deserialize)]
struct RawAddon {
    #[serde(default)]
    slug: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    version_latest: String,
    #[serde(default)]
    update_available: Option<bool>,
}

impl RawAddon {
    fn into_component(self) -> ComponentUpdate {
        let mut component = ComponentUpdate::new(
            ComponentKind::Addon,
            self.version,
            self.version_latest,
        )
        .with_slug(self.slug)
        .with_name(self.name);
        if let Some(declared) = self.update_available {
            component = component.with_declared_availability(declared);
        }
        component
    }
}

#[derive(Debug, Deserialize)]
struct RawCoreStats {
    #[serde(default)]
    cpu_percent: f64,
    #[serde(default)]
    memory_usage: u64,
    #[serde(default)]
    memory_limit: u64,
    #[serde(default)]
    memory_percent: f64,
    #[serde(default)]
    network_tx: u64,
    #[serde(default)]
    network_rx: u64,
    #[serde(default)]
    blk_read: u64,
    #[serde(default)]
    blk_write: u64,
}

impl From<RawCoreStats> for CoreStats {
    fn from(raw: RawCoreStats) -> Self {
        CoreStats {
            cpu_percent: raw.cpu_percent,
            memory_usage: raw.memory_usage,
            memory_limit: raw.memory_limit,
            memory_percent: raw.memory_percent,
            network_tx: raw.network_tx,
            network_rx: raw.network_rx,
            blk_read: raw.blk_read,
            blk_write: raw.blk_write,
        }
    }
}
