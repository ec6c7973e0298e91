//! ---
//! omnii_section: "05-networking-external-interfaces"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Protocol definitions and gRPC client for the Omnii service."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};

use crate::proto;

/// Kind of a locally managed component tracked in update reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Supervisor,
    Core,
    Os,
    Addon,
}

impl ComponentKind {
    /// Stable lower-case name used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Supervisor => "supervisor",
            ComponentKind::Core => "core",
            ComponentKind::Os => "os",
            ComponentKind::Addon => "addon",
        }
    }

    pub(crate) fn from_proto(kind: proto::ComponentKind) -> Option<Self> {
        match kind {
            proto::ComponentKind::Supervisor => Some(ComponentKind::Supervisor),
            proto::ComponentKind::Core => Some(ComponentKind::Core),
            proto::ComponentKind::Os => Some(ComponentKind::Os),
            proto::ComponentKind::Addon => Some(ComponentKind::Addon),
            proto::ComponentKind::Unspecified => None,
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ComponentKind> for proto::ComponentKind {
    fn from(kind: ComponentKind) -> Self {
        match kind {
            ComponentKind::Supervisor => proto::ComponentKind::Supervisor,
            ComponentKind::Core => proto::ComponentKind::Core,
            ComponentKind::Os => proto::ComponentKind::Os,
            ComponentKind::Addon => proto::ComponentKind::Addon,
        }
    }
}

/// Update status of a single tracked component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentUpdate {
    pub kind: ComponentKind,
    /// Add-on slug; only meaningful when `kind` is [`ComponentKind::Addon`].
    pub slug: Option<String>,
    pub name: Option<String>,
    pub version: String,
    pub version_latest: String,
    pub update_available: bool,
}

impl ComponentUpdate {
    /// Build a component record, deriving availability from the version pair.
    pub fn new(
        kind: ComponentKind,
        version: impl Into<String>,
        version_latest: impl Into<String>,
    ) -> Self {
        let version = version.into();
        let version_latest = version_latest.into();
        let update_available = version != version_latest;
        Self {
            kind,
            slug: None,
            name: None,
            version,
            version_latest,
            update_available,
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override availability when the source of truth declares it explicitly.
    pub fn with_declared_availability(mut self, available: bool) -> Self {
        self.update_available = available;
        self
    }
}

impl From<ComponentUpdate> for proto::ComponentUpdate {
    fn from(value: ComponentUpdate) -> Self {
        Self {
            kind: proto::ComponentKind::from(value.kind) as i32,
            slug: value.slug.unwrap_or_default(),
            name: value.name.unwrap_or_default(),
            version: value.version,
            version_latest: value.version_latest,
            update_available: value.update_available,
        }
    }
}

/// Host and platform facts attached to full-info heartbeats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemInfo {
    pub supervisor_version: String,
    pub core_version: String,
    pub os_version: String,
    pub docker_version: String,
    pub hostname: String,
    pub operating_system: String,
    pub machine: String,
    pub arch: String,
    pub channel: String,
    pub state: String,
}

impl From<SystemInfo> for proto::SystemInfo {
    fn from(value: SystemInfo) -> Self {
        Self {
            supervisor_version: value.supervisor_version,
            core_version: value.core_version,
            os_version: value.os_version,
            docker_version: value.docker_version,
            hostname: value.hostname,
            operating_system: value.operating_system,
            machine: value.machine,
            arch: value.arch,
            channel: value.channel,
            state: value.state,
        }
    }
}

/// Resource statistics of the core runtime container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreStats {
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub network_tx: u64,
    pub network_rx: u64,
    pub blk_read: u64,
    pub blk_write: u64,
}

impl From<CoreStats> for proto::CoreStats {
    fn from(value: CoreStats) -> Self {
        Self {
            cpu_percent: value.cpu_percent,
            memory_usage: value.memory_usage,
            memory_limit: value.memory_limit,
            memory_percent: value.memory_percent,
            network_tx: value.network_tx,
            network_rx: value.network_rx,
            blk_read: value.blk_read,
            blk_write: value.blk_write,
        }
    }
}

/// Snapshot of component update status, assembled fresh for every send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub generated_at: DateTime<Utc>,
    /// Insertion order is preserved on the wire.
    pub components: Vec<ComponentUpdate>,
}

impl UpdateReport {
    /// Assemble a report stamped with the current time.
    pub fn new(components: Vec<ComponentUpdate>) -> Self {
        Self {
            generated_at: Utc::now(),
            components,
        }
    }
}

impl From<UpdateReport> for proto::UpdateReport {
    fn from(value: UpdateReport) -> Self {
        Self {
            generated_at: value.generated_at.timestamp(),
            components: value.components.into_iter().map(Into::into).collect(),
        }
    }
}

/// Stats snapshot sent on its own cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsReport {
    pub generated_at: DateTime<Utc>,
    pub stats: CoreStats,
}

impl StatsReport {
    pub fn new(stats: CoreStats) -> Self {
        Self {
            generated_at: Utc::now(),
            stats,
        }
    }
}

impl From<StatsReport> for proto::StatsReport {
    fn from(value: StatsReport) -> Self {
        Self {
            generated_at: value.generated_at.timestamp(),
            stats: Some(value.stats.into()),
        }
    }
}

/// Remote request that a component begin updating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTrigger {
    pub kind: ComponentKind,
    /// Required when `kind` is [`ComponentKind::Addon`].
    pub addon_slug: Option<String>,
}

impl UpdateTrigger {
    /// Decode a wire trigger, dropping payloads with no usable kind.
    pub fn from_proto(value: proto::UpdateTrigger) -> Option<Self> {
        let kind = ComponentKind::from_proto(value.kind())?;
        let addon_slug = if value.addon_slug.is_empty() {
            None
        } else {
            Some(value.addon_slug)
        };
        Some(Self { kind, addon_slug })
    }
}

/// Credential issued by a successful enrollment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub instance_id: String,
    pub token: String,
}

/// Acknowledgement of a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatAck {
    pub alive: bool,
    pub latency_ms: i64,
    pub pending_update: Option<UpdateTrigger>,
}

/// Acknowledgement of an update or stats report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportAck {
    pub accepted: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_derived_from_version_pair() {
        let behind = ComponentUpdate::new(ComponentKind::Supervisor, "2025.1.0", "2025.1.1");
        assert!(behind.update_available);

        let current = ComponentUpdate::new(ComponentKind::Core, "2025.1.1", "2025.1.1");
        assert!(!current.update_available);
    }

    #[test]
    fn declared_availability_overrides_derivation() {
        let pinned = ComponentUpdate::new(ComponentKind::Os, "11.0", "12.0")
            .with_declared_availability(false);
        assert!(!pinned.update_available);
    }

    #[test]
    fn addon_update_round_trips_to_proto() {
        let addon = ComponentUpdate::new(ComponentKind::Addon, "1.2.0", "1.3.0")
            .with_slug("core_mosquitto")
            .with_name("Mosquitto broker");
        let wire: proto::ComponentUpdate = addon.into();
        assert_eq!(wire.kind(), proto::ComponentKind::Addon);
        assert_eq!(wire.slug, "core_mosquitto");
        assert!(wire.update_available);
    }

    #[test]
    fn report_preserves_component_order() {
        let report = UpdateReport::new(vec![
            ComponentUpdate::new(ComponentKind::Supervisor, "a", "b"),
            ComponentUpdate::new(ComponentKind::Core, "c", "c"),
            ComponentUpdate::new(ComponentKind::Addon, "d", "e").with_slug("slug"),
        ]);
        let wire: proto::UpdateReport = report.into();
        let kinds: Vec<_> = wire.components.iter().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                proto::ComponentKind::Supervisor,
                proto::ComponentKind::Core,
                proto::ComponentKind::Addon
            ]
        );
    }

    #[test]
    fn unspecified_trigger_kind_is_dropped() {
        let wire = proto::UpdateTrigger {
            kind: proto::ComponentKind::Unspecified as i32,
            addon_slug: String::new(),
        };
        assert!(UpdateTrigger::from_proto(wire).is_none());

        let wire = proto::UpdateTrigger {
            kind: proto::ComponentKind::Addon as i32,
            addon_slug: "core_ssh".into(),
        };
        let trigger = UpdateTrigger::from_proto(wire).unwrap();
        assert_eq!(trigger.kind, ComponentKind::Addon);
        assert_eq!(trigger.addon_slug.as_deref(), Some("core_ssh"));
    }
}
