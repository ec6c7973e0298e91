//! ---
//! omnii_section: "02-session-lifecycle"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Session lifecycle engine for the Omnii connector."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
use anyhow::Result;
use omnii_metrics::SharedRegistry;
use prometheus::{IntCounter, IntCounterVec, Opts};

/// Metrics published by the session lifecycle engine.
#[derive(Clone)]
pub struct SessionMetrics {
    registry: SharedRegistry,
    enrollments_total: IntCounter,
    handshakes_total: IntCounter,
    heartbeats_total: IntCounterVec,
    sessions_lost_total: IntCounterVec,
    update_reports_total: IntCounterVec,
    stats_reports_total: IntCounterVec,
    triggers_total: IntCounterVec,
}

impl SessionMetrics {
    /// Register the session metric family against the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let enrollments_total = IntCounter::with_opts(Opts::new(
            "omnii_enrollments_total",
            "Successful enrollments performed against the Omnii service",
        ))?;
        registry.register(Box::new(enrollments_total.clone()))?;

        let handshakes_total = IntCounter::with_opts(Opts::new(
            "omnii_handshakes_total",
            "Successful handshakes establishing a session",
        ))?;
        registry.register(Box::new(handshakes_total.clone()))?;

        let heartbeats_total = IntCounterVec::new(
            Opts::new(
                "omnii_heartbeats_total",
                "Heartbeat attempts by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(heartbeats_total.clone()))?;

        let sessions_lost_total = IntCounterVec::new(
            Opts::new(
                "omnii_sessions_lost_total",
                "Sessions declared lost by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(sessions_lost_total.clone()))?;

        let update_reports_total = IntCounterVec::new(
            Opts::new(
                "omnii_update_reports_total",
                "Update report cycles by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(update_reports_total.clone()))?;

        let stats_reports_total = IntCounterVec::new(
            Opts::new(
                "omnii_stats_reports_total",
                "Stats report cycles by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(stats_reports_total.clone()))?;

        let triggers_total = IntCounterVec::new(
            Opts::new(
                "omnii_update_triggers_total",
                "Remote update triggers by component and outcome",
            ),
            &["component", "outcome"],
        )?;
        registry.register(Box::new(triggers_total.clone()))?;

        Ok(Self {
            registry,
            enrollments_total,
            handshakes_total,
            heartbeats_total,
            sessions_lost_total,
            update_reports_total,
            stats_reports_total,
            triggers_total,
        })
    }

    /// Expose the underlying shared registry for convenience.
    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_enrollment(&self) {
        self.enrollments_total.inc();
    }

    pub fn inc_handshake(&self) {
        self.handshakes_total.inc();
    }

    pub fn record_heartbeat(&self, outcome: &str) {
        self.heartbeats_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_session_lost(&self, reason: &str) {
        self.sessions_lost_total.with_label_values(&[reason]).inc();
    }

    pub fn record_update_report(&self, outcome: &str) {
        self.update_reports_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_stats_report(&self, outcome: &str) {
        self.stats_reports_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_trigger(&self, component: &str, outcome: &str) {
        self.triggers_total
            .with_label_values(&[component, outcome])
            .inc();
    }
}

impl std::fmt::Debug for SessionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMetrics").finish_non_exhaustive()
    }
}
