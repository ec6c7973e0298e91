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
use std::time::Duration;

use omnii_common::ConnectorConfig;
use omnii_rpc::{OmniiApi, RpcError, StatsReport, UpdateReport};
use omnii_supervisor::ManagementApi;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::holder::SessionHolder;
use crate::metrics::SessionMetrics;

/// Periodic update-status reporting with single-slot deferral.
///
/// Reports are assembled fresh every cycle. When no session is active the
/// newest report is kept aside and flushed the moment the session holder
/// turns active again; an older deferred report is superseded, never
/// accumulated. Transient send failures wait for the next scheduled cycle.
pub struct UpdateReporter {
    api: Arc<dyn OmniiApi>,
    management: Arc<dyn ManagementApi>,
    holder: Arc<SessionHolder>,
    interval: Duration,
    metrics: Option<SessionMetrics>,
}

impl UpdateReporter {
    pub fn new(
        api: Arc<dyn OmniiApi>,
        management: Arc<dyn ManagementApi>,
        holder: Arc<SessionHolder>,
        config: &ConnectorConfig,
        metrics: Option<SessionMetrics>,
    ) -> Self {
        Self {
            api,
            management,
            holder,
            interval: config.update_report_interval,
            metrics,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut session_rx = self.holder.subscribe();
        let mut deferred: Option<UpdateReport> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(report) = self.build_report().await else {
                        continue;
                    };
                    let superseding = deferred.take().is_some();
                    deferred = self.dispatch(report).await;
                    if superseding && deferred.is_some() {
                        debug!("deferred report superseded by newer snapshot");
                    }
                }
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let became_active = session_rx.borrow_and_update().is_some();
                    if became_active {
                        if let Some(report) = deferred.take() {
                            info!("session active again; flushing deferred update report");
                            deferred = self.dispatch(report).await;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn build_report(&self) -> Option<UpdateReport> {
        match self.management.update_components().await {
            Ok(components) => Some(UpdateReport::new(components)),
            Err(err) => {
                warn!(error = %err, "unable to gather component update facts");
                self.record("gather-failed");
                None
            }
        }
    }

    /// Send the report now or hand it back for deferral.
    async fn dispatch(&self, report: UpdateReport) -> Option<UpdateReport> {
        let Some(session) = self.holder.current() else {
            info!(
                components = report.components.len(),
                "no active session; deferring update report"
            );
            self.record("deferred");
            return Some(report);
        };

        match self
            .api
            .report_updates(&session.session_id, report.clone())
            .await
        {
            Ok(ack) if ack.accepted => {
                info!(components = report.components.len(), "update report accepted");
                self.record("sent");
                None
            }
            Ok(ack) => {
                warn!(message = %ack.message, "update report rejected");
                self.record("rejected");
                None
            }
            Err(RpcError::SessionInvalid) => {
                debug!("session vanished mid-report; deferring");
                self.record("deferred");
                Some(report)
            }
            Err(err) => {
                warn!(error = %err, "update report failed; retrying next cycle");
                self.record("failed");
                None
            }
        }
    }

    fn record(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_update_report(outcome);
        }
    }
}

/// Core runtime stats reporting on its own cadence.
///
/// Stats are ephemeral: a cycle without an active session or without stats
/// from the management API is skipped rather than deferred.
pub struct StatsReporter {
    api: Arc<dyn OmniiApi>,
    management: Arc<dyn ManagementApi>,
    holder: Arc<SessionHolder>,
    interval: Duration,
    metrics: Option<SessionMetrics>,
}

impl StatsReporter {
    pub fn new(
        api: Arc<dyn OmniiApi>,
        management: Arc<dyn ManagementApi>,
        holder: Arc<SessionHolder>,
        config: &ConnectorConfig,
        metrics: Option<SessionMetrics>,
    ) -> Self {
        Self {
            api,
            management,
            holder,
            interval: config.stats_report_interval,
            metrics,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let Some(session) = self.holder.current() else {
                continue;
            };
            let stats = match self.management.core_stats().await {
                Ok(stats) => stats,
                Err(err) => {
                    debug!(error = %err, "core stats unavailable; skipping cycle");
                    continue;
                }
            };

            match self
                .api
                .report_stats(&session.session_id, StatsReport::new(stats))
                .await
            {
                Ok(ack) if ack.accepted => {
                    debug!("stats report accepted");
                    self.record("sent");
                }
                Ok(ack) => {
                    warn!(message = %ack.message, "stats report rejected");
                    self.record("rejected");
                }
                Err(err) => {
                    warn!(error = %err, "stats report failed; retrying next cycle");
                    self.record("failed");
                }
            }
        }
    }

    fn record(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_stats_report(outcome);
        }
    }
}
