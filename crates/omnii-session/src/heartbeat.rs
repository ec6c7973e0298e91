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
use std::time::{Duration, Instant};

use omnii_common::ConnectorConfig;
use omnii_rpc::{OmniiApi, RpcError, SystemInfo, UpdateTrigger};
use omnii_supervisor::ManagementApi;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::holder::{Session, SessionHolder};
use crate::metrics::SessionMetrics;

/// Why a session was declared lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossReason {
    /// The consecutive-failure threshold was reached.
    FailureThreshold,
    /// The server explicitly declared the session dead.
    Declared,
    /// The server stopped accepting the token mid-session.
    AuthRejected,
}

impl LossReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LossReason::FailureThreshold => "threshold",
            LossReason::Declared => "declared",
            LossReason::AuthRejected => "auth",
        }
    }
}

/// Event emitted towards the engine's supervision loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The named session is gone; the holder has already been cleared.
    Lost {
        session_id: String,
        reason: LossReason,
    },
}

/// Periodic keep-alive loop with failure detection.
///
/// Sends a heartbeat per tick while a session is active. Transient failures
/// accumulate towards the configured threshold; an explicit "not alive" ack
/// declares the session lost immediately. Trigger indications embedded in
/// acks are forwarded without blocking the next tick.
pub struct HeartbeatScheduler {
    api: Arc<dyn OmniiApi>,
    management: Arc<dyn ManagementApi>,
    holder: Arc<SessionHolder>,
    interval: Duration,
    full_info_interval: Duration,
    failure_threshold: u32,
    events: mpsc::Sender<SessionEvent>,
    triggers: mpsc::Sender<UpdateTrigger>,
    metrics: Option<SessionMetrics>,
}

impl HeartbeatScheduler {
    pub fn new(
        api: Arc<dyn OmniiApi>,
        management: Arc<dyn ManagementApi>,
        holder: Arc<SessionHolder>,
        config: &ConnectorConfig,
        events: mpsc::Sender<SessionEvent>,
        triggers: mpsc::Sender<UpdateTrigger>,
        metrics: Option<SessionMetrics>,
    ) -> Self {
        Self {
            api,
            management,
            holder,
            interval: config.heartbeat_interval,
            full_info_interval: config.full_info_interval,
            failure_threshold: config.heartbeat_failure_threshold,
            events,
            triggers,
            metrics,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut failures = 0u32;
        let mut last_full_info: Option<Instant> = None;
        let mut beating_session: Option<String> = None;

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
                failures = 0;
                beating_session = None;
                continue;
            };
            if beating_session.as_deref() != Some(session.session_id.as_str()) {
                beating_session = Some(session.session_id.clone());
                failures = 0;
                // A fresh session always opens with a full-info heartbeat.
                last_full_info = None;
            }

            let wants_full_info =
                last_full_info.map_or(true, |at| at.elapsed() >= self.full_info_interval);
            let system_info = if wants_full_info {
                self.gather_system_info().await
            } else {
                None
            };
            let carried_full_info = system_info.is_some();

            match self.api.heartbeat(&session.session_id, system_info).await {
                Ok(ack) if ack.alive => {
                    failures = 0;
                    if carried_full_info {
                        last_full_info = Some(Instant::now());
                    }
                    if ack.latency_ms > 0 {
                        debug!(latency_ms = ack.latency_ms, "heartbeat acknowledged");
                    }
                    if let Some(metrics) = &self.metrics {
                        metrics.record_heartbeat("ok");
                    }
                    if let Some(trigger) = ack.pending_update {
                        info!(component = %trigger.kind, "server requested a component update");
                        if self.triggers.try_send(trigger).is_err() {
                            warn!("trigger queue full; dropping request");
                        }
                    }
                }
                Ok(_) => {
                    warn!(session_id = %session.session_id, "server no longer recognises the session");
                    failures = 0;
                    self.declare_lost(&session, LossReason::Declared).await;
                }
                Err(RpcError::SessionInvalid) => {
                    warn!(session_id = %session.session_id, "session declared invalid");
                    failures = 0;
                    self.declare_lost(&session, LossReason::Declared).await;
                }
                Err(RpcError::AuthRejected) => {
                    warn!("heartbeat authentication rejected");
                    failures = 0;
                    self.declare_lost(&session, LossReason::AuthRejected).await;
                }
                Err(err) => {
                    failures += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_heartbeat("failed");
                    }
                    warn!(
                        failures,
                        threshold = self.failure_threshold,
                        error = %err,
                        "heartbeat failed"
                    );
                    if failures >= self.failure_threshold {
                        failures = 0;
                        self.declare_lost(&session, LossReason::FailureThreshold)
                            .await;
                    }
                }
            }
        }
    }

    async fn gather_system_info(&self) -> Option<SystemInfo> {
        match self.management.system_info().await {
            Ok(info) => Some(info),
            Err(err) => {
                debug!(error = %err, "system info unavailable; sending minimal heartbeat");
                None
            }
        }
    }

    async fn declare_lost(&self, session: &Session, reason: LossReason) {
        self.holder.clear_if(&session.session_id);
        if let Some(metrics) = &self.metrics {
            metrics.record_session_lost(reason.as_str());
        }
        let event = SessionEvent::Lost {
            session_id: session.session_id.clone(),
            reason,
        };
        if self.events.send(event).await.is_err() {
            debug!("engine event channel closed");
        }
    }
}
