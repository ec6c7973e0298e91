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

use omnii_common::ConnectorConfig;
use omnii_enrollment::EnrollmentStore;
use omnii_rpc::OmniiApi;
use omnii_supervisor::ManagementApi;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::client::SessionClient;
use crate::heartbeat::{HeartbeatScheduler, SessionEvent};
use crate::holder::SessionHolder;
use crate::metrics::SessionMetrics;
use crate::reporter::{StatsReporter, UpdateReporter};
use crate::trigger::UpdateTriggerHandler;
use crate::EngineError;

/// Outer supervision loop of the connector.
///
/// Resolves a credential, establishes a session, then parks until the
/// heartbeat scheduler declares the session lost and re-establishes. The
/// heartbeat, reporting, and trigger loops are spawned once and observe the
/// session holder; they are never restarted per session.
pub struct ConnectorEngine {
    config: ConnectorConfig,
    api: Arc<dyn OmniiApi>,
    management: Arc<dyn ManagementApi>,
    store: EnrollmentStore,
    holder: Arc<SessionHolder>,
    metrics: Option<SessionMetrics>,
}

impl ConnectorEngine {
    pub fn new(
        config: ConnectorConfig,
        api: Arc<dyn OmniiApi>,
        management: Arc<dyn ManagementApi>,
        metrics: Option<SessionMetrics>,
    ) -> Self {
        let store = EnrollmentStore::new(config.credentials_path());
        Self {
            config,
            api,
            management,
            store,
            holder: Arc::new(SessionHolder::new()),
            metrics,
        }
    }

    /// Shared view of the active session, for diagnostics.
    pub fn holder(&self) -> Arc<SessionHolder> {
        self.holder.clone()
    }

    /// Run until the shutdown signal flips or a fatal condition surfaces.
    ///
    /// Temporary unreachability of the Omnii service never terminates the
    /// engine; only enrollment rejection and unrecoverable local failures do.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), EngineError> {
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(8);
        let (trigger_tx, trigger_rx) = mpsc::channel(8);
        // Background loops stop on this internal signal so they also wind
        // down when the supervision loop exits on a fatal error.
        let (stop_tx, stop_rx) = watch::channel(false);

        let heartbeat = HeartbeatScheduler::new(
            self.api.clone(),
            self.management.clone(),
            self.holder.clone(),
            &self.config,
            event_tx,
            trigger_tx,
            self.metrics.clone(),
        );
        let reporter = UpdateReporter::new(
            self.api.clone(),
            self.management.clone(),
            self.holder.clone(),
            &self.config,
            self.metrics.clone(),
        );
        let stats = StatsReporter::new(
            self.api.clone(),
            self.management.clone(),
            self.holder.clone(),
            &self.config,
            self.metrics.clone(),
        );
        let handler = UpdateTriggerHandler::new(self.management.clone(), self.metrics.clone());

        let tasks = vec![
            tokio::spawn(heartbeat.run(stop_rx.clone())),
            tokio::spawn(reporter.run(stop_rx.clone())),
            tokio::spawn(stats.run(stop_rx.clone())),
            tokio::spawn(handler.run(trigger_rx, stop_rx)),
        ];

        let client = SessionClient::new(
            self.api.clone(),
            self.store.clone(),
            self.holder.clone(),
            self.config.enrollment_code.clone(),
            self.config.backoff.clone(),
            self.metrics.clone(),
        );

        let result = self.supervise(&client, event_rx, shutdown).await;

        let _ = stop_tx.send(true);
        for task in tasks {
            let _ = task.await;
        }
        result
    }

    async fn supervise(
        &self,
        client: &SessionClient,
        mut events: mpsc::Receiver<SessionEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), EngineError> {
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let credential = tokio::select! {
                _ = shutdown.changed() => continue,
                resolved = client.ensure_credential() => match resolved {
                    Ok(credential) => credential,
                    Err(EngineError::RetriesExhausted { operation, attempts }) => {
                        warn!(operation, attempts, "bounded retries exhausted; cooling down");
                        self.cooldown(&mut shutdown).await;
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            };

            let session = tokio::select! {
                _ = shutdown.changed() => continue,
                established = client.establish(&credential) => match established {
                    Ok(session) => session,
                    Err(EngineError::AuthRejected) => {
                        info!("credential cleared; enrolling again");
                        continue;
                    }
                    Err(EngineError::RetriesExhausted { operation, attempts }) => {
                        warn!(operation, attempts, "bounded retries exhausted; cooling down");
                        self.cooldown(&mut shutdown).await;
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            };

            info!(session_id = %session.session_id, "connector active");

            // Park until this session is lost or shutdown is requested.
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return Ok(());
                        }
                    }
                    event = events.recv() => match event {
                        Some(SessionEvent::Lost { session_id, reason }) => {
                            if session_id != session.session_id {
                                // Late notice about an already superseded session.
                                continue;
                            }
                            info!(reason = reason.as_str(), "session lost; reconnecting");
                            break;
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    async fn cooldown(&self, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(self.config.backoff.max_delay) => {}
            _ = shutdown.changed() => {}
        }
    }
}
