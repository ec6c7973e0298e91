//! ---
//! omnii_section: "02-session-lifecycle"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Session lifecycle engine for the Omnii connector."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::sync::Arc;

use omnii_rpc::{ComponentKind, UpdateTrigger};
use omnii_supervisor::ManagementApi;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::metrics::SessionMetrics;

type TriggerKey = (ComponentKind, Option<String>);

/// Consumes remote update triggers and drives the local management API.
///
/// The trigger source is an abstract channel: today it is fed from heartbeat
/// acks, but any push or poll mechanism can feed the same queue. Duplicate
/// triggers for a component already mid-update are no-ops, and local API
/// failures never disturb the session loop.
pub struct UpdateTriggerHandler {
    management: Arc<dyn ManagementApi>,
    in_flight: Arc<Mutex<HashSet<TriggerKey>>>,
    metrics: Option<SessionMetrics>,
}

impl UpdateTriggerHandler {
    pub fn new(management: Arc<dyn ManagementApi>, metrics: Option<SessionMetrics>) -> Self {
        Self {
            management,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            metrics,
        }
    }

    pub async fn run(
        self,
        mut triggers: mpsc::Receiver<UpdateTrigger>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                received = triggers.recv() => match received {
                    Some(trigger) => self.handle(trigger),
                    None => break,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Begin the requested update unless that component is already mid-update.
    pub fn handle(&self, trigger: UpdateTrigger) {
        let key = (trigger.kind, trigger.addon_slug.clone());
        if !self.in_flight.lock().insert(key.clone()) {
            debug!(component = %trigger.kind, "update already in flight; ignoring duplicate trigger");
            if let Some(metrics) = &self.metrics {
                metrics.record_trigger(trigger.kind.as_str(), "duplicate");
            }
            return;
        }

        let management = self.management.clone();
        let in_flight = self.in_flight.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            info!(
                component = %trigger.kind,
                slug = trigger.addon_slug.as_deref().unwrap_or(""),
                "starting remotely requested update"
            );
            match management.start_update(&trigger).await {
                Ok(()) => {
                    info!(component = %trigger.kind, "update initiation accepted");
                    if let Some(metrics) = &metrics {
                        metrics.record_trigger(trigger.kind.as_str(), "started");
                    }
                }
                Err(err) => {
                    warn!(component = %trigger.kind, error = %err, "update initiation failed");
                    if let Some(metrics) = &metrics {
                        metrics.record_trigger(trigger.kind.as_str(), "failed");
                    }
                }
            }
            in_flight.lock().remove(&key);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wait_until, FakeManagement};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn core_trigger() -> UpdateTrigger {
        UpdateTrigger {
            kind: ComponentKind::Core,
            addon_slug: None,
        }
    }

    #[tokio::test]
    async fn duplicate_trigger_is_a_noop_while_in_flight() {
        let management = Arc::new(FakeManagement::default());
        let (gate_tx, gate_rx) = watch::channel(false);
        *management.update_gate.lock() = Some(gate_rx);
        let handler = UpdateTriggerHandler::new(management.clone(), None);

        handler.handle(core_trigger());
        let mgmt = management.clone();
        wait_until("the first update call", move || {
            mgmt.update_calls.lock().len() == 1
        })
        .await;

        // Second trigger for the same component while the first is held open.
        handler.handle(core_trigger());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(management.update_calls.lock().len(), 1);

        // After completion the component becomes triggerable again.
        let _ = gate_tx.send(true);
        tokio::time::sleep(Duration::from_millis(50)).await;
        handler.handle(core_trigger());
        let mgmt = management.clone();
        wait_until("the follow-up update call", move || {
            mgmt.update_calls.lock().len() == 2
        })
        .await;
    }

    #[tokio::test]
    async fn distinct_components_update_concurrently() {
        let management = Arc::new(FakeManagement::default());
        let (_gate_tx, gate_rx) = watch::channel(false);
        *management.update_gate.lock() = Some(gate_rx);
        let handler = UpdateTriggerHandler::new(management.clone(), None);

        handler.handle(core_trigger());
        handler.handle(UpdateTrigger {
            kind: ComponentKind::Addon,
            addon_slug: Some("core_ssh".into()),
        });

        let mgmt = management.clone();
        wait_until("both update calls", move || {
            mgmt.update_calls.lock().len() == 2
        })
        .await;
    }

    #[tokio::test]
    async fn failed_initiation_clears_the_in_flight_guard() {
        let management = Arc::new(FakeManagement::default());
        management.fail_updates.store(true, Ordering::SeqCst);
        let handler = UpdateTriggerHandler::new(management.clone(), None);

        handler.handle(core_trigger());
        let mgmt = management.clone();
        wait_until("the failed call to finish", move || {
            mgmt.update_calls.lock().len() == 1
        })
        .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        handler.handle(core_trigger());
        let mgmt = management.clone();
        wait_until("a retriggered call", move || {
            mgmt.update_calls.lock().len() == 2
        })
        .await;
    }

    #[tokio::test]
    async fn run_drains_the_channel_until_shutdown() {
        let management = Arc::new(FakeManagement::default());
        let handler = UpdateTriggerHandler::new(management.clone(), None);
        let (trigger_tx, trigger_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(handler.run(trigger_rx, shutdown_rx));

        trigger_tx.send(core_trigger()).await.unwrap();
        let mgmt = management.clone();
        wait_until("the queued trigger to run", move || {
            mgmt.update_calls.lock().len() == 1
        })
        .await;

        let _ = shutdown_tx.send(true);
        task.await.unwrap();
    }
}
