//! ---
//! omnii_section: "02-session-lifecycle"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Session lifecycle engine for the Omnii connector."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
//! Scriptable fakes for the `OmniiApi` and `ManagementApi` seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use omnii_rpc::{
    ComponentUpdate, CoreStats, Enrollment, HeartbeatAck, OmniiApi, ReportAck, RpcError,
    StatsReport, SystemInfo, UpdateReport, UpdateTrigger,
};
use omnii_supervisor::{ManagementApi, Result as SupervisorResult, SupervisorError};
use parking_lot::Mutex;
use tokio::sync::watch;

/// Fake Omnii service: each call pops a scripted response, falling back to a
/// benign default once the script is exhausted.
#[derive(Default)]
pub(crate) struct ScriptedApi {
    pub enroll_script: Mutex<VecDeque<Result<Enrollment, RpcError>>>,
    pub handshake_script: Mutex<VecDeque<Result<String, RpcError>>>,
    pub heartbeat_script: Mutex<VecDeque<Result<HeartbeatAck, RpcError>>>,
    pub report_script: Mutex<VecDeque<Result<ReportAck, RpcError>>>,
    pub enroll_calls: AtomicU32,
    pub handshake_calls: AtomicU32,
    pub heartbeat_calls: AtomicU32,
    pub stats_calls: AtomicU32,
    /// Whether each heartbeat carried a system info payload.
    pub heartbeat_infos: Mutex<Vec<bool>>,
    pub reports_seen: Mutex<Vec<UpdateReport>>,
}

impl ScriptedApi {
    pub fn alive_ack() -> HeartbeatAck {
        HeartbeatAck {
            alive: true,
            latency_ms: 0,
            pending_update: None,
        }
    }

    pub fn dead_ack() -> HeartbeatAck {
        HeartbeatAck {
            alive: false,
            latency_ms: 0,
            pending_update: None,
        }
    }
}

fn accepted() -> ReportAck {
    ReportAck {
        accepted: true,
        message: String::new(),
    }
}

#[async_trait]
impl OmniiApi for ScriptedApi {
    async fn enroll(&self, _code: &str) -> Result<Enrollment, RpcError> {
        self.enroll_calls.fetch_add(1, Ordering::SeqCst);
        self.enroll_script.lock().pop_front().unwrap_or_else(|| {
            Ok(Enrollment {
                instance_id: "inst-default".into(),
                token: "tok-default".into(),
            })
        })
    }

    async fn handshake(&self, _instance_id: &str, _token: &str) -> Result<String, RpcError> {
        let call = self.handshake_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.handshake_script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("session-{}", call)))
    }

    async fn heartbeat(
        &self,
        _session_id: &str,
        system_info: Option<SystemInfo>,
    ) -> Result<HeartbeatAck, RpcError> {
        self.heartbeat_calls.fetch_add(1, Ordering::SeqCst);
        self.heartbeat_infos.lock().push(system_info.is_some());
        self.heartbeat_script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Self::alive_ack()))
    }

    async fn report_updates(
        &self,
        _session_id: &str,
        report: UpdateReport,
    ) -> Result<ReportAck, RpcError> {
        self.reports_seen.lock().push(report);
        self.report_script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(accepted()))
    }

    async fn report_stats(
        &self,
        _session_id: &str,
        _report: StatsReport,
    ) -> Result<ReportAck, RpcError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        Ok(accepted())
    }
}

/// Fake local management API with an optional gate that keeps update
/// initiation in flight until released.
#[derive(Default)]
pub(crate) struct FakeManagement {
    pub components: Mutex<Vec<ComponentUpdate>>,
    pub host_info: Mutex<SystemInfo>,
    pub stats: Mutex<Option<CoreStats>>,
    pub update_calls: Mutex<Vec<UpdateTrigger>>,
    pub update_gate: Mutex<Option<watch::Receiver<bool>>>,
    pub fail_updates: AtomicBool,
}

#[async_trait]
impl ManagementApi for FakeManagement {
    async fn system_info(&self) -> SupervisorResult<SystemInfo> {
        Ok(self.host_info.lock().clone())
    }

    async fn update_components(&self) -> SupervisorResult<Vec<ComponentUpdate>> {
        Ok(self.components.lock().clone())
    }

    async fn core_stats(&self) -> SupervisorResult<CoreStats> {
        self.stats
            .lock()
            .clone()
            .ok_or_else(|| SupervisorError::Api("stats unavailable".into()))
    }

    async fn start_update(&self, trigger: &UpdateTrigger) -> SupervisorResult<()> {
        self.update_calls.lock().push(trigger.clone());
        let gate = self.update_gate.lock().clone();
        if let Some(mut rx) = gate {
            let _ = rx.wait_for(|released| *released).await;
        }
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(SupervisorError::Api("update refused".into()));
        }
        Ok(())
    }
}

/// Poll a predicate until it holds or a generous deadline passes.
pub(crate) async fn wait_until<F: Fn() -> bool>(what: &str, predicate: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !predicate() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
