//! ---
//! omnii_section: "15-testing-qa-runbook"
//! omnii_subsection: "integration-tests"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Integration and validation tests for the Omnii connector."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
//! Failure-path integration: lost sessions, revoked tokens, and rejected
//! enrollment codes, driven over a real gRPC wire.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use omnii_common::ConnectorConfig;
use omnii_enrollment::{Credential, EnrollmentStore};
use omnii_rpc::proto;
use omnii_rpc::proto::omnii_service_server::{OmniiService, OmniiServiceServer};
use omnii_rpc::{ComponentUpdate, CoreStats, GrpcOmniiApi, SystemInfo, UpdateTrigger};
use omnii_session::{ConnectorEngine, EngineError};
use omnii_supervisor::{ManagementApi, SupervisorError};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;
use tonic::transport::server::TcpIncoming;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

#[derive(Default)]
struct OmniiState {
    enrolls: u32,
    handshakes: u32,
    heartbeats: u32,
    issued_token: Option<String>,
    /// After this many heartbeats the next one is answered `alive = false`.
    dead_after_heartbeats: Option<u32>,
}

#[derive(Clone, Default)]
struct StubOmnii {
    state: Arc<Mutex<OmniiState>>,
}

#[tonic::async_trait]
impl OmniiService for StubOmnii {
    async fn enroll(
        &self,
        request: Request<proto::EnrollRequest>,
    ) -> Result<Response<proto::EnrollResponse>, Status> {
        let mut state = self.state.lock();
        state.enrolls += 1;
        if request.into_inner().code != "GOOD-CODE" {
            return Ok(Response::new(proto::EnrollResponse {
                accepted: false,
                instance_id: String::new(),
                token: String::new(),
                error: "unknown enrollment code".into(),
            }));
        }
        let token = format!("tok-{}", state.enrolls);
        state.issued_token = Some(token.clone());
        Ok(Response::new(proto::EnrollResponse {
            accepted: true,
            instance_id: "inst-200".into(),
            token,
            error: String::new(),
        }))
    }

    async fn handshake(
        &self,
        request: Request<proto::HandshakeRequest>,
    ) -> Result<Response<proto::HandshakeResponse>, Status> {
        let mut state = self.state.lock();
        state.handshakes += 1;
        if state.issued_token.as_deref() != Some(request.into_inner().token.as_str()) {
            return Ok(Response::new(proto::HandshakeResponse {
                accepted: false,
                session_id: String::new(),
                error: "unknown token".into(),
            }));
        }
        Ok(Response::new(proto::HandshakeResponse {
            accepted: true,
            session_id: format!("sess-{}", state.handshakes),
            error: String::new(),
        }))
    }

    async fn heartbeat(
        &self,
        _request: Request<proto::HeartbeatRequest>,
    ) -> Result<Response<proto::HeartbeatResponse>, Status> {
        let mut state = self.state.lock();
        state.heartbeats += 1;
        if let Some(threshold) = state.dead_after_heartbeats {
            if state.heartbeats > threshold {
                state.dead_after_heartbeats = None;
                return Ok(Response::new(proto::HeartbeatResponse {
                    alive: false,
                    latency_ms: 0,
                    pending_update: None,
                }));
            }
        }
        Ok(Response::new(proto::HeartbeatResponse {
            alive: true,
            latency_ms: 0,
            pending_update: None,
        }))
    }

    async fn report_updates(
        &self,
        _request: Request<proto::UpdateReportRequest>,
    ) -> Result<Response<proto::UpdateReportResponse>, Status> {
        Ok(Response::new(proto::UpdateReportResponse {
            accepted: true,
            message: String::new(),
        }))
    }

    async fn report_stats(
        &self,
        _request: Request<proto::StatsReportRequest>,
    ) -> Result<Response<proto::StatsReportResponse>, Status> {
        Ok(Response::new(proto::StatsReportResponse {
            accepted: true,
            message: String::new(),
        }))
    }
}

/// Management stand-in for flows that never touch the local platform.
struct NullManagement;

#[async_trait::async_trait]
impl ManagementApi for NullManagement {
    async fn system_info(&self) -> Result<SystemInfo, SupervisorError> {
        Ok(SystemInfo::default())
    }

    async fn update_components(&self) -> Result<Vec<ComponentUpdate>, SupervisorError> {
        Ok(Vec::new())
    }

    async fn core_stats(&self) -> Result<CoreStats, SupervisorError> {
        Err(SupervisorError::Api("no stats in this scenario".into()))
    }

    async fn start_update(&self, _trigger: &UpdateTrigger) -> Result<(), SupervisorError> {
        Ok(())
    }
}

async fn spawn_omnii(stub: StubOmnii) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let incoming = TcpIncoming::from_listener(listener, true, None).unwrap();
    tokio::spawn(async move {
        let _ = Server::builder()
            .add_service(OmniiServiceServer::new(stub))
            .serve_with_incoming(incoming)
            .await;
    });
    format!("http://{}", addr)
}

fn connector_config(server_url: &str, code: &str, data_dir: &Path) -> ConnectorConfig {
    let raw = json!({"server_url": server_url, "enrollment_code": code}).to_string();
    let mut config: ConnectorConfig = raw.parse().unwrap();
    config.data_dir = data_dir.to_path_buf();
    config.heartbeat_interval = Duration::from_millis(20);
    config.full_info_interval = Duration::from_secs(600);
    config.update_report_interval = Duration::from_secs(600);
    config.stats_report_interval = Duration::from_secs(600);
    config.backoff.initial_delay = Duration::from_millis(1);
    config.backoff.max_delay = Duration::from_millis(20);
    config
}

fn spawn_engine(
    config: &ConnectorConfig,
) -> (
    tokio::task::JoinHandle<Result<(), EngineError>>,
    watch::Sender<bool>,
) {
    let api = Arc::new(GrpcOmniiApi::from_config(config).unwrap());
    let engine = ConnectorEngine::new(config.clone(), api, Arc::new(NullManagement), None);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    (tokio::spawn(engine.run(shutdown_rx)), shutdown_tx)
}

async fn wait_until<F: Fn() -> bool>(what: &str, predicate: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !predicate() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn declared_dead_session_is_reestablished_once() {
    let stub = StubOmnii::default();
    stub.state.lock().dead_after_heartbeats = Some(2);
    let server_url = spawn_omnii(stub.clone()).await;
    let data_dir = tempfile::tempdir().unwrap();
    let config = connector_config(&server_url, "GOOD-CODE", data_dir.path());

    let (task, shutdown) = spawn_engine(&config);

    let state = stub.state.clone();
    wait_until("the replacement session to beat", move || {
        let state = state.lock();
        state.handshakes == 2 && state.heartbeats >= 5
    })
    .await;

    // One enrollment and exactly one reconnection, not a storm of them.
    {
        let state = stub.state.lock();
        assert_eq!(state.enrolls, 1);
        assert_eq!(state.handshakes, 2);
    }

    let _ = shutdown.send(true);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn revoked_token_forces_reenrollment() {
    let stub = StubOmnii::default();
    // The server only knows about a newer token generation.
    stub.state.lock().issued_token = Some("tok-current".into());
    let server_url = spawn_omnii(stub.clone()).await;
    let data_dir = tempfile::tempdir().unwrap();
    let config = connector_config(&server_url, "GOOD-CODE", data_dir.path());

    let store = EnrollmentStore::new(config.credentials_path());
    store
        .save(&Credential {
            instance_id: "inst-200".into(),
            token: "tok-stale".into(),
        })
        .unwrap();

    let (task, shutdown) = spawn_engine(&config);

    let state = stub.state.clone();
    wait_until("re-enrollment and a live session", move || {
        let state = state.lock();
        state.enrolls == 1 && state.handshakes >= 2 && state.heartbeats >= 1
    })
    .await;

    // The stale credential was replaced by the newly issued one.
    let replacement = store.load().unwrap().expect("credential present");
    assert_eq!(replacement.token, "tok-1");

    let _ = shutdown.send(true);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn rejected_enrollment_code_is_fatal() {
    let stub = StubOmnii::default();
    let server_url = spawn_omnii(stub.clone()).await;
    let data_dir = tempfile::tempdir().unwrap();
    let config = connector_config(&server_url, "BAD-CODE", data_dir.path());

    let (task, _shutdown) = spawn_engine(&config);

    match task.await.unwrap() {
        Err(EngineError::EnrollmentRejected(reason)) => {
            assert!(reason.contains("unknown enrollment code"));
        }
        other => panic!("expected fatal enrollment rejection, got {:?}", other.map(|_| ())),
    }
    // No credential may be left behind after a rejected enrollment.
    assert!(EnrollmentStore::new(config.credentials_path())
        .load()
        .unwrap()
        .is_none());
}
