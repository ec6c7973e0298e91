//! ---
//! omnii_section: "05-networking-external-interfaces"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Protocol definitions and gRPC client for the Omnii service."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use omnii_common::ConnectorConfig;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, warn};

use crate::error::RpcError;
use crate::proto;
use crate::proto::omnii_service_client::OmniiServiceClient;
use crate::types::{
    Enrollment, HeartbeatAck, ReportAck, StatsReport, SystemInfo, UpdateReport, UpdateTrigger,
};

/// Calls the session engine issues against the Omnii service.
///
/// The gRPC implementation below is the production path; tests substitute
/// in-memory fakes behind the same trait.
#[async_trait]
pub trait OmniiApi: Send + Sync {
    async fn enroll(&self, code: &str) -> Result<Enrollment, RpcError>;
    async fn handshake(&self, instance_id: &str, token: &str) -> Result<String, RpcError>;
    async fn heartbeat(
        &self,
        session_id: &str,
        system_info: Option<SystemInfo>,
    ) -> Result<HeartbeatAck, RpcError>;
    async fn report_updates(
        &self,
        session_id: &str,
        report: UpdateReport,
    ) -> Result<ReportAck, RpcError>;
    async fn report_stats(
        &self,
        session_id: &str,
        report: StatsReport,
    ) -> Result<ReportAck, RpcError>;
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// gRPC implementation of [`OmniiApi`] over a lazily connected channel.
///
/// The channel is established on first use so the daemon comes up cleanly
/// while the service is unreachable; calls fail transiently until then.
#[derive(Clone)]
pub struct GrpcOmniiApi {
    client: OmniiServiceClient<Channel>,
}

impl GrpcOmniiApi {
    /// Build the client from connector configuration, including optional TLS.
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, RpcError> {
        let mut endpoint = Endpoint::from_shared(config.server_url.clone())
            .map_err(|err| RpcError::InvalidEndpoint(err.to_string()))?
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.rpc_timeout);

        if let Some(ca_path) = &config.tls.ca_cert {
            let pem = std::fs::read(ca_path).map_err(|err| {
                RpcError::InvalidEndpoint(format!(
                    "unable to read TLS CA bundle {}: {}",
                    ca_path.display(),
                    err
                ))
            })?;
            let mut tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem));
            if let Some(domain) = &config.tls.domain {
                tls = tls.domain_name(domain.clone());
            }
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|err| RpcError::InvalidEndpoint(err.to_string()))?;
        }

        let channel = endpoint.connect_lazy();
        Ok(Self {
            client: OmniiServiceClient::new(channel),
        })
    }
}

#[async_trait]
impl OmniiApi for GrpcOmniiApi {
    async fn enroll(&self, code: &str) -> Result<Enrollment, RpcError> {
        let mut client = self.client.clone();
        let response = client
            .enroll(proto::EnrollRequest {
                code: code.to_owned(),
            })
            .await?
            .into_inner();

        if !response.accepted {
            return Err(RpcError::EnrollmentRejected(response.error));
        }
        debug!(instance_id = %response.instance_id, "enrollment accepted");
        Ok(Enrollment {
            instance_id: response.instance_id,
            token: response.token,
        })
    }

    async fn handshake(&self, instance_id: &str, token: &str) -> Result<String, RpcError> {
        let mut client = self.client.clone();
        let response = client
            .handshake(proto::HandshakeRequest {
                instance_id: instance_id.to_owned(),
                token: token.to_owned(),
            })
            .await?
            .into_inner();

        if !response.accepted {
            warn!(error = %response.error, "handshake refused");
            return Err(RpcError::AuthRejected);
        }
        Ok(response.session_id)
    }

    async fn heartbeat(
        &self,
        session_id: &str,
        system_info: Option<SystemInfo>,
    ) -> Result<HeartbeatAck, RpcError> {
        let mut client = self.client.clone();
        let response = client
            .heartbeat(proto::HeartbeatRequest {
                session_id: session_id.to_owned(),
                client_timestamp: Utc::now().timestamp_millis(),
                system_info: system_info.map(Into::into),
            })
            .await?
            .into_inner();

        Ok(HeartbeatAck {
            alive: response.alive,
            latency_ms: response.latency_ms,
            pending_update: response.pending_update.and_then(UpdateTrigger::from_proto),
        })
    }

    async fn report_updates(
        &self,
        session_id: &str,
        report: UpdateReport,
    ) -> Result<ReportAck, RpcError> {
        let mut client = self.client.clone();
        let response = client
            .report_updates(proto::UpdateReportRequest {
                session_id: session_id.to_owned(),
                report: Some(report.into()),
            })
            .await?
            .into_inner();

        Ok(ReportAck {
            accepted: response.accepted,
            message: response.message,
        })
    }

    async fn report_stats(
        &self,
        session_id: &str,
        report: StatsReport,
    ) -> Result<ReportAck, RpcError> {
        let mut client = self.client.clone();
        let response = client
            .report_stats(proto::StatsReportRequest {
                session_id: session_id.to_owned(),
                report: Some(report.into()),
            })
            .await?
            .into_inner();

        Ok(ReportAck {
            accepted: response.accepted,
            message: response.message,
        })
    }
}
