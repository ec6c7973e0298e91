//! ---
//! omnii_section: "05-networking-external-interfaces"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Protocol definitions and gRPC client for the Omnii service."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
//! Wire surface of the connector: generated protocol code, the domain model
//! exchanged with the Omnii service, and the [`OmniiApi`] seam the session
//! engine talks through. Everything above this crate is transport-agnostic.

#[allow(missing_docs)]
pub mod proto {
    tonic::include_proto!("omnii.v1");
}

pub mod client;
pub mod error;
pub mod types;

pub use client::{GrpcOmniiApi, OmniiApi};
pub use error::RpcError;
pub use types::{
    ComponentKind, ComponentUpdate, CoreStats, Enrollment, HeartbeatAck, ReportAck, StatsReport,
    SystemInfo, UpdateReport, UpdateTrigger,
};
