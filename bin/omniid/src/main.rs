//! ---
//! omnii_section: "01-core-functionality"
//! omnii_subsection: "binary"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Binary entrypoint for the Omnii connector daemon."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use omnii_common::{init_tracing, ConnectorConfig, VersionInfo};
use omnii_metrics::{new_registry, spawn_http_server, DaemonMetrics};
use omnii_rpc::GrpcOmniiApi;
use omnii_session::{ConnectorEngine, SessionMetrics};
use omnii_supervisor::{ManagementApi, SupervisorClient};
use tokio::sync::watch;
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    version = concat!("Omnii connector ", env!("CARGO_PKG_VERSION")),
    about = "Omnii connector daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to the options document")]
    config: Option<PathBuf>,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print extended version information and exit"
    )]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the connector")]
    Run,
    #[command(about = "Print component update status from the local management API")]
    UpdateCheck,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let version = VersionInfo::current();
    if cli.version {
        println!("{}", version.extended());
        return Ok(());
    }

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("/data/options.json"));
    candidates.push(PathBuf::from("configs/options.dev.json"));

    let loaded = ConnectorConfig::load_with_source(&candidates)?;
    let config = loaded.config;
    init_tracing("omniid", &config.logging)?;
    info!(config_path = %loaded.source.display(), server_url = %config.server_url, "configuration loaded");

    let management = Arc::new(SupervisorClient::from_config(&config.supervisor)?);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config, management, version).await?,
        Commands::UpdateCheck => {
            let components = management.update_components().await?;
            render_components(&components);
        }
    }

    Ok(())
}

async fn run_daemon(
    config: ConnectorConfig,
    management: Arc<SupervisorClient>,
    version: VersionInfo,
) -> Result<()> {
    let registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(registry.clone())?;
    daemon_metrics.inc_start();
    daemon_metrics.set_build_info(&version.semver, &version.profile);

    let metrics_settings = config.metrics.clone();
    let metrics_server = if metrics_settings.enabled {
        info!(address = %metrics_settings.listen, "metrics exporter enabled");
        Some(spawn_http_server(registry.clone(), metrics_settings.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let session_metrics = SessionMetrics::new(registry)?;
    let api = Arc::new(GrpcOmniiApi::from_config(&config)?);
    let engine = ConnectorEngine::new(config, api, management, Some(session_metrics));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut engine_task = tokio::spawn(engine.run(shutdown_rx));

    let engine_result = tokio::select! {
        _ = shutdown_signal() => {
            info!("termination signal received; shutting down");
            let _ = shutdown_tx.send(true);
            engine_task.await?
        }
        joined = &mut engine_task => joined?,
    };

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }

    engine_result?;
    Ok(())
}

fn render_components(components: &[omnii_rpc::ComponentUpdate]) {
    if components.is_empty() {
        println!("No component information available.");
        return;
    }
    for component in components {
        let label = component
            .name
            .as_deref()
            .or(component.slug.as_deref())
            .unwrap_or_else(|| component.kind.as_str());
        let status = if component.update_available {
            "update available"
        } else {
            "up to date"
        };
        println!(
            "{:<12} {:<28} {} -> {} ({})",
            component.kind, label, component.version, component.version_latest, status
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = ctrl_c() => {},
            _ = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => warn!(?err, "failed to install SIGTERM handler"),
    }
}

#[cfg(not(unix))]
async fn terminate() {}
