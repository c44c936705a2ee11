//! vnfmd: the Docker VNF manager daemon.
//!
//! Assembles the record store, the Docker venue connector and the
//! lifecycle controller, and serves the lifecycle contract over HTTP.
//!
//! # Usage
//!
//! ```text
//! vnfmd serve --conf /etc/vnfm/vnfmd.toml --persist=true --dir /var/lib/vnfm
//! vnfmd serve --swarm --tls --cert /etc/vnfm/certs --port 8080
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vnfm_driver::LifecycleController;
use vnfm_engine::{DockerConnector, EngineConnector};
use vnfm_state::RecordStore;
use vnfmd::{AppState, Overrides, VnfmConfig, build_router};

#[derive(Parser)]
#[command(name = "vnfmd", about = "Docker VNF manager daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the lifecycle API.
    Serve {
        /// TOML configuration file.
        #[arg(long)]
        conf: Option<PathBuf>,

        /// Log level (trace, debug, info, warn, error).
        #[arg(long)]
        level: Option<String>,

        /// Keep records on disk (`--persist=false` keeps them in memory).
        #[arg(long)]
        persist: Option<bool>,

        /// Directory of the record database.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Realize records as replicated services.
        #[arg(long, num_args = 0..=1, default_missing_value = "true")]
        swarm: Option<bool>,

        /// Directory holding ca.pem, cert.pem and key.pem.
        #[arg(long)]
        cert: Option<PathBuf>,

        /// Reach TCP venues over TLS.
        #[arg(long, num_args = 0..=1, default_missing_value = "true")]
        tls: Option<bool>,

        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            conf,
            level,
            persist,
            dir,
            swarm,
            cert,
            tls,
            port,
        } => {
            let mut config = VnfmConfig::load(conf.as_deref())?;
            config.daemon.apply(Overrides {
                level,
                persist,
                dir,
                swarm,
                cert,
                tls,
                port,
            });
            serve(config).await
        }
    }
}

async fn serve(config: VnfmConfig) -> anyhow::Result<()> {
    let daemon = &config.daemon;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(daemon.log_directives())),
        )
        .init();

    info!(name = %daemon.name, backend = daemon.backend().as_str(), "VNF manager starting");

    // ── Record store ───────────────────────────────────────────

    let store = if daemon.persist {
        std::fs::create_dir_all(&daemon.dir)?;
        let path = daemon.store_path();
        let store = RecordStore::open(&path)?;
        info!(?path, "record store opened");
        store
    } else {
        info!("record store kept in memory");
        RecordStore::open_in_memory()?
    };

    // ── Venue connector ────────────────────────────────────────

    let connector: Arc<dyn EngineConnector> = if daemon.tls {
        info!(cert_dir = ?daemon.cert, "venues reached over TLS");
        Arc::new(DockerConnector::with_tls(daemon.cert.clone()))
    } else {
        Arc::new(DockerConnector::new())
    };

    let controller = Arc::new(LifecycleController::new(
        store.clone(),
        connector,
        daemon.backend(),
        config.driver.clone(),
    ));

    // ── API server ─────────────────────────────────────────────

    let router = build_router(AppState {
        handler: controller.clone(),
        store,
        name: daemon.name.clone(),
    });
    let addr = daemon.listen_addr();
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "cannot listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    controller.shutdown().await;
    info!("VNF manager stopped");
    Ok(())
}
