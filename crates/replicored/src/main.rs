//! replicored — the Replicore daemon.
//!
//! Single binary that assembles the control plane:
//! - Target registry (in-memory, fed through the API)
//! - Metrics source (`kubectl top`)
//! - Orchestration backend (`kubectl scale` / `kubectl autoscale`)
//! - Reconciler with one worker per target
//! - Event bus + REST API with SSE decision stream
//!
//! # Usage
//!
//! ```text
//! replicored run --port 8686 --tick-interval 15
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use replicore_backend::KubectlBackend;
use replicore_controller::{Reconciler, ReconcilerSettings, TargetRegistry};
use replicore_events::EventBus;
use replicore_metrics::KubectlTopSource;

#[derive(Parser)]
#[command(name = "replicored", about = "Replicore autoscaling daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane.
    Run {
        /// Port for the REST API.
        #[arg(long, default_value = "8686")]
        port: u16,

        /// Reconciler tick interval in seconds.
        #[arg(long, default_value = "15")]
        tick_interval: u64,

        /// Seconds of metric history kept in the decision window.
        #[arg(long, default_value = "300")]
        sample_retention: u64,

        /// Path to the kubectl binary.
        #[arg(long, default_value = "kubectl")]
        kubectl_path: String,

        /// Per-observer event buffer capacity.
        #[arg(long, default_value = "64")]
        event_capacity: usize,

        /// Suppress no-change decision events.
        #[arg(long)]
        quiet_decisions: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,replicored=debug,replicore=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            port,
            tick_interval,
            sample_retention,
            kubectl_path,
            event_capacity,
            quiet_decisions,
        } => {
            run(
                port,
                tick_interval,
                sample_retention,
                kubectl_path,
                event_capacity,
                quiet_decisions,
            )
            .await
        }
    }
}

async fn run(
    port: u16,
    tick_interval: u64,
    sample_retention: u64,
    kubectl_path: String,
    event_capacity: usize,
    quiet_decisions: bool,
) -> anyhow::Result<()> {
    info!("Replicore daemon starting");

    let tick = Duration::from_secs(tick_interval);

    // ── Initialize subsystems ──────────────────────────────────

    let registry = TargetRegistry::new(512);
    info!("target registry initialized");

    // Metrics fetch is bounded to half a tick; an apply to one tick.
    let metrics = Arc::new(KubectlTopSource::new(kubectl_path.clone(), tick / 2));
    let backend = Arc::new(KubectlBackend::new(kubectl_path, tick));
    info!("kubectl adapters initialized");

    let bus = EventBus::new(event_capacity);

    let settings = ReconcilerSettings {
        tick_interval: tick,
        sample_retention: Duration::from_secs(sample_retention),
        max_samples: 240,
        log_no_change: !quiet_decisions,
    };
    let reconciler = Reconciler::new(
        registry.clone(),
        metrics,
        backend,
        bus.clone(),
        settings,
    );
    info!(tick_secs = tick_interval, "reconciler initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start the control loop ─────────────────────────────────

    let reconciler_handle = tokio::spawn(async move {
        reconciler.run(shutdown_rx).await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = replicore_api::build_router(registry, bus);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for the control loop to wind down.
    let _ = reconciler_handle.await;

    info!("Replicore daemon stopped");
    Ok(())
}
