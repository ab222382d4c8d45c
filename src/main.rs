//! SeaGuard - ghost net detection service
//!
//! # Usage
//!
//! ```bash
//! # Run the classification and drift sweeps until Ctrl+C
//! seaguard run
//!
//! # Register a net and feed it a fix
//! seaguard register --net-id N1 --qr-code QR-001 --owner fisher-7 --lat -33.91 --lon 18.42
//! seaguard ping --net-id N1 --lat -33.90 --lon 18.43 --source gsm
//!
//! # One-off evaluation and operator actions
//! seaguard classify --net-id N1
//! seaguard recover --net-id N1 --by "MV Orca" --notes "hauled aboard"
//! seaguard status --net-id N1
//! seaguard set-owner --net-id N1 --owner coop-12
//! seaguard list
//! ```
//!
//! # Environment Variables
//!
//! - `SEAGUARD_CONFIG`: path to `seaguard.toml`
//! - `ML_SERVICE_URL`, `ML_SERVICE_TIMEOUT`, `ML_SERVICE_RETRIES`: oracle overrides
//! - `GHOST_NET_THRESHOLD`, `GHOST_NET_SUSPECTED_THRESHOLD`: detection overrides
//! - `RUST_LOG`: logging level (default: info)
//!
//! A `.env` file in the working directory is loaded first.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use seaguard::config::MonitorConfig;
use seaguard::scheduler::FleetScheduler;
use seaguard::service::{GhostNetService, NetRegistration, PingSubmission};
use seaguard::storage::{SledStore, TelemetryStore};
use seaguard::types::{GeoPoint, PingSource};
use seaguard::HttpOracle;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "seaguard")]
#[command(about = "SeaGuard ghost net detection and drift forecasting")]
#[command(version)]
struct CliArgs {
    /// Config file (overrides SEAGUARD_CONFIG and ./seaguard.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run the classification and drift sweeps until Ctrl+C
    Run,

    /// Register a new net
    Register {
        #[arg(long)]
        net_id: String,
        #[arg(long)]
        qr_code: String,
        #[arg(long)]
        owner: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// RFC 3339 deployment time (default: now)
        #[arg(long)]
        deployed_at: Option<DateTime<Utc>>,
    },

    /// Hand a net over to another owner
    SetOwner {
        #[arg(long)]
        net_id: String,
        #[arg(long)]
        owner: String,
    },

    /// List every registered net
    List,

    /// Submit one GPS ping
    Ping {
        #[arg(long)]
        net_id: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// RFC 3339 fix time (default: now)
        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,
        /// lora, gsm or satellite (default: lora)
        #[arg(long)]
        source: Option<PingSource>,
    },

    /// Run one classification cycle for a net
    Classify {
        #[arg(long)]
        net_id: String,
    },

    /// Run one drift forecast for a net
    Forecast {
        #[arg(long)]
        net_id: String,
    },

    /// Confirm a net was physically recovered
    Recover {
        #[arg(long)]
        net_id: String,
        #[arg(long)]
        by: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show a net with its latest prediction and open alert
    Status {
        #[arg(long, required_unless_present = "qr_code", conflicts_with = "qr_code")]
        net_id: Option<String>,
        #[arg(long)]
        qr_code: Option<String>,
    },

    /// Acknowledge an alert
    Ack {
        #[arg(long)]
        alert_id: String,
    },

    /// Probe the store and the prediction oracle
    Health,

    /// Validate configuration and print the effective values
    CheckConfig,
}

// ============================================================================
// Setup
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<MonitorConfig> {
    let Some(path) = path else {
        return MonitorConfig::load().context("Invalid SeaGuard configuration");
    };
    let mut config = MonitorConfig::load_from_file(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate().context("Invalid SeaGuard configuration")?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

struct Runtime {
    store: Arc<SledStore>,
    service: Arc<GhostNetService>,
    cancel: CancellationToken,
}

fn build_runtime(config: &MonitorConfig) -> Result<Runtime> {
    if let Some(parent) = std::path::Path::new(&config.storage.path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create storage directory {}", parent.display()))?;
    }
    let store = Arc::new(
        SledStore::open(&config.storage.path)
            .with_context(|| format!("Failed to open store at {}", config.storage.path))?,
    );
    let oracle = Arc::new(HttpOracle::new(&config.oracle).context("Failed to build oracle HTTP client")?);
    let cancel = CancellationToken::new();

    let service = Arc::new(GhostNetService::new(
        config,
        Arc::clone(&store) as Arc<dyn TelemetryStore>,
        oracle,
        cancel.clone(),
    ));
    Ok(Runtime { store, service, cancel })
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let config = load_config(args.config.as_ref())?;

    match args.command {
        SubCommand::CheckConfig => {
            print!("{}", config.to_toml()?);
            info!("Configuration is valid");
            Ok(())
        }
        command => execute(command, &config).await,
    }
}

async fn execute(command: SubCommand, config: &MonitorConfig) -> Result<()> {
    let Runtime { store, service, cancel } = build_runtime(config)?;

    match command {
        SubCommand::Run => {
            info!(
                store = store.backend_name(),
                oracle = %config.oracle.url,
                confidence_threshold = config.detection.confidence_threshold,
                suspected_threshold = config.detection.suspected_threshold,
                "SeaGuard starting"
            );

            // Graceful shutdown via Ctrl+C
            let shutdown_token = cancel.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Received Ctrl+C, initiating shutdown...");
                shutdown_token.cancel();
            });

            let scheduler = FleetScheduler::new(Arc::clone(&service), config.jobs.clone(), cancel);
            scheduler.run().await;
        }
        SubCommand::Register { net_id, qr_code, owner, lat, lon, deployed_at } => {
            let net = service
                .register_net(NetRegistration {
                    net_id,
                    qr_code_id: qr_code,
                    owner_id: owner,
                    deployment_location: GeoPoint::new(lat, lon),
                    deployment_time: deployed_at,
                })
                .await?;
            print_json(&net)?;
        }
        SubCommand::SetOwner { net_id, owner } => {
            print_json(&service.update_net_owner(&net_id, &owner).await?)?;
        }
        SubCommand::List => {
            print_json(&service.list_nets().await?)?;
        }
        SubCommand::Ping { net_id, lat, lon, timestamp, source } => {
            let outcome = service
                .submit_ping(PingSubmission {
                    net_id,
                    latitude: lat,
                    longitude: lon,
                    timestamp,
                    source,
                })
                .await?;
            print_json(&outcome)?;
        }
        SubCommand::Classify { net_id } => {
            print_json(&service.run_classification(&net_id).await?)?;
        }
        SubCommand::Forecast { net_id } => {
            print_json(&service.run_drift_forecast(&net_id).await?)?;
        }
        SubCommand::Recover { net_id, by, notes } => {
            print_json(&service.confirm_recovery(&net_id, by, notes).await?)?;
        }
        SubCommand::Status { net_id, qr_code } => {
            let view = match (net_id, qr_code) {
                (Some(net_id), _) => service.get_net_status(&net_id).await?,
                (None, Some(qr_code)) => service.get_net_by_qr_code(&qr_code).await?,
                (None, None) => anyhow::bail!("--net-id or --qr-code is required"),
            };
            print_json(&view)?;
        }
        SubCommand::Ack { alert_id } => {
            print_json(&service.acknowledge_alert(&alert_id).await?)?;
        }
        SubCommand::Health => {
            print_json(&service.health().await)?;
        }
        SubCommand::CheckConfig => {
            print!("{}", config.to_toml()?);
        }
    }

    store.flush().context("Failed to flush store")?;
    info!("SeaGuard shutdown complete");
    Ok(())
}
