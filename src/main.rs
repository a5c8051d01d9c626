#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level as TraceLevel, info, warn};
use tracing_subscriber::FmtSubscriber;

use greenhouse_sync::api::RemoteApi;
use greenhouse_sync::api::http::HttpApi;
use greenhouse_sync::auth::FileTokenSource;
use greenhouse_sync::config::SyncConfig;
use greenhouse_sync::fallback::FileFallbackStore;
use greenhouse_sync::layout::generate_layout;
use greenhouse_sync::transform::{Point, SurfaceRect, ViewProjection};
use greenhouse_sync::{DeviceSensors, FloorPlanSession, GreenhouseConfig, PersistenceGateway, ViewType};

#[derive(Debug, Parser)]
#[command(name = "greenhouse-sync", version, about = "Greenhouse sensor position sync")]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long, global = true)]
    api: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ViewArg {
    FloorPlan,
    SideView,
}

impl From<ViewArg> for ViewType {
    fn from(view: ViewArg) -> Self {
        match view {
            ViewArg::FloorPlan => ViewType::FloorPlan,
            ViewArg::SideView => ViewType::SideView,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate positions from a JSON list of devices and their sensors
    Layout {
        devices: PathBuf,
    },
    /// Fetch one view's stored config and positions
    Load {
        device_id: String,
        #[arg(long, value_enum, default_value = "floor-plan")]
        view: ViewArg,
    },
    /// Load positions for a device group, generating and saving a layout if none exist
    Sync {
        device_id: String,
        /// JSON list of live devices; without it stored positions are used as is
        #[arg(long)]
        devices: Option<PathBuf>,
    },
    /// Convert a pointer position on a rendered surface into percent coordinates
    Project {
        #[arg(long, value_enum, default_value = "floor-plan")]
        view: ViewArg,
        #[arg(long)]
        x: f64,
        #[arg(long)]
        y: f64,
        #[arg(long, default_value_t = 400.0)]
        width: f64,
        #[arg(long, default_value_t = 300.0)]
        height: f64,
        /// Greenhouse height in meters (side view)
        #[arg(long, default_value_t = 4.0)]
        greenhouse_height: f64,
    },
    /// Send the locally stored fallback payload for a device
    Flush {
        device_id: String,
    },
}

fn init_logging(config_level: &str) -> Result<()> {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| config_level.to_string());
    let log_level = match level.to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn read_devices(path: &PathBuf) -> Result<Vec<DeviceSensors>> {
    let contents = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse devices in {}", path.display()))
}

fn build_gateway(config: &SyncConfig, device_id: &str) -> Result<PersistenceGateway> {
    let tokens = Arc::new(FileTokenSource::load_default());
    let api: Arc<dyn RemoteApi> = Arc::new(HttpApi::new(&config.api_base_url, config.request_timeout(), tokens)?);
    let fallback = Arc::new(FileFallbackStore::new(config.fallback_dir()));
    Ok(PersistenceGateway::new(device_id, api, fallback, config.gateway_settings()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SyncConfig::load_from(path)?,
        None => SyncConfig::load()?,
    };
    if let Some(api) = cli.api {
        config.api_base_url = api;
        config.validate_and_clamp();
    }
    init_logging(&config.log_level)?;

    match cli.command {
        Command::Layout { devices } => {
            let devices = read_devices(&devices)?;
            let positions = generate_layout(&devices);
            info!(devices = devices.len(), sensors = positions.len(), "Generated layout");
            print_json(&positions)?;
        }
        Command::Load { device_id, view } => {
            let gateway = build_gateway(&config, &device_id)?;
            let aggregate = gateway.load(view.into()).await?;
            print_json(&aggregate)?;
        }
        Command::Sync { device_id, devices } => {
            let devices = match devices {
                Some(path) => read_devices(&path)?,
                None => Vec::new(),
            };
            let gateway = build_gateway(&config, &device_id)?;
            let mut session = FloorPlanSession::new(gateway.clone(), devices, config.drag_threshold());
            let source = session.load().await?;
            info!(device = %device_id, source = ?source, sensors = session.store().len(), "Sync complete");

            let status = gateway.status();
            if let Some(reason) = status.error_message() {
                warn!(reason, "Save reported an error");
            }
            if gateway.pending_payload().is_some() {
                warn!(device = %device_id, "Changes queued locally; run `flush` once the server is reachable");
            }
            print_json(&session.payload())?;
        }
        Command::Project { view, x, y, width, height, greenhouse_height } => {
            let greenhouse = GreenhouseConfig {
                height: greenhouse_height,
                ..GreenhouseConfig::default()
            };
            let projection = match ViewType::from(view) {
                ViewType::FloorPlan => ViewProjection::plan(),
                ViewType::SideView => ViewProjection::elevation(&greenhouse),
            };
            let surface = SurfaceRect::new(0.0, 0.0, width, height);
            let Some(update) = projection.project(Point::new(x, y), surface) else {
                bail!("Surface {width}x{height} has no area");
            };
            print_json(&serde_json::json!({ "x": update.x, "y": update.y, "z": update.z }))?;
        }
        Command::Flush { device_id } => {
            let gateway = build_gateway(&config, &device_id)?;
            let Some(payload) = gateway.restore_local()? else {
                info!(device = %device_id, "Nothing stored locally");
                return Ok(());
            };
            let outcome = gateway.save(payload).await?;
            info!(device = %device_id, outcome = ?outcome, "Flushed local payload");
        }
    }

    Ok(())
}
