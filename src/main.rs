use clap::Parser;
use tokio::runtime::Builder;
use tokio::sync::mpsc;
use anyhow::Result;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use sdn_pathtrack::command_log::{CommandLog, JsonFileCommandLog, MemoryCommandLog};
use sdn_pathtrack::event_server::EventServer;
use sdn_pathtrack::telemetry::TelemetryService;
use sdn_pathtrack::{Controller, ControllerConfig};

#[derive(Parser)]
#[command(name = "sdn-pathtrack")]
struct Cli {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address the framework shim connects to
    #[arg(long)]
    listen: Option<String>,

    #[arg(long)]
    collector_url: Option<String>,

    /// JSON command log written by the orchestration service
    #[arg(long)]
    command_log: Option<PathBuf>,

    #[arg(long)]
    no_telemetry: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(level)
        .parse_default_env()
        .init();

    let mut config = match &cli.config {
        Some(path) => ControllerConfig::load(path)?,
        None => ControllerConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.listen_addr = listen;
    }
    if let Some(url) = cli.collector_url {
        config.telemetry.collector_url = url;
    }
    if let Some(path) = cli.command_log {
        config.command_log = Some(path);
    }
    if cli.no_telemetry {
        config.telemetry.enabled = false;
    }

    let rt = Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(run(config))
}

async fn run(config: ControllerConfig) -> Result<()> {
    let commands: Arc<dyn CommandLog> = match &config.command_log {
        Some(path) => {
            info!("Reading operator commands from {}", path.display());
            Arc::new(JsonFileCommandLog::new(path))
        }
        None => {
            warn!("No command log configured, ping paths will not be reported");
            Arc::new(MemoryCommandLog::new())
        }
    };

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(1024);

    let mut controller = Controller::new(&config, commands, command_tx);
    let telemetry = if config.telemetry.enabled {
        let (reporter, service) = TelemetryService::spawn(&config.telemetry)?;
        controller = controller.with_telemetry(reporter);
        Some(service)
    } else {
        info!("Path telemetry disabled");
        None
    };

    let controller_task = tokio::spawn(controller.run(event_rx));
    let server = EventServer::bind(&config.listen_addr, event_tx, command_rx).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }

    controller_task.abort();
    if let Some(service) = telemetry {
        service.shutdown();
    }
    Ok(())
}
