use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use icmp_exporter::{
    collector::Collector,
    config::read_config_file,
    ping::IcmpPinger,
    server::{self, AppState, DEFAULT_TELEMETRY_PATH},
    util::{get_listen_address, parse_listen_address},
};
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Prometheus exporter for monitoring point to point link latency
#[derive(Debug, Clone, Parser)]
#[command(name = "icmp_exporter", version)]
struct Args {
    /// Path to exporter configuration
    #[arg(long = "collector.config.file")]
    config_file: PathBuf,

    /// Address on which to expose metrics and web interface
    #[arg(long = "web.listen-address", default_value_t = get_listen_address(), value_parser = listen_address)]
    listen_address: SocketAddr,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path", default_value = DEFAULT_TELEMETRY_PATH)]
    telemetry_path: String,

    /// Only log messages with the given severity or above
    #[arg(long = "log.level", default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,
}

fn listen_address(value: &str) -> Result<SocketAddr, String> {
    parse_listen_address(value).ok_or_else(|| format!("invalid listen address: {value}"))
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![
        ("icmp_exporter", level),
        ("exporter", level),
        ("tower_http", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = read_config_file(&args.config_file)?;
    info!(
        "loaded {} targets from {}",
        config.targets.len(),
        args.config_file.display()
    );

    let collector = Collector::new(Arc::new(config), Arc::new(IcmpPinger));
    let state = AppState::new(Arc::new(collector), args.telemetry_path);

    let app = server::router(state)?;
    let listener = server::bind(args.listen_address).await?;

    server::serve(listener, app)
        .await
        .context("metrics listener stopped")
}

#[tokio::main]
async fn main() {
    // .env may set the listen address default, so load it before parsing
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.log_level);

    info!("starting icmp_exporter {}", env!("CARGO_PKG_VERSION"));
    trace!("started with args: {args:?}");

    if let Err(e) = run(args).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}
