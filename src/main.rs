// raleigh-server: entry point

use clap::Parser;
use raleigh_server::config::ServerConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "raleigh-server", about = "RaleighSL object-store server")]
struct Args {
    /// Path to a TOML config file.
    #[arg(short, long, env = "RALEIGH_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address override.
    #[arg(short, long)]
    bind: Option<String>,

    /// Worker thread count override (0 = one per core).
    #[arg(long)]
    cores: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut config = ServerConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(cores) = args.cores {
        config.reactor.cores = cores;
    }

    let runtime = raleigh_server::start(&config)?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    runtime.shutdown();
    Ok(())
}
