use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use host_agent::{Agent, AgentConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "host-agent", version, about = "Executes commands on this host for a remote controller")]
struct Cli {
    /// YAML configuration file (defaults to ./config.yaml when present)
    #[arg(short, long, env = "HOST_AGENT_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AgentConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    let _guard = init_tracing(config.log_file.as_deref());
    config.validate()?;

    tracing::info!(
        host_id = %config.host_id,
        port = config.listen_port,
        heartbeat = ?config.heartbeat_interval,
        "Starting host agent"
    );
    Agent::new(config).run().await.context("Server error")?;
    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_file.and_then(|path| Some((path.parent(), path.file_name()?))) {
        Some((dir, name)) => {
            let dir = dir
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    guard
}
