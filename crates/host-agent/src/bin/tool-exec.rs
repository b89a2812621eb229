//! Run a script or command the way the agent's plugin manager would.

use std::process::ExitCode;

use clap::Parser;
use host_agent_executor::{Platform, resolve_invocation};

#[derive(Debug, Parser)]
#[command(name = "tool-exec", version, about = "Execute a command with OS-aware handling (sh/cmd/ps1/bat)")]
struct Cli {
    /// Command or script path to execute
    #[arg(short = 'c', long)]
    command: String,

    /// Arguments, comma separated
    #[arg(short = 'a', long, value_delimiter = ',')]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let args: Vec<String> = cli.args.into_iter().filter(|a| !a.is_empty()).collect();
    let parts = resolve_invocation(Platform::current(), &cli.command, &args);
    tracing::debug!(command = %parts.display(), "Running");

    let status = tokio::process::Command::new(&parts.program)
        .args(&parts.args)
        .status()
        .await;
    match status {
        Ok(status) if status.success() => ExitCode::SUCCESS,
        Ok(status) => {
            eprintln!("Execution failed: {status}");
            status
                .code()
                .and_then(|code| u8::try_from(code).ok())
                .map_or(ExitCode::FAILURE, ExitCode::from)
        }
        Err(e) => {
            eprintln!("Execution failed: {e}");
            ExitCode::FAILURE
        }
    }
}
