mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use codetest_common::config::EngineKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codetest-cli")]
#[command(about = "codetest CLI - Run JavaScript test requests locally", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum EngineArg {
    Node,
    Docker,
}

impl From<EngineArg> for EngineKind {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Node => EngineKind::Node,
            EngineArg::Docker => EngineKind::Docker,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a request file and print the response as JSON
    Run {
        /// Path to a JSON request ({"code", "language", "testCases", ...})
        #[arg(short, long)]
        request: PathBuf,

        /// Execution backend (defaults to the configured engine)
        #[arg(short, long, value_enum)]
        engine: Option<EngineArg>,

        /// Per-case timeout, overriding the request's own
        #[arg(short, long)]
        timeout_ms: Option<u64>,

        /// Exit non-zero unless every case passes
        #[arg(long, default_value = "false")]
        strict: bool,
    },

    /// Check that the execution backend is usable
    Probe {
        /// Execution backend (defaults to the configured engine)
        #[arg(short, long, value_enum)]
        engine: Option<EngineArg>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays pure JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            request,
            engine,
            timeout_ms,
            strict,
        } => {
            commands::run_request(&request, engine.map(Into::into), timeout_ms, strict).await?;
        }
        Commands::Probe { engine } => {
            commands::probe(engine.map(Into::into)).await?;
        }
    }

    Ok(())
}
