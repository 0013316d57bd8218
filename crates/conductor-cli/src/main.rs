//! Conductor CLI
//!
//! Runs multi-agent workflow definitions against recorded model transcripts.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;

use conductor_cli::run_cmd::{self, RunArgs};
use conductor_cli::validate_cmd;
use conductor_core::config::load_config;
use conductor_core::event::Status;
use conductor_core::tracing_init::{default_filter, init_tracing};

#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(version, about = "Multi-agent workflow runner", long_about = None)]
struct Cli {
    /// Log level (overrides config)
    #[arg(long, global = true, env = "CONDUCTOR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a workflow and print its events as JSON lines
    Run {
        /// Workflow definition (JSON)
        workflow: PathBuf,

        /// Task handed to every sub-agent
        #[arg(short, long)]
        task: String,

        /// Directory of `<name>.ndjson` transcripts, one per sub-agent
        #[arg(long)]
        transcripts: PathBuf,

        /// Request whole responses instead of streamed deltas
        #[arg(long)]
        no_stream: bool,
    },
    /// Validate a workflow definition and print the resolved spec
    Validate {
        /// Workflow definition (JSON)
        workflow: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let project_dir = std::env::current_dir().ok();
    let mut config = load_config(project_dir.as_deref())?;
    if let Some(level) = cli.log_level {
        config.engine.log_level = level;
    }

    init_tracing(&default_filter(&config.engine.log_level), cli.log_json);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting conductor");

    match cli.command {
        Command::Run {
            workflow,
            task,
            transcripts,
            no_stream,
        } => {
            if no_stream {
                config.engine.streaming = false;
            }
            let args = RunArgs {
                workflow,
                task,
                transcripts,
            };
            let status = run_cmd::run(&args, &config).await?;
            Ok(if status == Status::Succeeded {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Validate { workflow } => {
            validate_cmd::run(&workflow, config.engine.default_max_workers)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
