use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use maestro::api::{create_router, AppState};
use maestro::config::Config;
use maestro::{Orchestrator, Result, WorkflowStatus};

/// Maestro - workflow orchestration engine for distributed worker agents
#[derive(Parser, Debug)]
#[command(name = "maestro")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    MAESTRO_DEBUG=1     Enable debug logging (alternative to --debug)\n    MAESTRO_CONFIG      Config file path\n    MAESTRO_BIND        Control API bind address\n    RUST_LOG            Log filter, overrides --debug")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Config file (default: ~/.maestro/maestro.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Start the Control API server
    Serve {
        /// Address to listen on, overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Validate a workflow file and print its batches
    Validate {
        /// Path to the workflow JSON file
        file: PathBuf,
    },

    /// Run a workflow to completion and print the result as JSON
    Run {
        /// Path to the workflow JSON file
        file: PathBuf,
    },

    /// List configured agents and their health
    Agents,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    maestro::log::init(cli.debug, cli.log_file.as_deref())?;
    if maestro::log::is_debug() {
        info!("maestro starting (debug mode enabled)");
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Validate { file } => validate(&config, &file),
        Command::Run { file } => run_workflow(&config, &file).await,
        Command::Agents => list_agents(&config).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

async fn serve(mut config: Config, bind: Option<String>) -> Result<ExitCode> {
    if let Some(bind) = bind {
        config.server.bind = bind;
        config.validate()?;
    }
    let addr = config.bind_addr()?;
    let orchestrator = Orchestrator::from_config(&config)?;

    let app = create_router(AppState::new(orchestrator)).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn validate(config: &Config, file: &Path) -> Result<ExitCode> {
    let raw = std::fs::read_to_string(file)?;
    let orchestrator = Orchestrator::from_config(config)?;
    let (workflow, plan) = orchestrator.plan(&raw)?;

    let output = serde_json::json!({
        "name": workflow.name(),
        "tasks": workflow.len(),
        "batches": plan.batches,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(ExitCode::SUCCESS)
}

async fn run_workflow(config: &Config, file: &Path) -> Result<ExitCode> {
    let raw = std::fs::read_to_string(file)?;
    let orchestrator = Orchestrator::from_config(config)?;
    let result = orchestrator.run_to_completion(&raw).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if result.status == WorkflowStatus::Succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn list_agents(config: &Config) -> Result<ExitCode> {
    let orchestrator = Orchestrator::from_config(config)?;
    let agents = orchestrator.list_agents().await;
    println!("{}", serde_json::to_string_pretty(&agents)?);
    Ok(ExitCode::SUCCESS)
}
