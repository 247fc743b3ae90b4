// crates/convoy-cli/src/main.rs
// ============================================================================
// Module: Convoy CLI
// Description: Operator binary running the coordinator or the agent.
// Purpose: Load TOML configuration, wire components, and run until shutdown.
// Dependencies: clap, convoy-agent, convoy-server, convoy-store-sqlite, tokio, toml
// ============================================================================

//! ## Overview
//! The `convoy` binary has two subcommands: `serve` runs the coordinator
//! (store, then hub and service, then orchestrator with the status callback,
//! then listeners) and `agent` runs the sidecar runtime. Both load one TOML
//! document, validate it, and stop on ctrl-c.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use convoy_agent::Agent;
use convoy_agent::AgentConfig;
use convoy_agent::ConfigApplier;
use convoy_agent::FileConfigApplier;
use convoy_agent::NoopConfigApplier;
use convoy_core::FleetStore;
use convoy_core::InMemoryFleetStore;
use convoy_server::AuditConfig;
use convoy_server::AuditSinkKind;
use convoy_server::DeployAuditSink;
use convoy_server::FileDeployAuditSink;
use convoy_server::FleetService;
use convoy_server::NoopDeployAuditSink;
use convoy_server::NoopMetrics;
use convoy_server::Orchestrator;
use convoy_server::RunnerTiming;
use convoy_server::ServerConfig;
use convoy_server::StderrDeployAuditSink;
use convoy_server::StoreBackend;
use convoy_store_sqlite::SqliteFleetStore;
use convoy_store_sqlite::SqliteStoreConfig;
use thiserror::Error;
use tokio::sync::watch;

// ============================================================================
// SECTION: CLI Definition
// ============================================================================

/// Convoy fleet control plane.
#[derive(Debug, Parser)]
#[command(name = "convoy", version, about = "Fleet control plane for reverse-proxy workers")]
struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Run the coordinator.
    Serve {
        /// Path to the server TOML configuration.
        #[arg(long)]
        config: PathBuf,
    },
    /// Run the agent sidecar.
    Agent {
        /// Path to the agent TOML configuration.
        #[arg(long)]
        config: PathBuf,
    },
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI errors surfaced to the operator.
///
/// # Invariants
/// - Variants are stable for exit-path handling.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration file could not be read.
    #[error("config read error: {0}")]
    Read(String),
    /// Configuration file could not be parsed or validated.
    #[error("config error: {0}")]
    Config(String),
    /// Component wiring or serving failed.
    #[error("runtime error: {0}")]
    Runtime(String),
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = writeln!(std::io::stderr(), "convoy: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Parses the CLI and dispatches the selected subcommand.
async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            config,
        } => serve_command(&config).await,
        Command::Agent {
            config,
        } => agent_command(&config).await,
    }
}

// ============================================================================
// SECTION: Serve
// ============================================================================

/// Runs the coordinator until ctrl-c.
async fn serve_command(path: &Path) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(path).map_err(|err| CliError::Read(err.to_string()))?;
    let config: ServerConfig =
        toml::from_str(&raw).map_err(|err| CliError::Config(err.to_string()))?;
    config.validate().map_err(|err| CliError::Config(err.to_string()))?;

    // Initialization order: store, hub and service, orchestrator (installing
    // the status callback), then listeners.
    let store = build_store(&config)?;
    let audit = build_audit_sink(&config.audit)?;
    let service = Arc::new(FleetService::new(
        Arc::clone(&store),
        config.heartbeat_interval(),
        config.session_ttl(),
        Arc::clone(&audit),
    ));
    let orchestrator = Orchestrator::new(
        store,
        Arc::clone(&service),
        audit,
        RunnerTiming {
            instance_timeout: config.instance_timeout(),
            batch_delay: config.batch_delay(),
        },
    )
    .map_err(|err| CliError::Runtime(err.to_string()))?;
    service
        .set_status_callback(orchestrator)
        .map_err(|err| CliError::Runtime(err.to_string()))?;

    let shutdown = shutdown_signal();
    convoy_server::serve(
        service,
        Arc::new(NoopMetrics),
        &config.listen_addr,
        config.max_connections,
        shutdown,
    )
    .await
    .map_err(|err| CliError::Runtime(err.to_string()))
}

/// Builds the configured store backend.
fn build_store(config: &ServerConfig) -> Result<Arc<dyn FleetStore>, CliError> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryFleetStore::new())),
        StoreBackend::Sqlite => {
            let path = config
                .store
                .path
                .clone()
                .ok_or_else(|| CliError::Config("sqlite store requires store.path".to_string()))?;
            let store = SqliteFleetStore::new(&SqliteStoreConfig {
                path,
                busy_timeout_ms: 5_000,
                journal_mode: convoy_store_sqlite::SqliteStoreMode::Wal,
                sync_mode: convoy_store_sqlite::SqliteSyncMode::Full,
            })
            .map_err(|err| CliError::Runtime(err.to_string()))?;
            Ok(Arc::new(store))
        }
    }
}

/// Builds the configured audit sink.
fn build_audit_sink(config: &AuditConfig) -> Result<Arc<dyn DeployAuditSink>, CliError> {
    match config.sink {
        AuditSinkKind::Stderr => Ok(Arc::new(StderrDeployAuditSink)),
        AuditSinkKind::None => Ok(Arc::new(NoopDeployAuditSink)),
        AuditSinkKind::File => {
            let path = config
                .path
                .clone()
                .ok_or_else(|| CliError::Config("file audit sink requires audit.path".to_string()))?;
            let sink = FileDeployAuditSink::new(&path)
                .map_err(|err| CliError::Runtime(err.to_string()))?;
            Ok(Arc::new(sink))
        }
    }
}

// ============================================================================
// SECTION: Agent
// ============================================================================

/// Runs the agent until ctrl-c.
async fn agent_command(path: &Path) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(path).map_err(|err| CliError::Read(err.to_string()))?;
    let config: AgentConfig =
        toml::from_str(&raw).map_err(|err| CliError::Config(err.to_string()))?;
    let applier: Arc<dyn ConfigApplier> = match &config.worker_config_path {
        Some(path) => Arc::new(FileConfigApplier::new(path.clone())),
        None => Arc::new(NoopConfigApplier),
    };
    let agent = Agent::new(config, applier).map_err(|err| CliError::Config(err.to_string()))?;
    let shutdown = shutdown_signal();
    agent.run(shutdown).await.map_err(|err| CliError::Runtime(err.to_string()))
}

// ============================================================================
// SECTION: Shutdown
// ============================================================================

/// Returns a watch receiver that flips on ctrl-c.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = tx.send(true);
    });
    rx
}
