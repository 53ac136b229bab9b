//! storefront-mcp: MCP gateway exposing a storefront backend as typed tools
//!
//! Serves the tool and prompt registries over one of three transports:
//! stdio (default), HTTP with session affinity, or SSE.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use storefront_mcp::backend::BackendClient;
use storefront_mcp::config::{self, Config};
use storefront_mcp::error::TransportError;
use storefront_mcp::logging::{init_tracing, LevelController, LogLevel};
use storefront_mcp::mcp::channel::Dispatcher;
use storefront_mcp::mcp::prompt::PromptRegistry;
use storefront_mcp::mcp::registry::ToolRegistry;
use storefront_mcp::transport::create_transport;
use storefront_mcp::{prompts, tools};

/// MCP gateway for a storefront REST backend.
///
/// Exposes product search, carts, checkout, orders, and authentication as
/// typed, schema-described MCP tools.
#[derive(Parser, Debug)]
#[command(name = "storefront-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Transport to serve on (stdio, http, sse)
    #[arg(short, long, value_name = "KIND")]
    transport: Option<String>,

    /// Host to bind (http and sse transports)
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Port to bind (http and sse transports)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// MCP endpoint path (http and sse transports)
    #[arg(long, value_name = "PATH")]
    endpoint: Option<String>,

    /// Increase logging verbosity (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    /// Overlays CLI flags onto the loaded configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(kind) = &self.transport {
            config.transport.kind.clone_from(kind);
        }
        if let Some(host) = &self.host {
            config.transport.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.transport.port = port;
        }
        if let Some(endpoint) = &self.endpoint {
            config.transport.endpoint.clone_from(endpoint);
        }
    }
}

/// Determines the initial log level from CLI arguments and configuration.
fn initial_log_level(verbose: u8, quiet: bool, config_level: &str) -> LogLevel {
    if quiet {
        return LogLevel::Error;
    }

    match verbose {
        0 => LogLevel::from_config(config_level).unwrap_or(LogLevel::Warn),
        1 => LogLevel::Info,
        _ => LogLevel::Debug,
    }
}

/// Waits for a termination signal.
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let Ok(mut sigint) = signal(SignalKind::interrupt()) else {
        return std::future::pending().await;
    };
    let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
        return std::future::pending().await;
    };

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

/// Waits for Ctrl+C.
#[cfg(windows)]
async fn wait_for_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C, initiating graceful shutdown");
    }
}

/// Builds the registries, binds the transport, and serves until done.
async fn run(
    config: Config,
    backend: Arc<BackendClient>,
    levels: Arc<LevelController>,
) -> Result<(), TransportError> {
    let mut tool_registry = ToolRegistry::new();
    tools::register_all(&mut tool_registry, &backend);

    let mut prompt_registry = PromptRegistry::new();
    prompts::register_all(&mut prompt_registry);

    info!(
        tools = tool_registry.len(),
        prompts = prompt_registry.len(),
        transport = %config.transport.kind,
        "Registries populated"
    );

    let dispatcher = Dispatcher::new(
        Arc::new(tool_registry),
        Arc::new(prompt_registry),
        levels,
    );

    let mut transport = create_transport(&config.transport, dispatcher)?;
    transport.start().await?;

    // The stdio variant serves inline and has already drained; the HTTP
    // variants serve from a spawned task until a signal arrives.
    if config.transport.kind != "stdio" {
        wait_for_signal().await;
    }

    transport.shutdown().await;
    Ok(())
}

/// Returns true for parse outcomes that are requests for output rather
/// than usage errors (`--help`, `--version`).
fn parse_outcome_is_benign(error: &clap::Error) -> bool {
    matches!(
        error.kind(),
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
    )
}

/// Entry point for the storefront-mcp gateway.
///
/// Exits 0 on `--help`/`--version`, 1 on bad flag values or any startup
/// failure (clap's own exit path would use status 2 for usage errors).
fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if parse_outcome_is_benign(&e) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
        }
    };

    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nExpected config at: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };
    args.apply(&mut cfg);

    if let Err(e) = cfg.validate() {
        eprintln!("Configuration error: {e}");
        return ExitCode::FAILURE;
    }

    let initial = initial_log_level(args.verbose, args.quiet, &cfg.logging.level);
    let levels = Arc::new(init_tracing(initial));

    let backend = match BackendClient::new(&cfg.backend) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("Backend client error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Runtime error: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting storefront-mcp gateway"
    );

    match runtime.block_on(run(cfg, backend, levels)) {
        Ok(()) => {
            info!("Gateway shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Gateway error");
            ExitCode::FAILURE
        }
    }
}
