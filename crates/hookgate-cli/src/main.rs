#![deny(unsafe_code)]

//! hookgate CLI: runs the daemon, forwards hook events, and inspects a
//! running daemon.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hookgate_config::AppConfig;
use hookgate_core::ipc::{HookRequest, IpcClient, IpcClientError};
use hookgate_core::{Daemon, DaemonContext, DaemonOptions, HandlerRegistry, ValidationGate};

/// hookgate: a policy daemon for coding-agent lifecycle hooks.
#[derive(Parser, Debug)]
#[command(
    name = "hookgate",
    version = hookgate_core::build_info::VERSION,
    about,
    long_about = None
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "hookgate.toml")]
    config: PathBuf,

    /// Daemon socket path (overrides the configuration).
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the daemon in the foreground.
    Start,

    /// Forward one event: reads `hook_input` JSON from stdin and prints the
    /// daemon's response line.
    Send {
        /// Event type, e.g. PreToolUse.
        event: String,

        /// Correlation id echoed in the response.
        #[arg(long)]
        request_id: Option<String>,
    },

    /// Show daemon health.
    Status,

    /// Show recent daemon log entries.
    Logs {
        /// Number of entries (capped by the daemon at 1000).
        #[arg(short = 'n', long, default_value_t = 100)]
        count: usize,

        /// Minimum level (error, warn, info, debug, trace).
        #[arg(short, long)]
        level: Option<String>,
    },

    /// List the handlers registered per event type.
    Handlers,

    /// Write a marker into the daemon log.
    Marker {
        /// Marker text.
        message: Option<String>,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config).await?;
    let env_warnings = config.apply_process_env();

    let level = match cli.verbose {
        0 => config.logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };

    // The daemon keeps an in-memory copy of its logs for `get_logs`.
    let logs = if matches!(cli.command, Commands::Start) {
        Some(hookgate_core::logging::install(&level, config.logging.buffer_capacity)?)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)),
            )
            .with_writer(std::io::stderr)
            .init();
        None
    };
    for warning in &env_warnings {
        warn!("{warning}");
    }

    if let Some(socket) = &cli.socket {
        config.daemon.socket_path = socket.display().to_string();
    }

    match cli.command {
        Commands::Start => cmd_start(config, logs).await?,
        Commands::Send { event, request_id } => cmd_send(&config, &event, request_id).await?,
        Commands::Status => cmd_status(&config).await?,
        Commands::Logs { count, level } => cmd_logs(&config, count, level.as_deref()).await?,
        Commands::Handlers => cmd_handlers(&config).await?,
        Commands::Marker { message } => cmd_marker(&config, message.as_deref()).await?,
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
    }

    Ok(())
}

async fn cmd_start(config: AppConfig, logs: Option<hookgate_core::LogReader>) -> Result<()> {
    info!(version = %hookgate_core::build_info::version_string(), "starting hookgate daemon");

    let router = HandlerRegistry::with_builtins()
        .compose(&config)
        .context("failed to compose handler chains")?;
    let mut context = DaemonContext::new(router)
        .with_validation(ValidationGate::from_config(&config.validation));
    if let Some(logs) = logs {
        context = context.with_logs(logs);
    }

    let daemon = Daemon::new(DaemonOptions::from_config(&config.daemon), context);
    daemon.run().await?;
    Ok(())
}

async fn cmd_send(config: &AppConfig, event: &str, request_id: Option<String>) -> Result<()> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("failed to read hook input from stdin")?;
    let hook_input = if input.trim().is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_str(&input).context("hook input on stdin is not valid JSON")?
    };

    let mut request = HookRequest::new(event, hook_input);
    request.request_id = request_id;
    let line = serde_json::to_string(&request)?;

    let response = client(config).send_line(&line).await?;
    println!("{response}");
    Ok(())
}

async fn cmd_status(config: &AppConfig) -> Result<()> {
    let health = match client(config).health().await {
        Ok(health) => health,
        Err(IpcClientError::NotRunning(path)) => {
            anyhow::bail!("hookgate daemon is not running (no socket at {})", path.display())
        }
        Err(e) => return Err(e.into()),
    };

    println!("status:          {}", health.status);
    println!("pid:             {}", health.pid);
    println!(
        "version:         {} ({}, {})",
        health.version, health.git_hash, health.build_profile
    );
    println!("uptime:          {:.1}s", health.uptime_secs);
    println!("active requests: {}", health.active_requests);
    println!("handlers:        {}", health.stats.handlers_registered);
    println!("requests:        {}", health.stats.total_requests);
    println!("handler faults:  {}", health.stats.handler_faults);
    for (decision, count) in &health.stats.decisions {
        println!("  {decision:<10} {count}");
    }
    Ok(())
}

async fn cmd_logs(config: &AppConfig, count: usize, level: Option<&str>) -> Result<()> {
    let logs = client(config).logs(Some(count), level).await?;
    for entry in &logs.entries {
        let fields = entry
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "{:.3} {:>5} {}: {} {}",
            entry.timestamp, entry.level, entry.target, entry.message, fields
        );
    }
    Ok(())
}

async fn cmd_handlers(config: &AppConfig) -> Result<()> {
    let handlers = client(config).handlers().await?;
    if handlers.handlers.is_empty() {
        println!("No handlers registered.");
    }
    for (event, list) in &handlers.handlers {
        println!("{event}:");
        for handler in list {
            println!(
                "  {:>5}  {:<24} {}{} [{}]",
                handler.priority,
                handler.name,
                if handler.terminal { "terminal" } else { "non-terminal" },
                if handler.enabled { "" } else { " (disabled)" },
                handler.tags.join(", ")
            );
        }
    }
    Ok(())
}

async fn cmd_marker(config: &AppConfig, message: Option<&str>) -> Result<()> {
    let marker = client(config).log_marker(message).await?;
    println!("marker written: {}", marker.message);
    Ok(())
}

fn cmd_config(path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    HandlerRegistry::with_builtins()
        .compose(config)
        .context("handler configuration is invalid")?;
    if show {
        let toml_str = toml::to_string_pretty(config).context("failed to render configuration")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", path.display());
    }
    Ok(())
}

fn client(config: &AppConfig) -> IpcClient {
    IpcClient::new(&config.daemon.socket_path)
        .with_timeout(std::time::Duration::from_secs(config.daemon.request_timeout_secs))
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))
    } else {
        Ok(AppConfig::default())
    }
}
