// ABOUTME: Main entry point for the pod-terminal server

use anyhow::{Context, Result};
use clap::Parser;
use pod_terminal::config::AppConfig;
use pod_terminal::exec::DockerExec;
use pod_terminal::server::{AppState, WebServer};
use pod_terminal::terminal::SessionController;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Browser terminal for containers running under kubelet's Docker runtime
#[derive(Debug, Parser)]
#[command(name = "pod-terminal", version, about)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overrides `server.bind`
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Directory holding the browser terminal assets, overrides `server.web_dir`
    #[arg(long)]
    web_dir: Option<PathBuf>,

    /// Seconds without input before a terminal is closed, overrides `terminal.idle_timeout_secs`
    #[arg(long)]
    idle_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(web_dir) = cli.web_dir {
        config.server.web_dir = Some(web_dir);
    }
    if let Some(secs) = cli.idle_timeout {
        config.terminal.idle_timeout_secs = secs;
    }
    info!(
        "Idle timeout {}s, shell directory {}",
        config.terminal.idle_timeout_secs, config.terminal.shell_dir
    );

    let docker = Arc::new(
        DockerExec::connect(&config.docker)
            .await
            .context("Failed to connect to Docker")?,
    );
    let state = AppState {
        controller: Arc::new(SessionController::new(docker.clone(), config.terminal.clone())),
        directory: docker,
    };

    WebServer::new(config.server, state).start().await
}

fn setup_logging() {
    use tracing_subscriber::prelude::*;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pod_terminal=info".into()),
        )
        .init();
}
