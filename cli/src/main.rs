// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! # Task Gate task gate CLI
//!
//! The `taskgate` binary is both the daemon and the operator's client for it.
//!
//! ## Commands
//!
//! - `taskgate daemon start|stop|status|install|uninstall` - manage the daemon
//! - `taskgate task run|tools` - submit code and inspect the tool catalog, as any MCP client would
//! - `taskgate config show|validate|generate` - inspect the environment-driven configuration
//! - `taskgate oauth register` - exercise dynamic client registration
//! - `taskgate --daemon` - run the daemon in the foreground

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

mod commands;
mod daemon;

use commands::{ConfigCommand, DaemonCommand, OauthCommand, TaskCommand};

/// Task Gate task gate - mediated code execution for AI agents
#[derive(Parser)]
#[command(name = "taskgate")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Run as background daemon service
    #[arg(long, global = true)]
    daemon: bool,

    /// Path to configuration file (unused; configuration is environment-driven, see `taskgate config`)
    #[arg(short, long, global = true, env = "TASKGATE_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, global = true, env = "TASKGATE_PORT", default_value = "8000")]
    port: u16,

    /// HTTP API host
    #[arg(long, global = true, env = "TASKGATE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TASKGATE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage daemon lifecycle
    #[command(name = "daemon")]
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Task submission and tool inspection
    #[command(name = "task")]
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },

    /// Configuration inspection
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Anonymous OAuth authorization server operations
    #[command(name = "oauth")]
    Oauth {
        #[command(subcommand)]
        command: OauthCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    if cli.daemon {
        info!("starting Task Gate task gate in daemon mode");
        return daemon::start_daemon(cli.config, cli.port).await;
    }

    match cli.command {
        Some(Commands::Daemon { command }) => {
            commands::daemon::handle_command(command, cli.config, &cli.host, cli.port).await
        }
        Some(Commands::Task { command }) => commands::task::handle_command(command, &cli.host, cli.port).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command).await,
        Some(Commands::Oauth { command }) => commands::oauth::handle_command(command, &cli.host, cli.port).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
