// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Anonymous OAuth authorization server commands (S4.I), for exercising
//! dynamic client registration against a running daemon.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use crate::daemon::client::DaemonClient;

#[derive(Subcommand)]
pub enum OauthCommand {
    /// Register a dynamic OAuth client (RFC 7591)
    Register {
        /// Human-readable client name
        #[arg(long)]
        name: Option<String>,

        /// Redirect URI; may be repeated
        #[arg(long = "redirect-uri", required = true)]
        redirect_uris: Vec<String>,
    },
}

pub async fn handle_command(command: OauthCommand, host: &str, port: u16) -> Result<()> {
    let client = DaemonClient::new(host, port).context("failed to build daemon client")?;

    match command {
        OauthCommand::Register { name, redirect_uris } => register(&client, name, redirect_uris).await,
    }
}

async fn register(client: &DaemonClient, name: Option<String>, redirect_uris: Vec<String>) -> Result<()> {
    let registration = client.register_client(name, redirect_uris).await.context("registration failed")?;

    println!("{}", "✓ Client registered".green());
    println!("  client_id:   {}", registration.client_id.bold());
    if let Some(name) = registration.client_name {
        println!("  client_name: {name}");
    }
    println!("  redirect_uris: {:?}", registration.redirect_uris);
    Ok(())
}
