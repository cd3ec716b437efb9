// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Task submission commands: the CLI drives the daemon exactly as any other
//! MCP client would, over `tools/call run_code` against `/mcp/anonymous`.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use uuid::Uuid;

use crate::daemon::client::{DaemonClient, RunCodeRequest};

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Submit code for execution and wait for the result
    Run {
        /// Source code to execute
        code: String,

        /// Runtime id to execute against (e.g. js, python)
        #[arg(long, default_value = "js")]
        runtime: String,

        /// Timeout in milliseconds
        #[arg(long, default_value = "30000")]
        timeout_ms: u64,

        /// Workspace id to submit under (defaults to a fresh one)
        #[arg(long)]
        workspace_id: Option<String>,
    },

    /// List tools currently visible to a workspace
    Tools {
        #[arg(long)]
        workspace_id: Option<String>,
    },
}

pub async fn handle_command(command: TaskCommand, host: &str, port: u16) -> Result<()> {
    let client = DaemonClient::new(host, port).context("failed to build daemon client")?;

    match command {
        TaskCommand::Run { code, runtime, timeout_ms, workspace_id } => {
            run(&client, code, runtime, timeout_ms, workspace_id).await
        }
        TaskCommand::Tools { workspace_id } => tools(&client, workspace_id).await,
    }
}

fn actor_id() -> String {
    format!("cli_{}", Uuid::new_v4())
}

fn workspace_or_fresh(workspace_id: Option<String>) -> String {
    workspace_id.unwrap_or_else(|| Uuid::new_v4().to_string())
}

async fn run(client: &DaemonClient, code: String, runtime_id: String, timeout_ms: u64, workspace_id: Option<String>) -> Result<()> {
    let workspace_id = workspace_or_fresh(workspace_id);
    println!("{}", format!("Submitting to workspace {workspace_id}...").dimmed());

    let result = client
        .run_code(RunCodeRequest { code, runtime_id, timeout_ms, workspace_id, actor_id: actor_id() })
        .await
        .context("run_code failed")?;

    if result.is_error {
        println!("{} {}", "✗".red(), result.text);
        anyhow::bail!("task did not complete successfully");
    }

    println!("{}", "✓ Task completed".green());
    println!("{}", result.text);
    Ok(())
}

async fn tools(client: &DaemonClient, workspace_id: Option<String>) -> Result<()> {
    let workspace_id = workspace_or_fresh(workspace_id);
    let result = client.list_tools(&workspace_id, &actor_id()).await.context("tools/list failed")?;

    let tools = result.get("tools").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    if tools.is_empty() {
        println!("{}", "No tools visible to this workspace".yellow());
        return Ok(());
    }

    for tool in tools {
        let path = tool.get("path").and_then(|v| v.as_str()).unwrap_or("?");
        let approval = tool.get("approval").and_then(|v| v.as_str());
        match approval {
            Some("required") => println!("  {} {}", path.bold(), "(approval required)".yellow()),
            _ => println!("  {}", path.bold()),
        }
    }
    Ok(())
}
