// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! The daemon has no config file: every setting is an environment variable
//! (S6.5). These commands read/validate that environment and can emit a
//! starter `.env` file for it.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

const ENV_EXAMPLE: &str = include_str!("../../templates/taskgate.env.example");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the configuration the daemon would read from the environment
    Show,

    /// Validate that required environment variables are present
    Validate,

    /// Write a starter .env file documenting every recognized variable
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./taskgate.env")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => show(),
        ConfigCommand::Validate => validate(),
        ConfigCommand::Generate { output } => generate(output),
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| format!("{default} (default)"))
}

fn env_opt(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| "(not set)".dimmed().to_string())
}

fn show() -> Result<()> {
    println!("{}", "Task gate configuration:".bold());
    println!();
    println!("  TASKGATE_HOST            {}", env_or("TASKGATE_HOST", "127.0.0.1"));
    println!("  TASKGATE_PORT            {}", env_or("TASKGATE_PORT", "8000"));
    println!("  TASKGATE_LOG_LEVEL       {}", env_or("TASKGATE_LOG_LEVEL", "info"));
    println!("  TASKGATE_ISSUER          {}", env_opt("TASKGATE_ISSUER"));
    println!("  DATABASE_URL             {}", env_opt("DATABASE_URL"));
    println!("  MCP_ENABLE_ANONYMOUS_OAUTH {}", env_opt("MCP_ENABLE_ANONYMOUS_OAUTH"));
    println!("  MCP_AUTHORIZATION_SERVER {}", env_opt("MCP_AUTHORIZATION_SERVER"));
    println!(
        "  EXECUTOR_INTERNAL_TOKEN  {}",
        if std::env::var("EXECUTOR_INTERNAL_TOKEN").is_ok() { "(set)".green().to_string() } else { "(not set)".red().to_string() }
    );
    println!("  EXECUTOR_SECRET_BACKEND  {}", env_or("EXECUTOR_SECRET_BACKEND", "local-convex"));
    println!("  TASKGATE_RUNTIMES           {}", env_or("TASKGATE_RUNTIMES", "js"));
    println!();
    Ok(())
}

fn validate() -> Result<()> {
    println!("Validating environment...");

    let mut problems = Vec::new();
    if std::env::var("EXECUTOR_INTERNAL_TOKEN").is_err() {
        problems.push("EXECUTOR_INTERNAL_TOKEN is required (runtime callback surface has no default secret)");
    }
    if std::env::var("EXECUTOR_SECRET_BACKEND").as_deref() == Ok("workos-vault") {
        for key in ["VAULT_ADDR", "VAULT_TOKEN"] {
            if std::env::var(key).is_err() {
                problems.push(match key {
                    "VAULT_ADDR" => "VAULT_ADDR is required when EXECUTOR_SECRET_BACKEND=workos-vault",
                    _ => "VAULT_TOKEN is required when EXECUTOR_SECRET_BACKEND=workos-vault",
                });
            }
        }
    }
    if let Ok(port) = std::env::var("TASKGATE_PORT") {
        if port.parse::<u16>().is_err() {
            problems.push("TASKGATE_PORT is not a valid port number");
        }
    }

    if problems.is_empty() {
        println!("{}", "✓ Configuration is valid".green());
        Ok(())
    } else {
        for p in &problems {
            println!("{} {}", "✗".red(), p);
        }
        anyhow::bail!("{} problem(s) found", problems.len())
    }
}

fn generate(output: PathBuf) -> Result<()> {
    std::fs::write(&output, ENV_EXAMPLE)?;
    println!("{}", format!("✓ Configuration written: {}", output.display()).green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_writes_env_example_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskgate.env");
        generate(path.clone()).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), ENV_EXAMPLE);
    }
}
