// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Tool-source compiler (§4.D): turns one `ToolSource` into a
//! `CompiledToolSource` plus its `RunnableTool`s, dispatching to the
//! matching `infrastructure::source_clients` adapter. Compilation is
//! deterministic given the same `ToolSource.config` bytes (§4.D).

use std::sync::Arc;

use thiserror::Error;

use crate::domain::tool_source::{CompiledToolSource, SourceType, ToolSource};
use crate::infrastructure::source_clients::{
    compile_graphql_schema, compile_mcp_source, compile_openapi_operations, fetch_openapi_document,
    introspect_schema, GraphQlSourceConfig, McpSourceConfig, RunnableTool, ToolRunError,
};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("invalid source config for '{0}': {1}")]
    InvalidConfig(String, String),
    #[error(transparent)]
    Transport(#[from] ToolRunError),
}

/// Compiles a single `ToolSource` into its definitions and runnable
/// handles. A transport failure on an MCP source is non-fatal: the caller
/// records it as a warning in the returned `CompiledToolSource` and the
/// rest of the workspace inventory still builds (§4.D).
pub async fn compile_source(
    source: &ToolSource,
    http_client: &reqwest::Client,
) -> Result<(CompiledToolSource, Vec<RunnableTool>), CompileError> {
    match source.source_type {
        SourceType::Mcp => {
            let endpoint = source
                .config
                .get("endpoint")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| CompileError::InvalidConfig(source.name.clone(), "missing endpoint".into()))?
                .to_string();
            let config = McpSourceConfig { endpoint };
            match compile_mcp_source(&source.name, &config).await {
                Ok((mut compiled, runnables)) => {
                    for def in &mut compiled.definitions {
                        def.source = Some(source.id);
                    }
                    Ok((compiled, runnables))
                }
                Err(e) => Ok((
                    CompiledToolSource {
                        source_id: Some(source.id),
                        definitions: Vec::new(),
                        warnings: vec![format!("mcp source '{}' failed to compile: {e}", source.name)],
                    },
                    Vec::new(),
                )),
            }
        }
        SourceType::OpenApi => {
            let base_url = source
                .config
                .get("baseUrl")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| CompileError::InvalidConfig(source.name.clone(), "missing baseUrl".into()))?;

            let document = if let Some(inline) = source.config.get("spec") {
                inline.clone()
            } else {
                let spec_url = source
                    .config
                    .get("specUrl")
                    .and_then(serde_json::Value::as_str)
                    .ok_or_else(|| {
                        CompileError::InvalidConfig(source.name.clone(), "missing spec or specUrl".into())
                    })?;
                fetch_openapi_document(http_client, spec_url).await?
            };

            let (mut compiled, runnables) = compile_openapi_operations(&source.name, &document, base_url);
            compiled.source_id = Some(source.id);
            for def in &mut compiled.definitions {
                def.source = Some(source.id);
            }
            Ok((compiled, runnables))
        }
        SourceType::GraphQl => {
            let endpoint = source
                .config
                .get("endpoint")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| CompileError::InvalidConfig(source.name.clone(), "missing endpoint".into()))?
                .to_string();
            let config = GraphQlSourceConfig { endpoint };
            let schema = introspect_schema(http_client, &config.endpoint).await?;
            let (mut compiled, runnables) = compile_graphql_schema(&source.name, &config, &schema);
            compiled.source_id = Some(source.id);
            for def in &mut compiled.definitions {
                def.source = Some(source.id);
            }
            Ok((compiled, runnables))
        }
    }
}

/// Compiles every enabled source for a workspace. Returns the merged
/// definitions/warnings and the full runnable map; a single source's
/// failure (beyond the non-fatal MCP case above) is recorded as a warning
/// rather than aborting the whole build, matching §4.D's resilience stance.
/// Upper bound on concurrent source compiles, regardless of how many
/// sources a workspace enables (§5: "bounded-parallelism fan-out... cap at
/// the lesser of core count and 8").
fn compiler_fan_out_limit() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).min(8)
}

/// Compiles every enabled source concurrently, bounded by a semaphore so a
/// workspace with many sources doesn't open unbounded simultaneous
/// connections to external MCP/OpenAPI/GraphQL endpoints. Each source's
/// outcome (success or compile failure, per §4.D) is independent; one
/// source failing never blocks or fails the others.
pub async fn compile_all(
    sources: &[ToolSource],
    http_client: &reqwest::Client,
) -> (Vec<CompiledToolSource>, Vec<Arc<RunnableTool>>) {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(compiler_fan_out_limit()));

    let handles: Vec<_> = sources
        .iter()
        .filter(|s| s.enabled)
        .cloned()
        .map(|source| {
            let permit_source = semaphore.clone();
            let client = http_client.clone();
            tokio::spawn(async move {
                let _permit = permit_source
                    .acquire_owned()
                    .await
                    .expect("compiler semaphore is never closed");
                match compile_source(&source, &client).await {
                    Ok((compiled, source_runnables)) => (compiled, source_runnables),
                    Err(e) => (
                        CompiledToolSource {
                            source_id: Some(source.id),
                            definitions: Vec::new(),
                            warnings: vec![format!("source '{}' failed to compile: {e}", source.name)],
                        },
                        Vec::new(),
                    ),
                }
            })
        })
        .collect();

    let mut compiled_sources = Vec::with_capacity(handles.len());
    let mut runnables = Vec::new();
    for handle in handles {
        let (compiled, source_runnables) = handle.await.expect("source compile task panicked");
        compiled_sources.push(compiled);
        runnables.extend(source_runnables.into_iter().map(Arc::new));
    }
    (compiled_sources, runnables)
}
