// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Workspace tool inventory (§4.E): signature-keyed compilation, the
//! single-flight build row, layered snapshot caching, and the merged
//! `base_tools ⊎ external_tools` tool map served to the mediator and the
//! MCP transport.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use thiserror::Error;

use crate::domain::inventory::{compute_signature, BuildId};
use crate::domain::repository::{InventoryStateRepository, RepositoryError, ToolSourceRepository};
use crate::domain::tool_source::{CompiledToolSource, ToolDefinition, ToolDescriptor};
use crate::domain::workspace::WorkspaceId;
use crate::infrastructure::levenshtein::SuggestionIndex;
use crate::infrastructure::source_clients::RunnableTool;

use super::tool_compiler::compile_all;

const DISCOVER_TOOL_PATH: &str = "discover";

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// One compiled, cacheable snapshot of a workspace's full tool set.
pub struct InventorySnapshot {
    pub signature: String,
    pub definitions: HashMap<String, ToolDefinition>,
    pub runnables: HashMap<String, Arc<RunnableTool>>,
    pub warnings: Vec<String>,
    pub suggestion_index: SuggestionIndex,
}

impl InventorySnapshot {
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut list: Vec<ToolDescriptor> = self
            .definitions
            .values()
            .map(|d| ToolDescriptor::from_definition(d, d.approval_required))
            .collect();
        list.sort_by(|a, b| a.path.cmp(&b.path));
        list
    }
}

/// Builds, caches, and serves per-workspace compiled tool inventories.
pub struct InventoryService {
    tool_source_repo: Arc<dyn ToolSourceRepository>,
    state_repo: Arc<dyn InventoryStateRepository>,
    http_client: reqwest::Client,
    /// Tier 1 snapshot cache keyed by `sig(ws)` (§4.E layered caching).
    snapshot_cache: DashMap<String, Arc<InventorySnapshot>>,
    base_tools: Vec<ToolDefinition>,
}

impl InventoryService {
    pub fn new(
        tool_source_repo: Arc<dyn ToolSourceRepository>,
        state_repo: Arc<dyn InventoryStateRepository>,
        base_tools: Vec<ToolDefinition>,
    ) -> Self {
        Self {
            tool_source_repo,
            state_repo,
            http_client: reqwest::Client::new(),
            snapshot_cache: DashMap::new(),
            base_tools,
        }
    }

    async fn current_signature(&self, workspace_id: WorkspaceId) -> Result<String, InventoryError> {
        let sources = self.tool_source_repo.find_by_workspace(workspace_id).await?;
        let fingerprint: Vec<(uuid::Uuid, i64, bool)> = sources
            .iter()
            .map(|s| (s.id.0, s.updated_at.timestamp_millis(), s.enabled))
            .collect();
        Ok(compute_signature(workspace_id, fingerprint))
    }

    /// Runs the single-flight build: returns the cached snapshot
    /// immediately if the stored signature is current, otherwise compiles a
    /// fresh one under the workspace's `InventoryBuildState` coordination
    /// row (§4.E, §5).
    pub async fn build(&self, workspace_id: WorkspaceId) -> Result<Arc<InventorySnapshot>, InventoryError> {
        let signature = self.current_signature(workspace_id).await?;

        if let Some(snapshot) = self.snapshot_cache.get(&signature) {
            return Ok(snapshot.clone());
        }

        let mut state = self.state_repo.load(workspace_id).await?;
        let build_id = state.start_build();
        self.state_repo.save(workspace_id, &state).await?;

        let snapshot = self.compile_fresh(workspace_id, &signature).await;

        state = self.state_repo.load(workspace_id).await?;
        match &snapshot {
            Ok(_) => state.complete_build(build_id, signature.clone()),
            Err(e) => state.fail_build(build_id, e.to_string()),
        }
        self.state_repo.save(workspace_id, &state).await?;

        let snapshot = Arc::new(snapshot?);
        self.snapshot_cache.insert(signature, snapshot.clone());
        Ok(snapshot)
    }

    async fn compile_fresh(
        &self,
        workspace_id: WorkspaceId,
        signature: &str,
    ) -> Result<InventorySnapshot, InventoryError> {
        let sources = self.tool_source_repo.find_by_workspace(workspace_id).await?;
        let (compiled_sources, runnables): (Vec<CompiledToolSource>, Vec<Arc<RunnableTool>>) =
            compile_all(&sources, &self.http_client).await;

        let mut definitions: HashMap<String, ToolDefinition> = HashMap::new();
        let mut runnable_map: HashMap<String, Arc<RunnableTool>> = HashMap::new();
        let mut warnings = Vec::new();

        // base_tools always win; external tools may overwrite each other
        // (later source wins, with a warning) but never a base tool (§4.E).
        for def in &self.base_tools {
            definitions.insert(def.path.clone(), def.clone());
        }

        for compiled in &compiled_sources {
            warnings.extend(compiled.warnings.clone());
        }
        for runnable in runnables {
            let path = runnable.definition.path.clone();
            if definitions.contains_key(&path) && self.base_tools.iter().any(|b| b.path == path) {
                continue;
            }
            if definitions.contains_key(&path) {
                warnings.push(format!("tool path '{path}' redefined by a later source"));
            }
            definitions.insert(path.clone(), runnable.definition.clone());
            runnable_map.insert(path, runnable);
        }

        let discover_descriptors: Vec<ToolDescriptor> = definitions
            .values()
            .map(|d| ToolDescriptor::from_definition(d, d.approval_required))
            .collect();
        definitions.insert(
            DISCOVER_TOOL_PATH.to_string(),
            ToolDefinition {
                path: DISCOVER_TOOL_PATH.to_string(),
                description: "List every tool visible in this workspace".to_string(),
                approval_required: false,
                source: None,
                metadata: json!({ "descriptors": discover_descriptors }),
                credential_spec: None,
            },
        );

        let suggestion_index = SuggestionIndex::build(definitions.keys().cloned());

        Ok(InventorySnapshot {
            signature: signature.to_string(),
            definitions,
            runnables: runnable_map,
            warnings,
            suggestion_index,
        })
    }

    /// Optimistic read: returns the stale cached snapshot for `signature` if
    /// one is resident, without blocking on a rebuild (§4.E staleness
    /// policy). The mutation path should call `build` instead.
    pub fn peek(&self, signature: &str) -> Option<Arc<InventorySnapshot>> {
        self.snapshot_cache.get(signature).map(|e| e.clone())
    }
}

/// Normalizes a tool path for alias resolution (§4.G step 2): lowercase and
/// strip non-alphanumerics, segment by segment.
pub fn normalize_path(path: &str) -> String {
    path.split('.')
        .map(|seg| seg.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase())
        .collect::<Vec<_>>()
        .join(".")
}

/// Resolves `tool_path` against `definitions` directly, then via alias
/// normalization if a unique normalized hit exists (§4.G step 2).
pub fn resolve_alias<'a>(
    definitions: &'a HashMap<String, ToolDefinition>,
    tool_path: &str,
) -> Option<&'a ToolDefinition> {
    if let Some(def) = definitions.get(tool_path) {
        return Some(def);
    }
    let normalized_query = normalize_path(tool_path);
    let mut matches = definitions.values().filter(|d| normalize_path(&d.path) == normalized_query);
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::{InMemoryInventoryStateRepository, InMemoryToolSourceRepository};

    #[tokio::test]
    async fn build_with_no_sources_yields_discover_only() {
        let service = InventoryService::new(
            Arc::new(InMemoryToolSourceRepository::new()),
            Arc::new(InMemoryInventoryStateRepository::new()),
            Vec::new(),
        );
        let workspace_id = WorkspaceId::new();
        let snapshot = service.build(workspace_id).await.unwrap();
        assert!(snapshot.definitions.contains_key(DISCOVER_TOOL_PATH));
    }

    #[tokio::test]
    async fn second_build_with_unchanged_sources_hits_snapshot_cache() {
        let service = InventoryService::new(
            Arc::new(InMemoryToolSourceRepository::new()),
            Arc::new(InMemoryInventoryStateRepository::new()),
            Vec::new(),
        );
        let workspace_id = WorkspaceId::new();
        let first = service.build(workspace_id).await.unwrap();
        let second = service.build(workspace_id).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn alias_resolution_matches_case_and_punctuation_insensitively() {
        let mut definitions = HashMap::new();
        definitions.insert(
            "fs.read_file".to_string(),
            ToolDefinition {
                path: "fs.read_file".to_string(),
                description: String::new(),
                approval_required: false,
                source: None,
                metadata: serde_json::Value::Null,
                credential_spec: None,
            },
        );
        let resolved = resolve_alias(&definitions, "FS.ReadFile").unwrap();
        assert_eq!(resolved.path, "fs.read_file");
    }
}
