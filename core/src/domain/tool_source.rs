// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Tool source and compiled tool definitions (§3 ToolSource, §4.D).
//!
//! This module holds the data shapes only. The actual network I/O that
//! turns a `ToolSource` into a `CompiledToolSource` lives in
//! `application::compiler` (orchestration) and `infrastructure::source_clients`
//! (the MCP/OpenAPI/GraphQL HTTP adapters), matching the domain/infra split
//! used throughout this codebase: domain describes shapes and invariants,
//! infrastructure performs I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::credential::CredentialSpec;
use crate::domain::workspace::WorkspaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Mcp,
    OpenApi,
    GraphQl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolSourceId(pub Uuid);

impl ToolSourceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ToolSourceId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSource {
    pub id: ToolSourceId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub source_type: SourceType,
    pub config: Value,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ToolSource {
    pub fn new(workspace_id: WorkspaceId, name: impl Into<String>, source_type: SourceType, config: Value) -> Self {
        let now = Utc::now();
        Self {
            id: ToolSourceId::new(),
            workspace_id,
            name: name.into(),
            source_type,
            config,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One callable tool, produced by compiling a `ToolSource` (or a built-in
/// base tool such as `discover`). `metadata` is part of the signature
/// contributing to deterministic compilation (§4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub path: String,
    pub description: String,
    pub approval_required: bool,
    pub source: Option<ToolSourceId>,
    pub metadata: Value,
    pub credential_spec: Option<CredentialSpec>,
}

/// The catalog-list projection served by `tools/list` (§4.H), policy
/// filtered: `deny` tools are omitted entirely, `require_approval` tools
/// carry `approval: required`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub path: String,
    pub description: String,
    pub approval: Option<&'static str>,
}

impl ToolDescriptor {
    pub fn from_definition(def: &ToolDefinition, approval_required: bool) -> Self {
        Self {
            path: def.path.clone(),
            description: def.description.clone(),
            approval: if approval_required { Some("required") } else { None },
        }
    }
}

/// Output of compiling one `ToolSource`: a set of definitions plus any
/// non-fatal warnings (e.g. an MCP transport that failed to open still
/// lets the rest of the inventory build, per §4.D).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompiledToolSource {
    pub source_id: Option<ToolSourceId>,
    pub definitions: Vec<ToolDefinition>,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_hides_nothing_but_flags_approval() {
        let def = ToolDefinition {
            path: "admin.send_announcement".to_string(),
            description: "send".to_string(),
            approval_required: true,
            source: None,
            metadata: Value::Null,
            credential_spec: None,
        };
        let d = ToolDescriptor::from_definition(&def, true);
        assert_eq!(d.approval, Some("required"));
    }
}
