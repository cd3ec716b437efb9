// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Credential model (§3 SourceCredential, §4.C Credential Resolver).

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::workspace::WorkspaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialScope {
    Workspace,
    Actor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Bearer,
    ApiKey,
    Basic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretBackend {
    LocalConvex,
    WorkosVault,
}

/// The auth spec a `ToolDefinition` declares it needs, independent of
/// where the actual secret is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSpec {
    pub source_key: String,
    pub scope: CredentialScope,
    pub auth_type: AuthType,
    pub header_name: Option<String>,
    pub static_secret_json: Option<Value>,
}

/// The stored secret payload: either the value itself (`local-convex`) or
/// an opaque object id resolved against an external vault (`workos-vault`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecretPayload {
    Inline { value: Value },
    VaultRef { object_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialBinding {
    pub workspace_id: WorkspaceId,
    pub source_key: String,
    pub scope: CredentialScope,
    pub actor_id: Option<String>,
    pub backend: SecretBackend,
    pub payload: SecretPayload,
    pub header_overrides: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialId(pub Uuid);

impl CredentialId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CredentialId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCredential {
    pub id: CredentialId,
    pub workspace_id: WorkspaceId,
    pub bindings: Vec<CredentialBinding>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Missing credential for source '{0}' ({1:?} scope)")]
    Missing(String, CredentialScope),
}

/// Built HTTP headers for a resolved credential (§4.C steps 3-4).
pub fn build_headers(
    auth_type: AuthType,
    header_name: Option<&str>,
    secret_value: &Value,
    overrides: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    match auth_type {
        AuthType::Bearer => {
            if let Some(token) = secret_value.as_str() {
                headers.insert("Authorization".to_string(), format!("Bearer {token}"));
            }
        }
        AuthType::ApiKey => {
            let name = header_name.unwrap_or("x-api-key").to_string();
            if let Some(value) = secret_value.as_str() {
                headers.insert(name, value.to_string());
            }
        }
        AuthType::Basic => {
            if let Some(obj) = secret_value.as_object() {
                let user = obj.get("user").and_then(Value::as_str).unwrap_or("");
                let password = obj.get("password").and_then(Value::as_str).unwrap_or("");
                let encoded = STANDARD.encode(format!("{user}:{password}"));
                headers.insert("Authorization".to_string(), format!("Basic {encoded}"));
            }
        }
    }
    for (k, v) in overrides {
        headers.insert(k.clone(), v.clone());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bearer_header_shape() {
        let headers = build_headers(AuthType::Bearer, None, &json!("tok-123"), &HashMap::new());
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer tok-123");
    }

    #[test]
    fn api_key_defaults_header_name() {
        let headers = build_headers(AuthType::ApiKey, None, &json!("k-1"), &HashMap::new());
        assert_eq!(headers.get("x-api-key").unwrap(), "k-1");
    }

    #[test]
    fn api_key_respects_custom_header_name() {
        let headers = build_headers(AuthType::ApiKey, Some("X-Custom"), &json!("k-1"), &HashMap::new());
        assert_eq!(headers.get("X-Custom").unwrap(), "k-1");
    }

    #[test]
    fn basic_header_base64_encodes_user_and_password() {
        let headers = build_headers(
            AuthType::Basic,
            None,
            &json!({"user": "u", "password": "p"}),
            &HashMap::new(),
        );
        let expected = format!("Basic {}", STANDARD.encode("u:p"));
        assert_eq!(headers.get("Authorization").unwrap(), &expected);
    }

    #[test]
    fn overrides_are_merged_on_top() {
        let mut overrides = HashMap::new();
        overrides.insert("Authorization".to_string(), "Bearer override".to_string());
        let headers = build_headers(AuthType::Bearer, None, &json!("tok"), &overrides);
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer override");
    }
}
