// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for talking to a running daemon: MCP JSON-RPC over `/mcp`
//! plus the dynamic client registration endpoint. This is the same
//! contract any external MCP client exercises; the CLI has no private API.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct DaemonClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Clone)]
pub struct RunCodeRequest {
    pub code: String,
    pub runtime_id: String,
    pub timeout_ms: u64,
    pub workspace_id: String,
    pub actor_id: String,
}

#[derive(Debug, Clone)]
pub struct RunCodeResult {
    pub is_error: bool,
    pub text: String,
}

impl DaemonClient {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let client = Client::builder().build().context("failed to create HTTP client")?;
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}:{port}")
        } else {
            format!("http://{host}:{port}")
        };
        Ok(Self { client, base_url })
    }

    pub async fn health(&self) -> Result<Value> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .context("failed to reach daemon health endpoint")?;
        resp.json().await.context("failed to parse health response")
    }

    /// `tools/list` against `/mcp/anonymous`, using the legacy unauthenticated
    /// `actorId` query-param path.
    pub async fn list_tools(&self, workspace_id: &str, actor_id: &str) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/list",
            "params": {},
        });
        self.rpc(workspace_id, actor_id, &body).await
    }

    /// `tools/call run_code` against `/mcp/anonymous`. Blocks until the task
    /// reaches a terminal state, same as the handler does server-side.
    pub async fn run_code(&self, req: RunCodeRequest) -> Result<RunCodeResult> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {
                "name": "run_code",
                "arguments": {
                    "code": req.code,
                    "runtimeId": req.runtime_id,
                    "timeoutMs": req.timeout_ms,
                },
            },
        });
        let result = self.rpc(&req.workspace_id, &req.actor_id, &body).await?;
        let content = result
            .get("content")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(|c| c.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let is_error = result.get("isError").and_then(Value::as_bool).unwrap_or(false);
        Ok(RunCodeResult { is_error, text: content })
    }

    async fn rpc(&self, workspace_id: &str, actor_id: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/mcp/anonymous?workspaceId={}&actorId={}", self.base_url, workspace_id, actor_id);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .context("failed to reach /mcp/anonymous")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("MCP request failed: {}", error_text);
        }

        let envelope: Value = response.json().await.context("failed to parse JSON-RPC response")?;
        if let Some(error) = envelope.get("error") {
            anyhow::bail!("MCP error: {}", error);
        }
        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }

    /// `POST /register` (RFC 7591 dynamic registration), used by `taskgate oauth register`.
    pub async fn register_client(&self, client_name: Option<String>, redirect_uris: Vec<String>) -> Result<RegisterResponse> {
        #[derive(Serialize)]
        struct RegisterRequest {
            client_name: Option<String>,
            redirect_uris: Vec<String>,
        }

        let response = self
            .client
            .post(format!("{}/register", self.base_url))
            .json(&RegisterRequest { client_name, redirect_uris })
            .send()
            .await
            .context("failed to reach /register")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("client registration failed: {}", error_text);
        }

        response.json().await.context("failed to parse registration response")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegisterResponse {
    pub client_id: String,
    pub client_name: Option<String>,
    pub redirect_uris: Vec<String>,
    pub client_id_issued_at: i64,
    pub token_endpoint_auth_method: String,
}
