// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! HTTP adapters backing the Tool-Source Compiler (§4.D): one client per
//! source type, each producing `RunnableTool`s whose `run` performs the
//! actual network call. The domain's `ToolDefinition` stays data-only;
//! `RunnableTool` pairs it with the callable implementation, mirroring the
//! domain/infrastructure split the rest of this crate follows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::tool_source::{CompiledToolSource, ToolDefinition};

/// Bounded timeout for interactive spec/schema loads (§5).
pub const INTERACTIVE_TIMEOUT: Duration = Duration::from_secs(10);
/// Bounded timeout for background staleness-refresh scans (§5).
pub const STALE_REFRESH_TIMEOUT: Duration = Duration::from_millis(2_500);

#[derive(Debug, Error)]
pub enum ToolRunError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned an error: {0}")]
    Upstream(String),
}

/// The context a `run` implementation sees for a single invocation (§4.G
/// step 6 `ctx`).
pub struct ToolRunContext {
    pub task_id: String,
    pub workspace_id: String,
    pub actor_id: String,
    pub client_id: Option<String>,
    pub credential_headers: HashMap<String, String>,
}

#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, input: Value, ctx: &ToolRunContext) -> Result<Value, ToolRunError>;
}

/// A compiled tool paired with its callable implementation.
pub struct RunnableTool {
    pub definition: ToolDefinition,
    pub runner: Arc<dyn ToolRunner>,
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

// ---------------------------------------------------------------------
// MCP source
// ---------------------------------------------------------------------

/// Wraps a remote MCP server's tool list as local `ToolDefinition`s. `run`
/// re-opens the streamable-HTTP transport per call and forwards a
/// `tools/call` JSON-RPC request; the spec accepts this reconnect-per-call
/// cost in exchange for not holding a long-lived session across retries.
pub struct McpToolRunner {
    endpoint: String,
    remote_tool_name: String,
}

#[async_trait]
impl ToolRunner for McpToolRunner {
    async fn run(&self, input: Value, _ctx: &ToolRunContext) -> Result<Value, ToolRunError> {
        let client = http_client(INTERACTIVE_TIMEOUT);
        let body = json!({
            "jsonrpc": "2.0",
            "id": uuid::Uuid::new_v4().to_string(),
            "method": "tools/call",
            "params": { "name": self.remote_tool_name, "arguments": input },
        });
        let resp = client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .header("accept", "application/json, text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolRunError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ToolRunError::Transport(format!("mcp transport returned {}", resp.status())));
        }
        let value: Value = resp.json().await.map_err(|e| ToolRunError::Transport(e.to_string()))?;
        if let Some(error) = value.get("error") {
            return Err(ToolRunError::Upstream(error.to_string()));
        }
        Ok(value.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[derive(Debug, Clone)]
pub struct McpSourceConfig {
    pub endpoint: String,
}

/// Lists tools from a remote MCP server and compiles them into
/// `RunnableTool`s. A transport failure is non-fatal per §4.D: the caller
/// records it as a warning and the rest of the inventory still builds.
pub async fn compile_mcp_source(
    source_name: &str,
    config: &McpSourceConfig,
) -> Result<(CompiledToolSource, Vec<RunnableTool>), ToolRunError> {
    let client = http_client(INTERACTIVE_TIMEOUT);
    let body = json!({
        "jsonrpc": "2.0",
        "id": uuid::Uuid::new_v4().to_string(),
        "method": "tools/list",
        "params": {},
    });
    let resp = client
        .post(&config.endpoint)
        .header("content-type", "application/json")
        .header("accept", "application/json, text/event-stream")
        .json(&body)
        .send()
        .await
        .map_err(|e| ToolRunError::Transport(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(ToolRunError::Transport(format!("mcp transport returned {}", resp.status())));
    }
    let value: Value = resp.json().await.map_err(|e| ToolRunError::Transport(e.to_string()))?;
    let tools = value["result"]["tools"].as_array().cloned().unwrap_or_default();

    let mut definitions = Vec::new();
    let mut runnables = Vec::new();
    for tool in tools {
        let remote_name = tool["name"].as_str().unwrap_or_default().to_string();
        if remote_name.is_empty() {
            continue;
        }
        let path = format!("{source_name}.{remote_name}");
        let description = tool["description"].as_str().unwrap_or_default().to_string();
        let definition = ToolDefinition {
            path: path.clone(),
            description,
            approval_required: false,
            source: None,
            metadata: tool.clone(),
            credential_spec: None,
        };
        definitions.push(definition.clone());
        runnables.push(RunnableTool {
            definition,
            runner: Arc::new(McpToolRunner { endpoint: config.endpoint.clone(), remote_tool_name: remote_name }),
        });
    }
    definitions.sort_by(|a, b| a.path.cmp(&b.path));

    Ok((CompiledToolSource { source_id: None, definitions, warnings: Vec::new() }, runnables))
}

// ---------------------------------------------------------------------
// OpenAPI source
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OpenApiSourceConfig {
    pub spec_url: Option<String>,
    pub spec_inline: Option<Value>,
    pub base_url: Option<String>,
}

/// One extracted OpenAPI operation, ready to be turned into a
/// `ToolDefinition` + runner.
#[derive(Debug, Clone)]
struct OpenApiOperation {
    operation_id: String,
    method: String,
    path_template: String,
    description: String,
}

pub async fn fetch_openapi_document(
    client: &reqwest::Client,
    spec_url: &str,
) -> Result<Value, ToolRunError> {
    let resp = client.get(spec_url).send().await.map_err(|e| ToolRunError::Transport(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(ToolRunError::Transport(format!("openapi fetch returned {}", resp.status())));
    }
    resp.json().await.map_err(|e| ToolRunError::Transport(e.to_string()))
}

/// Resolves local `#/...` JSON-pointer `$ref`s against the document root.
/// External refs are left untouched (out of scope: most catalog specs in
/// this system are single-file).
fn deref(document: &Value, node: &Value) -> Value {
    if let Some(ref_path) = node.get("$ref").and_then(Value::as_str) {
        if let Some(pointer) = ref_path.strip_prefix('#') {
            if let Some(resolved) = document.pointer(pointer) {
                return deref(document, resolved);
            }
        }
    }
    node.clone()
}

fn extract_operations(document: &Value) -> Vec<OpenApiOperation> {
    let mut operations = Vec::new();
    let Some(paths) = document.get("paths").and_then(Value::as_object) else {
        return operations;
    };
    let mut path_keys: Vec<&String> = paths.keys().collect();
    path_keys.sort();

    for path_key in path_keys {
        let item = deref(document, &paths[path_key]);
        let Some(item_obj) = item.as_object() else { continue };
        let mut methods: Vec<&String> = item_obj
            .keys()
            .filter(|k| matches!(k.as_str(), "get" | "post" | "put" | "patch" | "delete"))
            .collect();
        methods.sort();

        for method in methods {
            let op = deref(document, &item_obj[method]);
            let operation_id = op
                .get("operationId")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{method}_{}", path_key.replace('/', "_").trim_matches('_')));
            let description = op
                .get("summary")
                .or_else(|| op.get("description"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            operations.push(OpenApiOperation {
                operation_id,
                method: method.to_uppercase(),
                path_template: path_key.clone(),
                description,
            });
        }
    }
    operations.sort_by(|a, b| a.operation_id.cmp(&b.operation_id));
    operations
}

pub struct OpenApiToolRunner {
    base_url: String,
    method: String,
    path_template: String,
}

fn substitute_path_params(template: &str, input: &Value) -> String {
    let mut path = template.to_string();
    if let Some(obj) = input.as_object() {
        for (key, value) in obj {
            let placeholder = format!("{{{key}}}");
            if path.contains(&placeholder) {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                path = path.replace(&placeholder, &rendered);
            }
        }
    }
    path
}

#[async_trait]
impl ToolRunner for OpenApiToolRunner {
    async fn run(&self, input: Value, ctx: &ToolRunContext) -> Result<Value, ToolRunError> {
        let client = http_client(INTERACTIVE_TIMEOUT);
        let path = substitute_path_params(&self.path_template, &input);
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);

        let mut request = client.request(
            reqwest::Method::from_bytes(self.method.as_bytes()).unwrap_or(reqwest::Method::GET),
            &url,
        );
        for (name, value) in &ctx.credential_headers {
            request = request.header(name, value);
        }
        if matches!(self.method.as_str(), "POST" | "PUT" | "PATCH") {
            request = request.json(&input);
        }

        let resp = request.send().await.map_err(|e| ToolRunError::Transport(e.to_string()))?;
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(ToolRunError::Upstream(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }
}

pub fn compile_openapi_operations(
    source_name: &str,
    document: &Value,
    base_url: &str,
) -> (CompiledToolSource, Vec<RunnableTool>) {
    let operations = extract_operations(document);
    let mut definitions = Vec::new();
    let mut runnables = Vec::new();

    for op in operations {
        let path = format!("{source_name}.{}", op.operation_id);
        let definition = ToolDefinition {
            path: path.clone(),
            description: op.description,
            approval_required: false,
            source: None,
            metadata: json!({ "method": op.method, "path": op.path_template }),
            credential_spec: None,
        };
        definitions.push(definition.clone());
        runnables.push(RunnableTool {
            definition,
            runner: Arc::new(OpenApiToolRunner {
                base_url: base_url.to_string(),
                method: op.method,
                path_template: op.path_template,
            }),
        });
    }

    (CompiledToolSource { source_id: None, definitions, warnings: Vec::new() }, runnables)
}

// ---------------------------------------------------------------------
// GraphQL source
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GraphQlSourceConfig {
    pub endpoint: String,
}

const INTROSPECTION_QUERY: &str = r#"
query IntrospectionQuery {
  __schema {
    queryType { fields { name description } }
    mutationType { fields { name description } }
  }
}
"#;

pub async fn introspect_schema(client: &reqwest::Client, endpoint: &str) -> Result<Value, ToolRunError> {
    let resp = client
        .post(endpoint)
        .json(&json!({ "query": INTROSPECTION_QUERY }))
        .send()
        .await
        .map_err(|e| ToolRunError::Transport(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(ToolRunError::Transport(format!("graphql introspection returned {}", resp.status())));
    }
    resp.json().await.map_err(|e| ToolRunError::Transport(e.to_string()))
}

/// Issues the stored raw operation against the endpoint, carrying
/// `variables` from the input (§4.D "a single POST against the endpoint
/// carrying the stored query plus variables").
pub struct GraphQlRawRunner {
    endpoint: String,
}

#[async_trait]
impl ToolRunner for GraphQlRawRunner {
    async fn run(&self, input: Value, ctx: &ToolRunContext) -> Result<Value, ToolRunError> {
        let client = http_client(INTERACTIVE_TIMEOUT);
        let query = input.get("query").and_then(Value::as_str).unwrap_or_default();
        let variables = input.get("variables").cloned().unwrap_or(json!({}));

        let mut request = client.post(&self.endpoint).json(&json!({ "query": query, "variables": variables }));
        for (name, value) in &ctx.credential_headers {
            request = request.header(name, value);
        }
        let resp = request.send().await.map_err(|e| ToolRunError::Transport(e.to_string()))?;
        let body: Value = resp.json().await.map_err(|e| ToolRunError::Transport(e.to_string()))?;
        if let Some(errors) = body.get("errors") {
            return Err(ToolRunError::Upstream(errors.to_string()));
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

/// One root field promoted to a single-field tool. `run` wraps the field
/// in a minimal query/mutation document.
pub struct GraphQlFieldRunner {
    endpoint: String,
    operation: &'static str,
    field: String,
}

#[async_trait]
impl ToolRunner for GraphQlFieldRunner {
    async fn run(&self, input: Value, ctx: &ToolRunContext) -> Result<Value, ToolRunError> {
        let client = http_client(INTERACTIVE_TIMEOUT);
        let query = format!("{} {{ {}(input: $input) }}", self.operation, self.field);
        let mut request = client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": { "input": input } }));
        for (name, value) in &ctx.credential_headers {
            request = request.header(name, value);
        }
        let resp = request.send().await.map_err(|e| ToolRunError::Transport(e.to_string()))?;
        let body: Value = resp.json().await.map_err(|e| ToolRunError::Transport(e.to_string()))?;
        if let Some(errors) = body.get("errors") {
            return Err(ToolRunError::Upstream(errors.to_string()));
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

fn field_names(schema: &Value, type_key: &str) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = schema["data"]["__schema"][type_key]["fields"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|f| {
                    let name = f["name"].as_str()?.to_string();
                    let desc = f["description"].as_str().unwrap_or_default().to_string();
                    Some((name, desc))
                })
                .collect()
        })
        .unwrap_or_default();
    fields.sort();
    fields
}

/// Compiles one tool per root field plus the single raw-operation tool
/// (§4.D GraphQL source).
pub fn compile_graphql_schema(
    source_name: &str,
    config: &GraphQlSourceConfig,
    schema: &Value,
) -> (CompiledToolSource, Vec<RunnableTool>) {
    let mut definitions = Vec::new();
    let mut runnables = Vec::new();

    for (operation, type_key) in [("query", "queryType"), ("mutation", "mutationType")] {
        for (field, description) in field_names(schema, type_key) {
            let path = format!("{source_name}.{operation}.{field}");
            let definition = ToolDefinition {
                path: path.clone(),
                description,
                approval_required: false,
                source: None,
                metadata: json!({ "operation": operation, "field": field }),
                credential_spec: None,
            };
            definitions.push(definition.clone());
            let operation_static: &'static str = if operation == "query" { "query" } else { "mutation" };
            runnables.push(RunnableTool {
                definition,
                runner: Arc::new(GraphQlFieldRunner {
                    endpoint: config.endpoint.clone(),
                    operation: operation_static,
                    field,
                }),
            });
        }
    }

    for operation in ["query", "mutation"] {
        let path = format!("{source_name}.{operation}");
        let definition = ToolDefinition {
            path: path.clone(),
            description: format!("Run a raw GraphQL {operation} against {source_name}"),
            approval_required: false,
            source: None,
            metadata: json!({ "raw": true, "operation": operation }),
            credential_spec: None,
        };
        definitions.push(definition.clone());
        runnables.push(RunnableTool {
            definition,
            runner: Arc::new(GraphQlRawRunner { endpoint: config.endpoint.clone() }),
        });
    }

    definitions.sort_by(|a, b| a.path.cmp(&b.path));
    (CompiledToolSource { source_id: None, definitions, warnings: Vec::new() }, runnables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_operations_is_sorted_and_deterministic() {
        let document = json!({
            "paths": {
                "/b": { "get": { "operationId": "getB" } },
                "/a": { "get": { "operationId": "getA" }, "post": { "operationId": "postA" } },
            }
        });
        let ops = extract_operations(&document);
        let ids: Vec<&str> = ops.iter().map(|o| o.operation_id.as_str()).collect();
        assert_eq!(ids, vec!["getA", "getB", "postA"]);
    }

    #[test]
    fn deref_resolves_local_json_pointer() {
        let document = json!({
            "components": { "schemas": { "Widget": { "type": "object" } } },
            "paths": {}
        });
        let node = json!({ "$ref": "/components/schemas/Widget" });
        let resolved = deref(&document, &node);
        assert_eq!(resolved, json!({ "type": "object" }));
    }

    #[test]
    fn substitute_path_params_replaces_named_segment() {
        let rendered = substitute_path_params("/widgets/{id}/parts", &json!({ "id": "w-1" }));
        assert_eq!(rendered, "/widgets/w-1/parts");
    }

    #[test]
    fn graphql_field_extraction_is_sorted() {
        let schema = json!({
            "data": {
                "__schema": {
                    "queryType": { "fields": [ {"name": "zField"}, {"name": "aField"} ] },
                    "mutationType": { "fields": [] },
                }
            }
        });
        let fields = field_names(&schema, "queryType");
        assert_eq!(fields.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(), vec!["aField", "zField"]);
    }
}
