// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Daemon HTTP server implementation: assembles the core services from
//! process environment (§6.5) and serves the task-gate router.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::{Json, Router};
use sqlx::postgres::PgPool;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use taskgate_core::application::credential_service::CredentialService;
use taskgate_core::application::inventory_service::InventoryService;
use taskgate_core::application::lifecycle_service::LifecycleService;
use taskgate_core::application::mediator_service::MediatorService;
use taskgate_core::application::policy_service::PolicyService;
use taskgate_core::domain::repository::{
    AccessPolicyRepository, AnonymousSessionRepository, ApprovalRepository, AuthorizationCodeRepository,
    CredentialRepository, InventoryStateRepository, OAuthClientRepository, OAuthSigningKeyRepository,
    TaskEventRepository, TaskRepository, ToolCallRepository, ToolSourceRepository,
};
use taskgate_core::infrastructure::credential_backend::{LocalSecretBackend, SecretBackend, VaultSecretBackend};
use taskgate_core::infrastructure::event_bus::EventBus;
use taskgate_core::infrastructure::repositories::{
    postgres::{
        PostgresAccessPolicyRepository, PostgresAnonymousSessionRepository, PostgresApprovalRepository,
        PostgresAuthorizationCodeRepository, PostgresCredentialRepository, PostgresInventoryStateRepository,
        PostgresOAuthClientRepository, PostgresOAuthSigningKeyRepository, PostgresTaskEventRepository,
        PostgresTaskRepository, PostgresToolCallRepository, PostgresToolSourceRepository,
    },
    InMemoryAccessPolicyRepository, InMemoryAnonymousSessionRepository, InMemoryApprovalRepository,
    InMemoryAuthorizationCodeRepository, InMemoryCredentialRepository, InMemoryInventoryStateRepository,
    InMemoryOAuthClientRepository, InMemoryOAuthSigningKeyRepository, InMemoryTaskEventRepository,
    InMemoryTaskRepository, InMemoryToolCallRepository, InMemoryToolSourceRepository,
};
use taskgate_core::infrastructure::runtime_dispatch::{RemoteSandboxWorker, RuntimeRegistry, RuntimeWorker};
use taskgate_core::presentation::{self, AppConfig, AppState};

use super::{remove_pid_file, write_pid_file};

const EVENT_BUS_CAPACITY: usize = 1024;

pub async fn start_daemon(_config_path: Option<PathBuf>, port: u16) -> Result<()> {
    let pid = std::process::id();
    write_pid_file(pid)?;
    let _guard = PidFileGuard;

    info!("Task Gate task gate starting (PID: {})", pid);

    let host = std::env::var("TASKGATE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("TASKGATE_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(port);

    if let Some(metrics_port) = std::env::var("TASKGATE_METRICS_PORT").ok().and_then(|v| v.parse::<u16>().ok()) {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], metrics_port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!("Prometheus metrics exported on {}", addr);
    }

    let issuer = std::env::var("TASKGATE_ISSUER").unwrap_or_else(|_| format!("http://{host}:{port}"));
    let anonymous_oauth_enabled = std::env::var("MCP_ENABLE_ANONYMOUS_OAUTH").as_deref() == Ok("1");
    let upstream_authorization_server = std::env::var("MCP_AUTHORIZATION_SERVER").ok();
    let internal_token = std::env::var("EXECUTOR_INTERNAL_TOKEN")
        .context("EXECUTOR_INTERNAL_TOKEN must be set: the runtime callback surface has no default secret")?;
    let enabled_runtimes: Vec<String> = std::env::var("TASKGATE_RUNTIMES")
        .unwrap_or_else(|_| "js".to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let config = Arc::new(AppConfig {
        issuer,
        anonymous_oauth_enabled,
        upstream_authorization_server,
        internal_token: internal_token.clone(),
        enabled_runtimes: enabled_runtimes.clone(),
    });

    let database_url = std::env::var("DATABASE_URL").ok();
    let pool: Option<PgPool> = match database_url {
        Some(url) => {
            info!("connecting to PostgreSQL");
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await
                .context("failed to connect to PostgreSQL")?;
            Some(pool)
        }
        None => {
            info!("DATABASE_URL not set, using in-memory repositories");
            None
        }
    };

    let task_repo: Arc<dyn TaskRepository> = match &pool {
        Some(p) => Arc::new(PostgresTaskRepository::new(p.clone())),
        None => Arc::new(InMemoryTaskRepository::new()),
    };
    let event_repo: Arc<dyn TaskEventRepository> = match &pool {
        Some(p) => Arc::new(PostgresTaskEventRepository::new(p.clone())),
        None => Arc::new(InMemoryTaskEventRepository::new()),
    };
    let approval_repo: Arc<dyn ApprovalRepository> = match &pool {
        Some(p) => Arc::new(PostgresApprovalRepository::new(p.clone())),
        None => Arc::new(InMemoryApprovalRepository::new()),
    };
    let tool_call_repo: Arc<dyn ToolCallRepository> = match &pool {
        Some(p) => Arc::new(PostgresToolCallRepository::new(p.clone())),
        None => Arc::new(InMemoryToolCallRepository::new()),
    };
    let tool_source_repo: Arc<dyn ToolSourceRepository> = match &pool {
        Some(p) => Arc::new(PostgresToolSourceRepository::new(p.clone())),
        None => Arc::new(InMemoryToolSourceRepository::new()),
    };
    let policy_repo: Arc<dyn AccessPolicyRepository> = match &pool {
        Some(p) => Arc::new(PostgresAccessPolicyRepository::new(p.clone())),
        None => Arc::new(InMemoryAccessPolicyRepository::new()),
    };
    let credential_repo: Arc<dyn CredentialRepository> = match &pool {
        Some(p) => Arc::new(PostgresCredentialRepository::new(p.clone())),
        None => Arc::new(InMemoryCredentialRepository::new()),
    };
    let anon_sessions: Arc<dyn AnonymousSessionRepository> = match &pool {
        Some(p) => Arc::new(PostgresAnonymousSessionRepository::new(p.clone())),
        None => Arc::new(InMemoryAnonymousSessionRepository::new()),
    };
    let oauth_clients: Arc<dyn OAuthClientRepository> = match &pool {
        Some(p) => Arc::new(PostgresOAuthClientRepository::new(p.clone())),
        None => Arc::new(InMemoryOAuthClientRepository::new()),
    };
    let auth_codes: Arc<dyn AuthorizationCodeRepository> = match &pool {
        Some(p) => Arc::new(PostgresAuthorizationCodeRepository::new(p.clone())),
        None => Arc::new(InMemoryAuthorizationCodeRepository::new()),
    };
    let signing_keys: Arc<dyn OAuthSigningKeyRepository> = match &pool {
        Some(p) => Arc::new(PostgresOAuthSigningKeyRepository::new(p.clone())),
        None => Arc::new(InMemoryOAuthSigningKeyRepository::new()),
    };
    let inventory_state_repo: Arc<dyn InventoryStateRepository> = match &pool {
        Some(p) => Arc::new(PostgresInventoryStateRepository::new(p.clone())),
        None => Arc::new(InMemoryInventoryStateRepository::new()),
    };

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);

    let mut runtimes = RuntimeRegistry::new();
    for runtime_id in &enabled_runtimes {
        let env_key = format!("TASKGATE_RUNTIME_{}_ENDPOINT", runtime_id.to_uppercase());
        let Ok(endpoint) = std::env::var(&env_key) else {
            tracing::warn!(runtime_id, env_key, "no endpoint configured for runtime, dispatch will fail");
            continue;
        };
        let worker: Arc<dyn RuntimeWorker> = Arc::new(RemoteSandboxWorker::new(
            endpoint,
            config.issuer.clone(),
            internal_token.clone(),
        ));
        runtimes.register(runtime_id.clone(), worker);
    }

    let local_backend: Arc<dyn SecretBackend> = Arc::new(LocalSecretBackend);
    let vault_backend: Option<Arc<dyn SecretBackend>> = match std::env::var("EXECUTOR_SECRET_BACKEND").as_deref() {
        Ok("workos-vault") => {
            let addr = std::env::var("VAULT_ADDR").context("VAULT_ADDR required for workos-vault backend")?;
            let token = std::env::var("VAULT_TOKEN").context("VAULT_TOKEN required for workos-vault backend")?;
            let mount = std::env::var("VAULT_MOUNT").unwrap_or_else(|_| "secret".to_string());
            let settings = vaultrs::client::VaultClientSettingsBuilder::default()
                .address(addr)
                .token(token)
                .build()
                .map_err(|e| anyhow::anyhow!("failed to build vault client settings: {e}"))?;
            let client = vaultrs::client::VaultClient::new(settings)
                .map_err(|e| anyhow::anyhow!("failed to build vault client: {e}"))?;
            Some(Arc::new(VaultSecretBackend::new(client, mount)))
        }
        _ => None,
    };

    let credential_service = CredentialService::new(credential_repo, local_backend, vault_backend);
    let policy_service_for_mediator = PolicyService::new(policy_repo.clone());
    let policy_service = Arc::new(PolicyService::new(policy_repo));

    let lifecycle = Arc::new(LifecycleService::new(
        task_repo.clone(),
        event_repo.clone(),
        event_bus.clone(),
        runtimes,
        enabled_runtimes,
    ));
    let mediator = Arc::new(MediatorService::new(
        tool_call_repo,
        approval_repo,
        event_repo.clone(),
        event_bus.clone(),
        policy_service_for_mediator,
        credential_service,
    ));
    let inventory = Arc::new(InventoryService::new(tool_source_repo, inventory_state_repo, Vec::new()));

    let state = AppState {
        config,
        task_repo,
        event_repo,
        event_bus,
        lifecycle,
        mediator,
        inventory,
        policy: policy_service,
        anon_sessions,
        oauth_clients,
        auth_codes,
        signing_keys,
        signing_key_cache: taskgate_core::infrastructure::jwt::SigningKeyCache::new(),
    };

    state.bootstrap_signing_key().await.context("failed to bootstrap OAuth signing key")?;

    let start_time = Instant::now();
    let app = Router::new()
        .route("/health", get(move || health(start_time)))
        .merge(presentation::router(state));

    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("failed to bind to {addr}"))?;
    info!("Task Gate task gate listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Task Gate task gate shutting down");
    Ok(())
}

async fn health(start_time: Instant) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_seconds": start_time.elapsed().as_secs(),
    }))
}

struct PidFileGuard;

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        let _ = remove_pid_file();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
