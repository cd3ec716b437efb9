// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! HTTP surface (S4.H, S4.I, S6): translates external requests into
//! application-service calls. No business logic lives here.
//!
//! | Module | Surface |
//! |--------|---------|
//! | [`mcp`] | `/mcp`, `/mcp/anonymous` — tool catalog and `run_code` |
//! | [`oauth`] | self-issued anonymous OAuth authorization server |
//! | [`internal`] | runtime callback surface, authenticated by `internal_secret` |

pub mod error;
pub mod internal;
pub mod mcp;
pub mod oauth;
pub mod state;

use axum::routing::{get, post};
use axum::Router;

pub use state::{AppConfig, AppState};

/// Builds the full axum router (S6): OAuth discovery/registration/token
/// endpoints, the MCP transport under both its authenticated and anonymous
/// paths, and the internal runtime callback surface.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/.well-known/oauth-protected-resource", get(oauth::protected_resource_metadata))
        .route("/.well-known/oauth-authorization-server", get(oauth::authorization_server_metadata))
        .route("/oauth2/jwks", get(oauth::jwks))
        .route("/register", post(oauth::register))
        .route("/authorize", get(oauth::authorize))
        .route("/token", post(oauth::token))
        .route("/mcp", post(mcp::post).get(mcp::get).delete(mcp::delete))
        .route("/mcp/anonymous", post(mcp::post).get(mcp::get).delete(mcp::delete))
        .route("/internal/tool-call", post(internal::handle_tool_call))
        .route("/internal/run-complete", post(internal::complete_run))
        .with_state(state)
}
