// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! # taskgate-core
//!
//! The runtime heart of the Task Gate task gate: a multi-tenant code-execution
//! service for AI agents. A client submits a code snippet ("task") that
//! invokes a curated catalog of external tools; this crate owns the task
//! state machine, the per-call access-control mediator, the per-workspace
//! tool inventory compiled from external specs, and an embedded anonymous
//! OAuth authorization server that mints bearer tokens for unauthenticated
//! MCP clients.
//!
//! ## Layer structure
//!
//! ```text
//! presentation/   <- MCP transport (axum), OAuth endpoints, runtime callback surface
//!     |
//! application/    <- use-cases: lifecycle, mediator, inventory, policy, credentials
//!     |
//! domain/         <- aggregates, value objects, domain events, repository traits
//!     |
//! infrastructure/ <- Postgres/in-memory repos, HTTP source clients, JWT, event bus
//! ```
//!
//! | Section | Domain/application module |
//! |---|---|
//! | Task lifecycle engine (S4.F) | [`domain::task`], [`application::lifecycle_service`] |
//! | Tool-call mediator (S4.G) | [`domain::tool_call`], [`application::mediator_service`] |
//! | Policy evaluator (S4.B) | [`domain::policy`], [`application::policy_service`] |
//! | Credential resolver (S4.C) | [`domain::credential`], [`application::credential_service`] |
//! | Tool-source compiler (S4.D) | [`application::tool_compiler`], [`infrastructure::source_clients`] |
//! | Workspace tool inventory (S4.E) | [`domain::inventory`], [`application::inventory_service`] |
//! | Anonymous OAuth server (S4.I) | [`domain::oauth`], [`infrastructure::jwt`] |

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;
