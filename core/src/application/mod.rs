// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Application services: one per bounded responsibility in S4, each a thin
//! orchestration layer over the domain model and repository traits. No
//! transport concerns live here — see `crate::presentation` for the HTTP
//! surface that calls into these.

pub mod credential_service;
pub mod inventory_service;
pub mod lifecycle_service;
pub mod mediator_service;
pub mod policy_service;
pub mod tool_compiler;
