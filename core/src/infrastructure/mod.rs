// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

pub mod repositories;
pub mod event_bus;
pub mod spec_cache;
pub mod credential_backend;
pub mod source_clients;
pub mod jwt;
pub mod runtime_dispatch;
pub mod levenshtein;
