// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Task Gate CLI library - exposes testable components

pub mod commands;
pub mod daemon;
