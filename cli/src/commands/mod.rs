// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for Task Gate CLI

pub mod config;
pub mod daemon;
pub mod oauth;
pub mod task;

pub use self::config::ConfigCommand;
pub use self::daemon::DaemonCommand;
pub use self::oauth::OauthCommand;
pub use self::task::TaskCommand;
