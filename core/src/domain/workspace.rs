// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Tenancy primitives: organizations, workspaces, accounts and the
//! workspace-scoped anonymous sessions minted by the OAuth server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrganizationId(pub Uuid);

impl OrganizationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrganizationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceId(pub Uuid);

impl WorkspaceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for WorkspaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub Uuid);

impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountProvider {
    ExternalOidc,
    Anonymous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Deleted,
}

/// An end-user or anonymous identity. Never physically deleted: `status`
/// moves to `Deleted` but the row (and its id) remain addressable forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub provider: AccountProvider,
    pub provider_account_id: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(provider: AccountProvider, provider_account_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::new(),
            provider,
            provider_account_id: provider_account_id.into(),
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn deactivate(&mut self) {
        self.status = AccountStatus::Deleted;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(organization_id: OrganizationId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkspaceId::new(),
            organization_id,
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Workspace-scoped guest identity bootstrapped without any external IdP.
///
/// Two id families: a caller-provided id starting with `mcp_` is honored
/// verbatim; anything else is ignored in favor of a minted
/// `anon_session_<uuid>`. See `AnonymousSession::resolve_session_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymousSession {
    pub session_id: String,
    pub workspace_id: WorkspaceId,
    pub actor_id: String,
    pub account_id: AccountId,
    pub created_at: DateTime<Utc>,
}

impl AnonymousSession {
    /// Applies the session-id family rule from §3/§9: `mcp_`-prefixed
    /// caller ids are honored verbatim, everything else is replaced.
    pub fn resolve_session_id(caller_provided: Option<&str>) -> String {
        match caller_provided {
            Some(id) if id.starts_with("mcp_") => id.to_string(),
            _ => format!("anon_session_{}", Uuid::new_v4()),
        }
    }

    pub fn new(workspace_id: WorkspaceId, caller_provided_session_id: Option<&str>) -> Self {
        Self {
            session_id: Self::resolve_session_id(caller_provided_session_id),
            workspace_id,
            actor_id: format!("anon_{}", Uuid::new_v4()),
            account_id: AccountId::new(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mcp_prefixed_session_id_is_honored_verbatim() {
        let id = AnonymousSession::resolve_session_id(Some("mcp_custom123"));
        assert_eq!(id, "mcp_custom123");
    }

    #[test]
    fn non_prefixed_session_id_is_replaced() {
        let id = AnonymousSession::resolve_session_id(Some("web_session_1"));
        assert!(id.starts_with("anon_session_"));
    }

    #[test]
    fn missing_session_id_is_minted() {
        let id = AnonymousSession::resolve_session_id(None);
        assert!(id.starts_with("anon_session_"));
    }

    #[test]
    fn anonymous_actor_ids_are_prefixed() {
        let s = AnonymousSession::new(WorkspaceId::new(), None);
        assert!(s.actor_id.starts_with("anon_"));
    }
}
