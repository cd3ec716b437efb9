// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Workspace tool inventory build-state and signature computation (§4.E).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::workspace::WorkspaceId;

pub const INVENTORY_VERSION_TAG: &str = "v1";

/// `sig(ws) = H(version_tag, ws, sorted[(sourceId, updatedAt, enabled)])`.
/// Two workspaces with equal `sig` share a compiled snapshot (§4.E, §8.5).
pub fn compute_signature(
    workspace_id: WorkspaceId,
    mut sources: Vec<(Uuid, i64, bool)>,
) -> String {
    sources.sort_by(|a, b| a.0.cmp(&b.0));
    let mut hasher = Sha256::new();
    hasher.update(INVENTORY_VERSION_TAG.as_bytes());
    hasher.update(workspace_id.to_string().as_bytes());
    for (source_id, updated_at, enabled) in sources {
        hasher.update(source_id.as_bytes());
        hasher.update(updated_at.to_le_bytes());
        hasher.update([enabled as u8]);
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildId(pub Uuid);

impl BuildId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BuildId {
    fn default() -> Self {
        Self::new()
    }
}

/// The per-workspace single-flight build coordination row (§4.E, §5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryBuildState {
    pub signature: Option<String>,
    pub ready_build_id: Option<BuildId>,
    pub building_build_id: Option<BuildId>,
    pub last_error: Option<String>,
}

impl InventoryBuildState {
    /// Atomically transitions `building_build_id := buildId` iff it was
    /// empty; otherwise returns the in-flight build id unchanged. This is
    /// the domain-level decision; the caller is responsible for making the
    /// read-then-write atomic against the Store (a single-writer lock per
    /// workspace row, mirroring the rest of this system's mutation model).
    pub fn start_build(&mut self) -> BuildId {
        if let Some(in_flight) = self.building_build_id {
            return in_flight;
        }
        let id = BuildId::new();
        self.building_build_id = Some(id);
        id
    }

    pub fn complete_build(&mut self, build_id: BuildId, signature: String) {
        if self.building_build_id == Some(build_id) {
            self.building_build_id = None;
            self.ready_build_id = Some(build_id);
            self.signature = Some(signature);
            self.last_error = None;
        }
    }

    pub fn fail_build(&mut self, build_id: BuildId, error: String) {
        if self.building_build_id == Some(build_id) {
            self.building_build_id = None;
            self.last_error = Some(error);
        }
    }

    pub fn is_stale(&self, current_signature: &str) -> bool {
        self.signature.as_deref() != Some(current_signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_inputs_produce_equal_signatures() {
        let ws = WorkspaceId::new();
        let sources = vec![(Uuid::new_v4(), 100, true)];
        let a = compute_signature(ws, sources.clone());
        let b = compute_signature(ws, sources);
        assert_eq!(a, b);
    }

    #[test]
    fn order_of_sources_does_not_affect_signature() {
        let ws = WorkspaceId::new();
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        let a = compute_signature(ws, vec![(s1, 1, true), (s2, 2, true)]);
        let b = compute_signature(ws, vec![(s2, 2, true), (s1, 1, true)]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_workspace_changes_signature() {
        let sources = vec![(Uuid::new_v4(), 1, true)];
        let a = compute_signature(WorkspaceId::new(), sources.clone());
        let b = compute_signature(WorkspaceId::new(), sources);
        assert_ne!(a, b);
    }

    #[test]
    fn single_flight_coalesces_concurrent_builds() {
        let mut state = InventoryBuildState::default();
        let first = state.start_build();
        let second = state.start_build();
        assert_eq!(first, second);
    }

    #[test]
    fn complete_build_clears_building_and_sets_ready() {
        let mut state = InventoryBuildState::default();
        let id = state.start_build();
        state.complete_build(id, "sig-1".to_string());
        assert!(state.building_build_id.is_none());
        assert_eq!(state.ready_build_id, Some(id));
        assert!(!state.is_stale("sig-1"));
        assert!(state.is_stale("sig-2"));
    }

    #[test]
    fn new_build_can_start_after_completion() {
        let mut state = InventoryBuildState::default();
        let id1 = state.start_build();
        state.complete_build(id1, "sig-1".to_string());
        let id2 = state.start_build();
        assert_ne!(id1, id2);
    }
}
