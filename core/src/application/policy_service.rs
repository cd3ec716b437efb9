// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Policy evaluation orchestration (§4.B): loads a workspace's
//! `AccessPolicy` rows and applies the pure `domain::policy::decide`
//! function, combining per-field GraphQL decisions by "worst wins" (§4.B.6).

use std::sync::Arc;

use crate::domain::policy::{decide, graphql_field_paths, Caller, Decision};
use crate::domain::repository::{AccessPolicyRepository, RepositoryError};
use crate::domain::workspace::WorkspaceId;

pub struct PolicyService {
    policy_repo: Arc<dyn AccessPolicyRepository>,
}

impl PolicyService {
    pub fn new(policy_repo: Arc<dyn AccessPolicyRepository>) -> Self {
        Self { policy_repo }
    }

    /// Evaluates a single, non-GraphQL tool path (§4.B steps 1-5).
    pub async fn decide_for_tool(
        &self,
        workspace_id: WorkspaceId,
        tool_path: &str,
        approval_required_by_default: bool,
        caller: &Caller,
    ) -> Result<Decision, RepositoryError> {
        let policies = self.policy_repo.find_by_workspace(workspace_id).await?;
        Ok(decide(tool_path, approval_required_by_default, caller, &policies))
    }

    /// Splits a GraphQL operation into root field paths, evaluates each, and
    /// combines by taking the worst decision (§4.B.6). Returns the combined
    /// decision plus the comma-joined effective tool path reported downstream.
    pub async fn decide_for_graphql(
        &self,
        workspace_id: WorkspaceId,
        source: &str,
        query: &str,
        approval_required_by_default: bool,
        caller: &Caller,
    ) -> Result<(Decision, String), RepositoryError> {
        let policies = self.policy_repo.find_by_workspace(workspace_id).await?;
        let field_paths = graphql_field_paths(source, query);

        let mut combined = Decision::Allow;
        for path in &field_paths {
            let d = decide(path, approval_required_by_default, caller, &policies);
            combined = combined.worst(d);
        }
        Ok((combined, field_paths.join(",")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::AccessPolicy;
    use crate::infrastructure::repositories::InMemoryAccessPolicyRepository;

    #[tokio::test]
    async fn graphql_decision_is_worst_across_fields() {
        let repo = Arc::new(InMemoryAccessPolicyRepository::new());
        let workspace_id = WorkspaceId::new();
        repo.save(&AccessPolicy {
            workspace_id,
            tool_path_pattern: "github.mutation.*".to_string(),
            actor_id: None,
            client_id: None,
            decision: Decision::Deny,
            priority: 0,
        })
        .await
        .unwrap();

        let service = PolicyService::new(repo);
        let (decision, path) = service
            .decide_for_graphql(
                workspace_id,
                "github",
                "mutation { createIssue(input: {}) { id } }",
                false,
                &Caller::default(),
            )
            .await
            .unwrap();
        assert_eq!(decision, Decision::Deny);
        assert_eq!(path, "github.mutation.createIssue");
    }
}
