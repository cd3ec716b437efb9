// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Policy Evaluator (§4.B): a pure function from (tool, caller, policy set)
//! to a decision. No I/O, no repository lookups — everything needed is
//! passed in, matching the deny-list-then-capability evaluation style used
//! elsewhere in this codebase's security contexts, generalized to the
//! richer specificity-scored model this system requires.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::workspace::WorkspaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    RequireApproval,
    Deny,
}

impl Decision {
    /// `deny` > `require_approval` > `allow`, used to combine per-field
    /// GraphQL decisions (§4.B.6) by taking the worst outcome.
    pub fn worst(self, other: Decision) -> Decision {
        self.max(other)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub actor_id: Option<String>,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub workspace_id: WorkspaceId,
    pub tool_path_pattern: String,
    pub actor_id: Option<String>,
    pub client_id: Option<String>,
    pub decision: Decision,
    pub priority: i32,
}

impl AccessPolicy {
    fn caller_matches(&self, caller: &Caller) -> bool {
        let actor_ok = match (&self.actor_id, &caller.actor_id) {
            (Some(expected), Some(actual)) => expected == actual,
            (Some(_), None) => false,
            (None, _) => true,
        };
        let client_ok = match (&self.client_id, &caller.client_id) {
            (Some(expected), Some(actual)) => expected == actual,
            (Some(_), None) => false,
            (None, _) => true,
        };
        actor_ok && client_ok
    }

    fn pattern_matches(&self, tool_path: &str) -> bool {
        match glob_to_regex(&self.tool_path_pattern) {
            Some(re) => re.is_match(tool_path),
            None => false,
        }
    }

    /// `(actorId match ? 4 : 0) + (clientId match ? 2 : 0) + max(1, pattern
    /// length minus wildcards) + priority` (§4.B.4).
    fn specificity(&self, caller: &Caller) -> i64 {
        let mut score: i64 = 0;
        if self.actor_id.is_some() && self.actor_id == caller.actor_id {
            score += 4;
        }
        if self.client_id.is_some() && self.client_id == caller.client_id {
            score += 2;
        }
        let wildcards = self.tool_path_pattern.matches('*').count() as i64;
        let len = self.tool_path_pattern.len() as i64;
        score += (len - wildcards).max(1);
        score += self.priority as i64;
        score
    }
}

/// Escapes regex metacharacters then replaces `*` with `.*`, anchored for a
/// full-string match (§4.B.3).
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut out = String::from("^");
    for part in pattern.split('*') {
        out.push_str(&regex::escape(part));
        out.push_str(".*");
    }
    // trailing split leaves one extra ".*"; strip it back off.
    out.truncate(out.len() - 2);
    out.push('$');
    Regex::new(&out).ok()
}

/// Whether the tool declares that the default (no matching policy) outcome
/// is `require_approval` rather than `allow` (§4.B.5).
pub fn decide(
    tool_path: &str,
    approval_required_by_default: bool,
    caller: &Caller,
    policies: &[AccessPolicy],
) -> Decision {
    if tool_path == "discover" {
        return Decision::Allow;
    }

    let mut candidates: Vec<&AccessPolicy> = policies
        .iter()
        .filter(|p| p.caller_matches(caller) && p.pattern_matches(tool_path))
        .collect();

    if candidates.is_empty() {
        return if approval_required_by_default {
            Decision::RequireApproval
        } else {
            Decision::Allow
        };
    }

    candidates.sort_by(|a, b| {
        let sa = a.specificity(caller);
        let sb = b.specificity(caller);
        sb.cmp(&sa).then(b.priority.cmp(&a.priority))
    });

    candidates[0].decision
}

/// Splits a GraphQL operation body into `<source>.query.<field>` /
/// `<source>.mutation.<field>` tool paths (§4.B.6). This is a lightweight
/// scan for top-level selection names, not a full GraphQL parser: it is
/// sufficient to enumerate the root fields a query/mutation touches for
/// policy purposes.
pub fn graphql_field_paths(source: &str, query: &str) -> Vec<String> {
    let operation = if query.trim_start().starts_with("mutation") {
        "mutation"
    } else {
        "query"
    };

    let body_start = query.find('{');
    let body = match body_start {
        Some(idx) => &query[idx + 1..],
        None => return Vec::new(),
    };

    let mut fields = Vec::new();
    let mut depth: i32 = 0;
    let mut at_root_field_start = true;
    let mut current = String::new();
    for ch in body.chars() {
        match ch {
            '{' => {
                depth += 1;
                if depth == 1 && !current.trim().is_empty() {
                    let name = current.trim().split(['(', ':']).next().unwrap_or("").trim();
                    if !name.is_empty() {
                        fields.push(format!("{source}.{operation}.{name}"));
                    }
                }
                current.clear();
                at_root_field_start = false;
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    at_root_field_start = true;
                }
                current.clear();
            }
            c if depth == 0 => {
                if c.is_whitespace() && !at_root_field_start {
                    if !current.trim().is_empty() {
                        let name = current.trim();
                        fields.push(format!("{source}.{operation}.{name}"));
                    }
                    current.clear();
                } else if !c.is_whitespace() {
                    current.push(c);
                }
            }
            _ => {}
        }
    }
    if depth == 0 && !current.trim().is_empty() {
        fields.push(format!("{source}.{operation}.{}", current.trim()));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(pattern: &str, decision: Decision, priority: i32) -> AccessPolicy {
        AccessPolicy {
            workspace_id: WorkspaceId::new(),
            tool_path_pattern: pattern.to_string(),
            actor_id: None,
            client_id: None,
            decision,
            priority,
        }
    }

    #[test]
    fn discover_is_always_allowed() {
        let d = decide("discover", true, &Caller::default(), &[]);
        assert_eq!(d, Decision::Allow);
    }

    #[test]
    fn no_matching_policy_falls_back_to_default() {
        let d = decide("fs.read", true, &Caller::default(), &[]);
        assert_eq!(d, Decision::RequireApproval);
        let d2 = decide("fs.read", false, &Caller::default(), &[]);
        assert_eq!(d2, Decision::Allow);
    }

    #[test]
    fn glob_wildcard_matches_segment() {
        let policies = vec![policy("admin.*", Decision::RequireApproval, 0)];
        let d = decide("admin.send_announcement", false, &Caller::default(), &policies);
        assert_eq!(d, Decision::RequireApproval);
    }

    #[test]
    fn more_specific_actor_policy_wins_over_wildcard() {
        let mut specific = policy("admin.send_announcement", Decision::Allow, 0);
        specific.actor_id = Some("actor-1".to_string());
        let wildcard = policy("admin.*", Decision::Deny, 0);
        let caller = Caller {
            actor_id: Some("actor-1".to_string()),
            client_id: None,
        };
        let d = decide(
            "admin.send_announcement",
            false,
            &caller,
            &[wildcard, specific],
        );
        assert_eq!(d, Decision::Allow);
    }

    #[test]
    fn actor_mismatch_excludes_policy() {
        let mut specific = policy("admin.*", Decision::Allow, 100);
        specific.actor_id = Some("someone-else".to_string());
        let caller = Caller {
            actor_id: Some("actor-1".to_string()),
            client_id: None,
        };
        let d = decide("admin.foo", true, &caller, &[specific]);
        assert_eq!(d, Decision::RequireApproval);
    }

    #[test]
    fn worst_decision_combinator() {
        assert_eq!(Decision::Allow.worst(Decision::Deny), Decision::Deny);
        assert_eq!(
            Decision::RequireApproval.worst(Decision::Allow),
            Decision::RequireApproval
        );
    }

    #[test]
    fn graphql_field_paths_extracts_root_fields() {
        let paths = graphql_field_paths("github", "query { viewer { login } repository(name:\"x\") { id } }");
        assert_eq!(paths, vec!["github.query.viewer", "github.query.repository"]);
    }

    #[test]
    fn graphql_field_paths_detects_mutation() {
        let paths = graphql_field_paths("github", "mutation { createIssue(input: {}) { id } }");
        assert_eq!(paths, vec!["github.mutation.createIssue"]);
    }
}
