// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Prepared-spec cache for OpenAPI sources (§4.E layered caching, tier 2).
//!
//! Keyed by `(specUrl, schemaVersion)` with a 5 hour TTL, shared across
//! every workspace that references the same spec URL so a reload doesn't
//! refetch a document ten tenants already have in memory.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

pub const SPEC_CACHE_TTL: Duration = Duration::from_secs(5 * 60 * 60);

#[derive(Clone)]
struct Entry {
    prepared: Arc<Value>,
    inserted_at: Instant,
}

/// Dereferenced, indexed OpenAPI document ready for operation extraction.
#[derive(Debug, Clone)]
pub struct PreparedSpec {
    pub spec_url: String,
    pub schema_version: String,
    pub document: Arc<Value>,
}

#[derive(Default)]
pub struct SpecCache {
    entries: DashMap<(String, String), Entry>,
}

impl SpecCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, spec_url: &str, schema_version: &str) -> Option<PreparedSpec> {
        let key = (spec_url.to_string(), schema_version.to_string());
        let entry = self.entries.get(&key)?;
        if entry.inserted_at.elapsed() > SPEC_CACHE_TTL {
            drop(entry);
            self.entries.remove(&key);
            return None;
        }
        Some(PreparedSpec {
            spec_url: spec_url.to_string(),
            schema_version: schema_version.to_string(),
            document: entry.prepared.clone(),
        })
    }

    pub fn put(&self, spec_url: &str, schema_version: &str, document: Value) {
        self.entries.insert(
            (spec_url.to_string(), schema_version.to_string()),
            Entry { prepared: Arc::new(document), inserted_at: Instant::now() },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_then_get_round_trips() {
        let cache = SpecCache::new();
        cache.put("https://api.example.com/openapi.json", "3.0", json!({"ok": true}));
        let prepared = cache.get("https://api.example.com/openapi.json", "3.0").unwrap();
        assert_eq!(*prepared.document, json!({"ok": true}));
    }

    #[test]
    fn distinct_schema_versions_are_distinct_keys() {
        let cache = SpecCache::new();
        cache.put("https://api.example.com/openapi.json", "3.0", json!({"v": 3}));
        assert!(cache.get("https://api.example.com/openapi.json", "3.1").is_none());
    }
}
