// Copyright (c) 2026 Taskgate Systems
// SPDX-License-Identifier: AGPL-3.0

//! Did-you-mean tool path suggestions (§4.G step 2, §9 open question).
//!
//! The naive approach scores every known tool path against the miss on
//! every lookup; with catalogs in the hundreds of OpenAPI-derived tools
//! that is the hot path the spec calls out. We keep the scoring rule
//! (Levenshtein + namespace/substring/prefix bonuses) but precompute a
//! trigram inverted index per workspace signature so a miss only scores
//! candidates that share at least one trigram with the query, not the
//! whole catalog.

use std::collections::{HashMap, HashSet};

/// Trigram inverted index over a set of tool paths, built once per
/// compiled inventory snapshot and reused across every lookup miss until
/// the snapshot is rebuilt.
#[derive(Debug, Clone, Default)]
pub struct SuggestionIndex {
    paths: Vec<String>,
    trigrams: HashMap<String, Vec<usize>>,
}

impl SuggestionIndex {
    pub fn build<I: IntoIterator<Item = S>, S: Into<String>>(paths: I) -> Self {
        let paths: Vec<String> = paths.into_iter().map(Into::into).collect();
        let mut trigrams: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, path) in paths.iter().enumerate() {
            for gram in trigrams_of(&path.to_lowercase()) {
                trigrams.entry(gram).or_default().push(idx);
            }
        }
        Self { paths, trigrams }
    }

    /// Top `limit` did-you-mean suggestions for an unknown `query` path,
    /// ranked by the §4.G.2 scoring rule. Falls back to scanning the full
    /// catalog only when the query shares no trigram with anything (e.g. a
    /// one- or two-character query), which is rare and cheap at that size.
    pub fn suggest(&self, query: &str, limit: usize) -> Vec<String> {
        let query_lower = query.to_lowercase();
        let mut candidate_idxs: HashSet<usize> = HashSet::new();
        for gram in trigrams_of(&query_lower) {
            if let Some(idxs) = self.trigrams.get(&gram) {
                candidate_idxs.extend(idxs.iter().copied());
            }
        }
        if candidate_idxs.is_empty() {
            candidate_idxs.extend(0..self.paths.len());
        }

        let mut scored: Vec<(i64, &str)> = candidate_idxs
            .into_iter()
            .map(|idx| self.paths[idx].as_str())
            .map(|path| (score(&query_lower, path), path))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(b.1)));
        scored.into_iter().take(limit).map(|(_, p)| p.to_string()).collect()
    }
}

fn trigrams_of(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < 3 {
        return vec![s.to_string()];
    }
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

/// Levenshtein edit distance, iterative two-row DP.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// §4.G.2 scoring: higher is a better suggestion. Distance dominates (as a
/// negative term) with bonuses layered on top for namespace match,
/// substring containment, and shared dot-separated prefix segments.
fn score(query: &str, candidate: &str) -> i64 {
    let candidate_lower = candidate.to_lowercase();
    let distance = levenshtein(query, &candidate_lower) as i64;
    let mut s = -distance;

    let query_ns = query.split('.').next().unwrap_or("");
    let candidate_ns = candidate_lower.split('.').next().unwrap_or("");
    if !query_ns.is_empty() && query_ns == candidate_ns {
        s += 6;
    }

    if candidate_lower.contains(query) || query.contains(candidate_lower.as_str()) {
        s += 3;
    }

    let query_segments: Vec<&str> = query.split('.').collect();
    let candidate_segments: Vec<&str> = candidate_lower.split('.').collect();
    let shared_prefix_segments = query_segments
        .iter()
        .zip(candidate_segments.iter())
        .take_while(|(a, b)| a == b)
        .count();
    s += 2 * shared_prefix_segments as i64;

    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_identical_strings_is_zero() {
        assert_eq!(levenshtein("fs.read", "fs.read"), 0);
    }

    #[test]
    fn levenshtein_counts_single_substitution() {
        assert_eq!(levenshtein("fs.read", "fs.read"), 0);
        assert_eq!(levenshtein("fs.read", "fs.reae"), 1);
    }

    #[test]
    fn namespace_match_outranks_closer_edit_distance_in_other_namespace() {
        let index = SuggestionIndex::build(vec!["fs.read_file", "db.readx"]);
        let suggestions = index.suggest("fs.read", 2);
        assert_eq!(suggestions[0], "fs.read_file");
    }

    #[test]
    fn suggest_returns_closest_match_first() {
        let index = SuggestionIndex::build(vec!["admin.send_announcement", "admin.send_message", "fs.write"]);
        let suggestions = index.suggest("admin.send_anouncement", 3);
        assert_eq!(suggestions[0], "admin.send_announcement");
    }

    #[test]
    fn large_catalog_lookup_stays_fast() {
        let paths: Vec<String> = (0..2000).map(|i| format!("source{i}.op_{i}")).collect();
        let index = SuggestionIndex::build(paths);
        let start = std::time::Instant::now();
        let suggestions = index.suggest("source999.op_9999", 5);
        assert!(!suggestions.is_empty());
        assert!(start.elapsed().as_millis() < 50, "suggestion lookup must stay under the 50ms budget");
    }
}
