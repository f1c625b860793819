//! Entity-to-registry fuzzy matching
//!
//! Scores how well an entity mention matches a registry display name by
//! combining four independent signals:
//! - Token overlap between the two names
//! - Substring containment / longest shared substring
//! - Exact or whole-word match indicator
//! - A prior that depends on the entity type
//!
//! All comparisons run on lowercased text and lengths are counted in chars.

use std::collections::HashSet;
use tracing::debug;

use crate::model::{Entity, EntityType, MatchResult, RegistryRecord};

pub const TOKEN_WEIGHT: f64 = 0.3;
pub const SUBSTRING_WEIGHT: f64 = 0.3;
pub const EXACT_WEIGHT: f64 = 0.4;
pub const TYPE_PRIOR_WEIGHT: f64 = 0.2;

/// Shortest window considered when searching for a shared substring.
const MIN_SHARED_SUBSTRING: usize = 3;

/// Individual components of a match score, before weighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub token_similarity: f64,
    pub substring_similarity: f64,
    pub exact_match: f64,
    pub type_prior: f64,
    /// Weighted sum clamped to 1.0
    pub score: f64,
}

/// Deterministic scorer for (entity, candidate) pairs.
#[derive(Debug, Clone, Default)]
pub struct FuzzyMatcher;

impl FuzzyMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Score one entity against one candidate name. Always within [0, 1].
    pub fn score(&self, entity: &Entity, candidate_name: &str) -> f64 {
        self.breakdown(entity, candidate_name).score
    }

    /// Score with every component exposed.
    pub fn breakdown(&self, entity: &Entity, candidate_name: &str) -> ScoreBreakdown {
        let a = entity.text.to_lowercase();
        let b = candidate_name.to_lowercase();

        let token_similarity = token_similarity(&a, &b);
        let substring_similarity = substring_similarity(&a, &b);
        let exact_match = exact_match_indicator(&a, &b);
        let type_prior = type_prior(entity.entity_type);

        let raw = token_similarity * TOKEN_WEIGHT
            + substring_similarity * SUBSTRING_WEIGHT
            + exact_match * EXACT_WEIGHT
            + type_prior * TYPE_PRIOR_WEIGHT;

        ScoreBreakdown {
            token_similarity,
            substring_similarity,
            exact_match,
            type_prior,
            score: raw.min(1.0),
        }
    }

    /// Score an entity against every candidate returned by the registry.
    pub fn score_candidates(&self, entity: &Entity, candidates: &[RegistryRecord]) -> Vec<MatchResult> {
        candidates
            .iter()
            .map(|record| {
                let parts = self.breakdown(entity, &record.display_name);
                debug!(
                    "Scored '{}' vs '{}': token={:.3} substring={:.3} exact={:.1} prior={:.1} => {:.3}",
                    entity.text,
                    record.display_name,
                    parts.token_similarity,
                    parts.substring_similarity,
                    parts.exact_match,
                    parts.type_prior,
                    parts.score
                );
                MatchResult::new(entity, record, parts.score)
            })
            .collect()
    }
}

/// Jaccard-style overlap of whitespace token sets: |A∩B| / max(|A|, |B|).
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let tokens_a: HashSet<&str> = a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let shared = tokens_a.intersection(&tokens_b).count();
    shared as f64 / tokens_a.len().max(tokens_b.len()) as f64
}

/// Containment-based similarity rooted at the length of `a`.
///
/// Expects lowercased inputs. The empty string is contained in every string,
/// so a single empty side scores 0.7; two empty sides score 0.0.
pub fn substring_similarity(a: &str, b: &str) -> f64 {
    let len_a = a.chars().count();
    let len_b = b.chars().count();

    if len_a == 0 && len_b == 0 {
        return 0.0;
    }

    if b.contains(a) {
        return 0.7 + (len_a as f64 / len_b as f64) * 0.3;
    }
    if a.contains(b) {
        return 0.7 + (len_b as f64 / len_a as f64) * 0.3;
    }

    let shared = longest_shared_substring(a, b);
    if shared > MIN_SHARED_SUBSTRING {
        0.4 + (shared as f64 / len_a as f64) * 0.3
    } else {
        0.0
    }
}

/// Length in chars of the longest window of `a` (at least 3 chars) found in `b`.
fn longest_shared_substring(a: &str, b: &str) -> usize {
    // Byte offset of every char boundary, including the end of the string
    let bounds: Vec<usize> = a
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(a.len()))
        .collect();
    let char_len = bounds.len() - 1;
    let mut best = 0;

    for start in 0..char_len {
        // A window that is not in `b` cannot grow into one that is
        let mut end = start + MIN_SHARED_SUBSTRING;
        while end <= char_len && b.contains(&a[bounds[start]..bounds[end]]) {
            best = best.max(end - start);
            end += 1;
        }
    }

    best
}

/// 1.0 for equal names, 0.8 when `a` appears in `b` between word boundaries.
///
/// Expects lowercased inputs.
pub fn exact_match_indicator(a: &str, b: &str) -> f64 {
    if a == b {
        1.0
    } else if contains_whole_word(b, a) {
        0.8
    } else {
        0.0
    }
}

/// Whether `needle` occurs in `haystack` with a word boundary on both sides.
fn contains_whole_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }

    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let start = from + offset;
        let end = start + needle.len();

        let before = haystack[..start].chars().next_back();
        let first = needle.chars().next();
        let last = needle.chars().next_back();
        let after = haystack[end..].chars().next();

        if is_boundary(before, first) && is_boundary(last, after) {
            return true;
        }

        // Retry from the next char so overlapping occurrences are considered
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }

    false
}

fn is_boundary(left: Option<char>, right: Option<char>) -> bool {
    left.map_or(false, is_word_char) != right.map_or(false, is_word_char)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Fixed prior by entity classification.
pub fn type_prior(entity_type: EntityType) -> f64 {
    match entity_type {
        EntityType::Person => 0.5,
        EntityType::Organization => 0.6,
        EntityType::Other => 0.3,
    }
}
