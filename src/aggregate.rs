//! Deduplication and ranking of match results
//!
//! One result survives per registry identity (the best-scoring one, first
//! seen on ties), ranked by score with a stable sort so equal scores keep
//! their discovery order.

use std::collections::HashMap;

use crate::model::{AlertTier, MatchResult};

/// Results at or below this score are never surfaced.
pub const SURFACE_THRESHOLD: f64 = 0.4;
pub const HIGH_THRESHOLD: f64 = 0.8;
pub const MEDIUM_THRESHOLD: f64 = 0.6;

/// Keep the best result per identity and rank by score, descending.
pub fn aggregate(results: Vec<MatchResult>) -> Vec<MatchResult> {
    let mut best: Vec<MatchResult> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for result in results {
        match slots.get(&result.identity_id) {
            Some(&slot) => {
                if result.score > best[slot].score {
                    best[slot] = result;
                }
            }
            None => {
                slots.insert(result.identity_id.clone(), best.len());
                best.push(result);
            }
        }
    }

    // Stable: ties stay in first-seen order
    best.sort_by(|a, b| b.score.total_cmp(&a.score));
    best
}

/// Presentation tier for a score, `None` when it is not surfaced.
pub fn tier_for(score: f64) -> Option<AlertTier> {
    if score > HIGH_THRESHOLD {
        Some(AlertTier::High)
    } else if score > MEDIUM_THRESHOLD {
        Some(AlertTier::Medium)
    } else if score > SURFACE_THRESHOLD {
        Some(AlertTier::Low)
    } else {
        None
    }
}

/// Ranked results that clear the surfacing threshold, with their tier.
pub fn surfaced(ranked: &[MatchResult]) -> Vec<(&MatchResult, AlertTier)> {
    ranked
        .iter()
        .filter_map(|result| tier_for(result.score).map(|tier| (result, tier)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entity, RegistryRecord};

    fn result(entity: &str, id: &str, score: f64) -> MatchResult {
        MatchResult::new(
            &Entity::organization(entity),
            &RegistryRecord::new(id, format!("{} LTDA", entity.to_uppercase())),
            score,
        )
    }

    #[test]
    fn test_keeps_best_score_per_identity() {
        let ranked = aggregate(vec![result("Acme", "u1", 0.3), result("Acme Corp", "u1", 0.9)]);

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score, 0.9);
        assert_eq!(ranked[0].entity_text, "Acme Corp");
    }

    #[test]
    fn test_first_seen_wins_ties() {
        let ranked = aggregate(vec![result("Acme", "u1", 0.7), result("Acme SA", "u1", 0.7)]);
        assert_eq!(ranked[0].entity_text, "Acme");
    }

    #[test]
    fn test_ranking_is_descending_and_stable() {
        let ranked = aggregate(vec![
            result("Beta", "u2", 0.5),
            result("Alfa", "u1", 0.9),
            result("Gama", "u3", 0.5),
            result("Delta", "u4", 0.95),
            result("Beta", "u2", 0.45),
        ]);

        let ids: Vec<&str> = ranked.iter().map(|r| r.identity_id.as_str()).collect();
        assert_eq!(ids, vec!["u4", "u1", "u2", "u3"]);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_aggregate_empty() {
        assert!(aggregate(Vec::new()).is_empty());
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(tier_for(0.95), Some(AlertTier::High));
        assert_eq!(tier_for(0.8), Some(AlertTier::Medium));
        assert_eq!(tier_for(0.61), Some(AlertTier::Medium));
        assert_eq!(tier_for(0.6), Some(AlertTier::Low));
        assert_eq!(tier_for(0.41), Some(AlertTier::Low));
        assert_eq!(tier_for(0.4), None);
        assert_eq!(tier_for(0.0), None);
    }

    #[test]
    fn test_surfaced_skips_low_scores() {
        let ranked = aggregate(vec![result("Acme", "u1", 0.9), result("Zeta", "u2", 0.4)]);
        let shown = surfaced(&ranked);

        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].0.identity_id, "u1");
        assert_eq!(shown[0].1, AlertTier::High);
    }
}
