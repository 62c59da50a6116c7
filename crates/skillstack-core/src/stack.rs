//! The per-context skill accumulator ("stack").
//!
//! One `SkillStack` holds the skill scores for exactly one scoring
//! context: a single essay in independent mode, or one user's running
//! history in sequential mode. It is never shared across contexts.

use std::collections::BTreeMap;

use crate::model::ScoreSnapshot;

/// Mutable mapping of skill name to current score, updated with a
/// decay-then-add step per processed record.
///
/// Alongside the scores, the stack remembers the most recently supplied
/// decay rate per skill. When a held skill receives no rate on a later
/// step (its rule is no longer in the active set), the last-known rate
/// applies; a skill that never had one decays at 0.
#[derive(Debug, Clone, Default)]
pub struct SkillStack {
    scores: BTreeMap<String, f64>,
    decay_rates: BTreeMap<String, f64>,
}

impl SkillStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// One accumulation step.
    ///
    /// Decay strictly precedes addition: every held skill is first
    /// multiplied by `(1 - rate)`, then the step's weights are added,
    /// creating new skills at 0. Stored scores are rounded to 2 decimal
    /// digits after the step so float noise cannot accumulate. A skill
    /// at score `S` with decay `d` and a matching weight `W` ends the
    /// step at exactly `round(S * (1 - d) + W, 2)`.
    pub fn update(&mut self, weights: &BTreeMap<String, f64>, decays: &BTreeMap<String, f64>) {
        for (skill, rate) in decays {
            self.decay_rates.insert(skill.clone(), *rate);
        }

        for (skill, score) in self.scores.iter_mut() {
            let rate = self.decay_rates.get(skill).copied().unwrap_or(0.0);
            *score *= 1.0 - rate;
        }

        for (skill, weight) in weights {
            *self.scores.entry(skill.clone()).or_insert(0.0) += weight;
        }

        for score in self.scores.values_mut() {
            *score = round2(*score);
        }
    }

    /// The `n` skills with the highest current score, descending.
    /// Equal scores break alphabetically ascending on the skill name, so
    /// re-querying without an intervening update is stable.
    pub fn top_n(&self, n: usize) -> Vec<String> {
        let mut ranked: Vec<(&String, f64)> =
            self.scores.iter().map(|(k, v)| (k, *v)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.into_iter().take(n).map(|(k, _)| k.clone()).collect()
    }

    pub fn scores(&self) -> &BTreeMap<String, f64> {
        &self.scores
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Capture the current state as the snapshot for one record.
    pub fn snapshot(&self, record_id: &str) -> ScoreSnapshot {
        ScoreSnapshot {
            record_id: record_id.to_string(),
            sequence_key: None,
            skills: self.scores.clone(),
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn starts_empty() {
        let stack = SkillStack::new();
        assert!(stack.is_empty());
        assert!(stack.top_n(5).is_empty());
    }

    #[test]
    fn decay_applied_before_addition() {
        let mut stack = SkillStack::new();
        stack.update(&map(&[("x", 10.0)]), &map(&[("x", 0.5)]));
        assert_eq!(stack.scores()["x"], 10.0);

        // Second step: 10 * (1 - 0.5) + 10 = 15, not (10 + 10) * 0.5 = 10.
        stack.update(&map(&[("x", 10.0)]), &map(&[("x", 0.5)]));
        assert_eq!(stack.scores()["x"], 15.0);
    }

    #[test]
    fn decay_without_matching_weight() {
        let mut stack = SkillStack::new();
        stack.update(&map(&[("x", 10.0)]), &map(&[("x", 0.5)]));
        stack.update(&BTreeMap::new(), &map(&[("x", 0.5)]));
        assert_eq!(stack.scores()["x"], 5.0);
    }

    #[test]
    fn last_known_decay_rate_applies_when_rate_absent() {
        let mut stack = SkillStack::new();
        stack.update(&map(&[("x", 10.0)]), &map(&[("x", 0.5)]));
        // The rule for x is gone from this step's set; its last rate holds.
        stack.update(&map(&[("y", 1.0)]), &map(&[("y", 0.0)]));
        assert_eq!(stack.scores()["x"], 5.0);
        assert_eq!(stack.scores()["y"], 1.0);
    }

    #[test]
    fn skill_never_given_a_rate_does_not_decay() {
        let mut stack = SkillStack::new();
        stack.update(&map(&[("x", 10.0)]), &BTreeMap::new());
        stack.update(&BTreeMap::new(), &BTreeMap::new());
        assert_eq!(stack.scores()["x"], 10.0);
    }

    #[test]
    fn full_decay_resets_score() {
        let mut stack = SkillStack::new();
        stack.update(&map(&[("x", 8.0)]), &map(&[("x", 1.0)]));
        stack.update(&BTreeMap::new(), &map(&[("x", 1.0)]));
        assert_eq!(stack.scores()["x"], 0.0);
    }

    #[test]
    fn scores_round_to_two_decimals() {
        let mut stack = SkillStack::new();
        stack.update(&map(&[("x", 10.0)]), &map(&[("x", 0.333)]));
        stack.update(&map(&[("x", 0.0)]), &map(&[("x", 0.333)]));
        // 10 * 0.667 = 6.67 exactly at 2 digits
        assert_eq!(stack.scores()["x"], 6.67);
    }

    #[test]
    fn top_n_orders_by_score_then_name() {
        let mut stack = SkillStack::new();
        stack.update(
            &map(&[("bravo", 5.0), ("alpha", 5.0), ("charlie", 9.0), ("delta", 1.0)]),
            &BTreeMap::new(),
        );
        assert_eq!(stack.top_n(3), vec!["charlie", "alpha", "bravo"]);
        // Stable under re-query.
        assert_eq!(stack.top_n(3), vec!["charlie", "alpha", "bravo"]);
    }

    #[test]
    fn top_n_returns_at_most_n() {
        let mut stack = SkillStack::new();
        stack.update(&map(&[("a", 1.0), ("b", 2.0)]), &BTreeMap::new());
        assert_eq!(stack.top_n(10).len(), 2);
        assert_eq!(stack.top_n(1), vec!["b"]);
        assert!(stack.top_n(0).is_empty());
    }

    #[test]
    fn snapshot_captures_current_state() {
        let mut stack = SkillStack::new();
        stack.update(&map(&[("x", 3.0)]), &BTreeMap::new());
        let snap = stack.snapshot("42");
        assert_eq!(snap.record_id, "42");
        assert_eq!(snap.skills["x"], 3.0);
    }
}
