//! Output projections over collected score snapshots.
//!
//! Pure transforms: nothing here re-evaluates rules or touches an
//! accumulator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Record, ScoreSnapshot};

/// One original record joined with its score snapshot, the table
/// projection's row. The snapshot lands under the stored-file column name
/// `pilha`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    #[serde(flatten)]
    pub record: Record,
    #[serde(rename = "pilha")]
    pub skills: BTreeMap<String, f64>,
}

/// Join snapshots back onto the original records, in record order.
/// Records without a snapshot (none should exist in practice) get an
/// empty skill mapping.
pub fn table(records: &[Record], snapshots: &[ScoreSnapshot]) -> Vec<TableRow> {
    let by_id: BTreeMap<&str, &BTreeMap<String, f64>> = snapshots
        .iter()
        .map(|s| (s.record_id.as_str(), &s.skills))
        .collect();

    records
        .iter()
        .map(|record| TableRow {
            record: record.clone(),
            skills: by_id
                .get(record.id.as_str())
                .map(|skills| (*skills).clone())
                .unwrap_or_default(),
        })
        .collect()
}

/// Arithmetic mean of each skill's score across all snapshots, at full
/// precision. A snapshot lacking a skill counts as 0 for that skill.
pub fn population_mean(snapshots: &[ScoreSnapshot]) -> BTreeMap<String, f64> {
    if snapshots.is_empty() {
        return BTreeMap::new();
    }

    let mut sums: BTreeMap<String, f64> = BTreeMap::new();
    for snapshot in snapshots {
        for (skill, score) in &snapshot.skills {
            *sums.entry(skill.clone()).or_insert(0.0) += score;
        }
    }

    let n = snapshots.len() as f64;
    sums.into_iter().map(|(skill, sum)| (skill, sum / n)).collect()
}

/// Display helper: drop skills whose mean is not positive.
pub fn positive_means(means: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    means
        .iter()
        .filter(|(_, mean)| **mean > 0.0)
        .map(|(skill, mean)| (skill.clone(), *mean))
        .collect()
}

/// One point of the animation trace: a skill's score after the
/// `iteration`-th processed record (1-based) of one sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_key: Option<String>,
    pub iteration: usize,
    pub skill: String,
    pub score: f64,
}

/// Flatten snapshots into `(sequence_key, iteration, skill, score)`
/// points for every skill with a positive score. Snapshots from the same
/// sequence key arrive contiguously in processing order; the iteration
/// index restarts at 1 whenever the key changes, so each user's trace
/// animates on its own timeline.
pub fn trace(snapshots: &[ScoreSnapshot]) -> Vec<TracePoint> {
    let mut points = Vec::new();
    let mut current_key: Option<Option<&str>> = None;
    let mut iteration = 0;
    for snapshot in snapshots {
        let key = snapshot.sequence_key.as_deref();
        if current_key != Some(key) {
            current_key = Some(key);
            iteration = 0;
        }
        iteration += 1;
        for (skill, score) in &snapshot.skills {
            if *score > 0.0 {
                points.push(TracePoint {
                    sequence_key: snapshot.sequence_key.clone(),
                    iteration,
                    skill: skill.clone(),
                    score: *score,
                });
            }
        }
    }
    points
}

/// How often each skill ranks first across the snapshots. Ties within a
/// snapshot break alphabetically ascending, matching
/// [`crate::stack::SkillStack::top_n`]. Empty snapshots are skipped.
pub fn top_skill_counts(snapshots: &[ScoreSnapshot]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for snapshot in snapshots {
        let top = snapshot
            .skills
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(a.0)));
        if let Some((skill, _)) = top {
            *counts.entry(skill.clone()).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldValue;

    fn snapshot(record_id: &str, pairs: &[(&str, f64)]) -> ScoreSnapshot {
        ScoreSnapshot {
            record_id: record_id.into(),
            sequence_key: None,
            skills: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    fn keyed_snapshot(record_id: &str, key: &str, pairs: &[(&str, f64)]) -> ScoreSnapshot {
        let mut s = snapshot(record_id, pairs);
        s.sequence_key = Some(key.to_string());
        s
    }

    #[test]
    fn population_mean_treats_missing_as_zero() {
        let snapshots = vec![snapshot("1", &[("x", 10.0)]), snapshot("2", &[])];
        let means = population_mean(&snapshots);
        assert_eq!(means["x"], 5.0);
    }

    #[test]
    fn population_mean_of_empty_input_is_empty() {
        assert!(population_mean(&[]).is_empty());
    }

    #[test]
    fn positive_means_filters_non_positive() {
        let snapshots = vec![
            snapshot("1", &[("x", 4.0), ("y", 0.0), ("z", 2.0)]),
            snapshot("2", &[("x", 2.0), ("z", -2.0)]),
        ];
        let means = population_mean(&snapshots);
        let shown = positive_means(&means);
        assert_eq!(shown.len(), 1);
        assert_eq!(shown["x"], 3.0);
        // Full-precision means stay computable regardless of display filter.
        assert_eq!(means["z"], 0.0);
        assert_eq!(means["y"], 0.0);
    }

    #[test]
    fn trace_is_one_based_and_positive_only() {
        let snapshots = vec![
            snapshot("1", &[("x", 10.0), ("y", 0.0)]),
            snapshot("2", &[("x", 5.0), ("z", 1.0)]),
        ];
        let points = trace(&snapshots);
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].iteration, 1);
        assert_eq!(points[0].skill, "x");
        assert_eq!(points[1].iteration, 2);
        assert_eq!(points[2].skill, "z");
    }

    #[test]
    fn trace_restarts_iteration_per_sequence_key() {
        let snapshots = vec![
            keyed_snapshot("1", "u1", &[("x", 10.0)]),
            keyed_snapshot("2", "u1", &[("x", 5.0)]),
            keyed_snapshot("3", "u2", &[("y", 3.0)]),
        ];
        let points = trace(&snapshots);
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].sequence_key.as_deref(), Some("u1"));
        assert_eq!(points[0].iteration, 1);
        assert_eq!(points[1].iteration, 2);
        // u2's trace starts over at 1 rather than continuing u1's count.
        assert_eq!(points[2].sequence_key.as_deref(), Some("u2"));
        assert_eq!(points[2].iteration, 1);
        assert_eq!(points[2].skill, "y");
    }

    #[test]
    fn top_skill_counts_with_alphabetical_tie_break() {
        let snapshots = vec![
            snapshot("1", &[("bravo", 5.0), ("alpha", 5.0)]),
            snapshot("2", &[("bravo", 9.0), ("alpha", 1.0)]),
            snapshot("3", &[]),
        ];
        let counts = top_skill_counts(&snapshots);
        assert_eq!(counts["alpha"], 1);
        assert_eq!(counts["bravo"], 1);
    }

    #[test]
    fn table_joins_in_record_order() {
        let records = vec![
            Record::new("1", BTreeMap::from([("f".to_string(), FieldValue::Int(1))])),
            Record::new("2", BTreeMap::new()),
        ];
        let snapshots = vec![snapshot("2", &[("x", 1.0)]), snapshot("1", &[("x", 2.0)])];
        let rows = table(&records, &snapshots);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].record.id, "1");
        assert_eq!(rows[0].skills["x"], 2.0);
        assert_eq!(rows[1].skills["x"], 1.0);
    }

    #[test]
    fn table_row_serializes_snapshot_under_pilha() {
        let records = vec![Record::new("1", BTreeMap::new())];
        let rows = table(&records, &[snapshot("1", &[("x", 1.5)])]);
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["pilha"]["x"], 1.5);
        assert_eq!(json["id"], "1");
    }
}
