//! Core data model types for skillstack.
//!
//! These are the fundamental types the entire skillstack system uses to
//! represent scoring rules, essay feature rows, and score snapshots.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One scoring condition: a predicate over an essay's feature row plus the
/// weight awarded to a skill when it matches and the decay rate applied to
/// that skill on every step.
///
/// Serde field names preserve the vocabulary of the stored rule files
/// (`habilidade`/`regra`/`peso`/`decaimento`) so existing `rules.json`
/// files keep loading unchanged. Skill names are not unique across rules;
/// several rules may feed the same skill and their weights accumulate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Skill this rule contributes to.
    #[serde(rename = "habilidade")]
    pub skill: String,
    /// Serialized predicate expression (see [`crate::predicate`]).
    #[serde(rename = "regra")]
    pub expr: String,
    /// Weight added to the skill when the predicate matches. Must be >= 0.
    #[serde(rename = "peso")]
    pub weight: f64,
    /// Fraction of the skill's current score removed at each step, in
    /// [0, 1]. Absent in older stored files, which means no forgetting.
    #[serde(rename = "decaimento", default)]
    pub decay: f64,
}

impl Rule {
    /// Check the structural invariants: non-empty skill name, finite
    /// non-negative weight, decay within [0, 1].
    ///
    /// Returns every violated constraint, not just the first, so callers
    /// can report the full list.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Vec::new();

        if self.skill.trim().is_empty() {
            violations.push("skill name must not be empty".to_string());
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            violations.push(format!(
                "weight must be a finite number >= 0, got {}",
                self.weight
            ));
        }
        if !self.decay.is_finite() || !(0.0..=1.0).contains(&self.decay) {
            violations.push(format!("decay must be within [0, 1], got {}", self.decay));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations })
        }
    }
}

/// A rule rejected before persistence. Lists every violated constraint.
#[derive(Debug, Clone, Error)]
#[error("invalid rule: {}", violations.join("; "))]
pub struct ValidationError {
    pub violations: Vec<String>,
}

/// A typed scalar field value in an essay's feature row.
///
/// Untagged so that plain JSON numbers and strings map directly; integer
/// values stay integers on round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
}

impl FieldValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Total ordering used to sort sequential-mode records by their
    /// submission ordinal: numbers before strings, numbers numerically,
    /// strings lexicographically (ISO timestamps sort correctly), nulls
    /// first.
    pub fn order_key(&self, other: &FieldValue) -> Ordering {
        fn rank(v: &FieldValue) -> u8 {
            match v {
                FieldValue::Null => 0,
                FieldValue::Int(_) | FieldValue::Float(_) => 1,
                FieldValue::Str(_) => 2,
            }
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            _ => match (self, other) {
                (FieldValue::Str(a), FieldValue::Str(b)) => a.cmp(b),
                (a, b) => rank(a).cmp(&rank(b)),
            },
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, ""),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Str(s) => write!(f, "{s}"),
        }
    }
}

/// One essay's feature row plus its identifying keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Essay identifier (`cod_correcao_redacao` in the source datasets).
    pub id: String,
    /// User identifier grouping records into a sequence. Required in
    /// sequential mode only.
    #[serde(default)]
    pub sequence_key: Option<String>,
    /// Submission ordinal (timestamp or equivalent) ordering records
    /// within a sequence. Required in sequential mode only.
    #[serde(default)]
    pub sequence_order: Option<FieldValue>,
    /// All feature fields consumed by rule predicates.
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Convenience constructor for records scored in independent mode.
    pub fn new(id: impl Into<String>, fields: BTreeMap<String, FieldValue>) -> Self {
        Self {
            id: id.into(),
            sequence_key: None,
            sequence_order: None,
            fields,
        }
    }
}

/// The per-skill scores captured after processing one record.
///
/// In sequential mode the snapshot carries the sequence key of the
/// partition it came from, so downstream projections can keep users
/// apart. Independent-mode snapshots leave it unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub record_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_key: Option<String>,
    pub skills: BTreeMap<String, f64>,
}
