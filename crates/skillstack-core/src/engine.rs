//! Rule evaluation engine.
//!
//! Turns a loaded rule list into compiled predicates and, per record,
//! produces the weight delta and decay rates the accumulator needs for one
//! step.

use std::collections::BTreeMap;

use crate::model::{Record, Rule};
use crate::predicate::{self, CompileError, Predicate};

/// A rule whose predicate expression has been compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub skill: String,
    pub predicate: Predicate,
    pub weight: f64,
    pub decay: f64,
}

/// A rule skipped at load time because its expression failed to compile.
#[derive(Debug, Clone)]
pub struct SkippedRule {
    /// Position in the input rule list.
    pub index: usize,
    pub skill: String,
    pub error: CompileError,
}

/// Compile a rule list, skipping (with one warning each) rules whose
/// expression does not parse. One bad rule never blocks the others.
pub fn compile_rules(rules: &[Rule]) -> (Vec<CompiledRule>, Vec<SkippedRule>) {
    let mut compiled = Vec::with_capacity(rules.len());
    let mut skipped = Vec::new();

    for (index, rule) in rules.iter().enumerate() {
        match predicate::compile(&rule.expr) {
            Ok(predicate) => compiled.push(CompiledRule {
                skill: rule.skill.clone(),
                predicate,
                weight: rule.weight,
                decay: rule.decay,
            }),
            Err(error) => {
                tracing::warn!(
                    skill = %rule.skill,
                    rule_index = index,
                    %error,
                    "skipping rule with invalid predicate expression"
                );
                skipped.push(SkippedRule {
                    index,
                    skill: rule.skill.clone(),
                    error,
                });
            }
        }
    }

    (compiled, skipped)
}

/// The outcome of evaluating the active rule set against one record:
/// the matched weight per skill and the decay rate per skill.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub weights: BTreeMap<String, f64>,
    pub decays: BTreeMap<String, f64>,
}

/// Evaluates the active rule set against records.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
}

impl RuleEngine {
    pub fn new(rules: Vec<CompiledRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Evaluate every active rule against one record.
    ///
    /// A matching rule adds its weight into the skill's bucket; rules
    /// sharing a skill name accumulate additively. The decay rate is
    /// recorded for every rule's skill whether or not it matched, because
    /// the accumulator needs a rate for skills it already holds even when
    /// nothing fired for them this step. When same-name rules disagree on
    /// the rate, the later rule wins (last-write-wins); keeping rates
    /// consistent across same-name rules is the rule author's job.
    pub fn evaluate(&self, record: &Record) -> StepOutcome {
        let mut outcome = StepOutcome::default();

        for rule in &self.rules {
            if rule.predicate.evaluate(&record.fields) {
                *outcome.weights.entry(rule.skill.clone()).or_insert(0.0) += rule.weight;
            }
            outcome.decays.insert(rule.skill.clone(), rule.decay);
        }

        outcome
    }
}
