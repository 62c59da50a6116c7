//! Simulation pipeline: drives the rule engine and accumulators over a
//! dataset and assembles the requested output projection.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::RuleEngine;
use crate::model::{Record, ScoreSnapshot};
use crate::projection::{self, TableRow, TracePoint};
use crate::stack::SkillStack;

/// Scoring mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Each record is scored from a fresh, empty accumulator. Records are
    /// mutually independent and their processing order does not affect
    /// results.
    Independent,
    /// Records are partitioned by user and processed in submission order,
    /// one accumulator per user carried forward across their records.
    Sequential,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Independent => write!(f, "independent"),
            Mode::Sequential => write!(f, "sequential"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "independent" => Ok(Mode::Independent),
            "sequential" => Ok(Mode::Sequential),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Which projection the pipeline returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    /// The snapshot sequence unchanged.
    Raw,
    /// Snapshots joined back onto the original records.
    Table,
    /// Per-skill arithmetic mean across all snapshots.
    Mean,
    /// Flat `(iteration, skill, score)` points for animation. Sequential
    /// mode only.
    Trace,
    /// How often each skill ranked first across snapshots.
    TopSkills,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::Raw => write!(f, "raw"),
            OutputKind::Table => write!(f, "table"),
            OutputKind::Mean => write!(f, "mean"),
            OutputKind::Trace => write!(f, "trace"),
            OutputKind::TopSkills => write!(f, "top-skills"),
        }
    }
}

impl FromStr for OutputKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raw" | "stacks" => Ok(OutputKind::Raw),
            "table" => Ok(OutputKind::Table),
            "mean" => Ok(OutputKind::Mean),
            "trace" => Ok(OutputKind::Trace),
            "top-skills" => Ok(OutputKind::TopSkills),
            other => Err(format!("unknown output kind: {other}")),
        }
    }
}

/// Configuration for one simulation run.
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub mode: Mode,
    pub output: OutputKind,
    /// Explicit subset of record ids to process; `None` processes all.
    pub ids: Option<Vec<String>>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Independent,
            output: OutputKind::Raw,
            ids: None,
        }
    }
}

/// The projection returned by a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SimulationOutput {
    Raw(Vec<ScoreSnapshot>),
    Table(Vec<TableRow>),
    Mean(BTreeMap<String, f64>),
    Trace(Vec<TracePoint>),
    TopSkills(BTreeMap<String, usize>),
}

/// Failures detected before any scoring work begins.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("record '{record_id}' has no sequence key; sequential mode requires one per record")]
    MissingSequenceKey { record_id: String },

    #[error("record '{record_id}' has no sequence order; sequential mode requires one per record")]
    MissingSequenceOrder { record_id: String },

    #[error("trace output requires sequential mode")]
    TraceRequiresSequential,
}

/// Run one simulation over `records` with the given engine and options.
///
/// Rules are compiled once per run by the caller; the pipeline never
/// reloads them mid-run, so every record sees the same rule set.
pub fn run(
    records: &[Record],
    engine: &RuleEngine,
    options: &SimulationOptions,
) -> Result<SimulationOutput, PipelineError> {
    if options.output == OutputKind::Trace && options.mode == Mode::Independent {
        return Err(PipelineError::TraceRequiresSequential);
    }

    let selected: Vec<Record> = match &options.ids {
        Some(ids) => records
            .iter()
            .filter(|r| ids.iter().any(|id| id == &r.id))
            .cloned()
            .collect(),
        None => records.to_vec(),
    };

    let snapshots = match options.mode {
        Mode::Independent => run_independent(&selected, engine),
        Mode::Sequential => run_sequential(&selected, engine)?,
    };

    Ok(match options.output {
        OutputKind::Raw => SimulationOutput::Raw(snapshots),
        OutputKind::Table => SimulationOutput::Table(projection::table(&selected, &snapshots)),
        OutputKind::Mean => SimulationOutput::Mean(projection::population_mean(&snapshots)),
        OutputKind::Trace => SimulationOutput::Trace(projection::trace(&snapshots)),
        OutputKind::TopSkills => {
            SimulationOutput::TopSkills(projection::top_skill_counts(&snapshots))
        }
    })
}

/// Independent mode: a fresh accumulator per record.
fn run_independent(records: &[Record], engine: &RuleEngine) -> Vec<ScoreSnapshot> {
    records
        .iter()
        .map(|record| {
            let mut stack = SkillStack::new();
            let outcome = engine.evaluate(record);
            stack.update(&outcome.weights, &outcome.decays);
            stack.snapshot(&record.id)
        })
        .collect()
}

/// Sequential mode: partition by sequence key, order each partition by
/// sequence order (record id as the deterministic tie-break), carry one
/// accumulator per partition. Partitions never share an accumulator.
fn run_sequential(
    records: &[Record],
    engine: &RuleEngine,
) -> Result<Vec<ScoreSnapshot>, PipelineError> {
    // Validate before any scoring: dataset problems must surface up front.
    for record in records {
        if record.sequence_key.is_none() {
            return Err(PipelineError::MissingSequenceKey {
                record_id: record.id.clone(),
            });
        }
        if record.sequence_order.is_none() {
            return Err(PipelineError::MissingSequenceOrder {
                record_id: record.id.clone(),
            });
        }
    }

    let mut partitions: BTreeMap<&str, Vec<&Record>> = BTreeMap::new();
    for record in records {
        partitions
            .entry(record.sequence_key.as_deref().unwrap_or_default())
            .or_default()
            .push(record);
    }

    let mut snapshots = Vec::with_capacity(records.len());
    for (key, mut partition) in partitions {
        partition.sort_by(|a, b| match (&a.sequence_order, &b.sequence_order) {
            (Some(oa), Some(ob)) => oa.order_key(ob).then_with(|| a.id.cmp(&b.id)),
            _ => a.id.cmp(&b.id),
        });

        tracing::debug!(
            sequence_key = key,
            records = partition.len(),
            "processing partition"
        );

        let mut stack = SkillStack::new();
        for record in partition {
            let outcome = engine.evaluate(record);
            stack.update(&outcome.weights, &outcome.decays);
            let mut snapshot = stack.snapshot(&record.id);
            snapshot.sequence_key = record.sequence_key.clone();
            snapshots.push(snapshot);
        }
    }

    Ok(snapshots)
}
