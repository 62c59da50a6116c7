//! The `skillstack run` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::Table;

use skillstack_core::engine::{compile_rules, RuleEngine};
use skillstack_core::pipeline::{self, Mode, OutputKind, SimulationOptions, SimulationOutput};
use skillstack_core::projection::{self, TableRow};
use skillstack_store::RuleStore;

pub fn execute(
    dataset: PathBuf,
    rules_path: PathBuf,
    extra_rules: Option<PathBuf>,
    mode_str: String,
    output_str: String,
    ids_str: Option<String>,
    out: Option<PathBuf>,
) -> Result<()> {
    let mode: Mode = mode_str.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let output: OutputKind = output_str.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    // Load the rule set once for the whole run: ad-hoc rules first, then
    // the persisted store, so every record sees the same merged set. The
    // extra file was named explicitly, so it has to exist; only the
    // persisted store gets missing-means-empty first-run treatment.
    let mut rules = Vec::new();
    if let Some(extra) = &extra_rules {
        rules.extend(RuleStore::new(extra).load_required()?);
    }
    rules.extend(RuleStore::new(&rules_path).load()?);
    tracing::debug!(rules = rules.len(), "rule set loaded");

    let (compiled, skipped) = compile_rules(&rules);
    for s in &skipped {
        eprintln!(
            "Warning: skipping rule #{} ('{}'): {}",
            s.index + 1,
            s.skill,
            s.error
        );
    }
    if compiled.is_empty() {
        eprintln!("Warning: no usable rules; all scores will be empty.");
    }

    let records = skillstack_data::load_csv(&dataset)?;
    tracing::debug!(records = records.len(), path = %dataset.display(), "dataset loaded");

    let ids = ids_str.map(|s| {
        s.split(',')
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect::<Vec<_>>()
    });

    let options = SimulationOptions { mode, output, ids };
    let engine = RuleEngine::new(compiled);

    // Count the records the id filter actually selects; the filter list
    // itself may name ids absent from the dataset.
    let processed = match &options.ids {
        Some(ids) => records
            .iter()
            .filter(|r| ids.iter().any(|id| id == &r.id))
            .count(),
        None => records.len(),
    };

    let start = std::time::Instant::now();
    let result = pipeline::run(&records, &engine, &options)?;
    let elapsed = start.elapsed();

    render(&result, out.as_deref())?;

    eprintln!(
        "Run {} complete: {} record(s), {} rule(s) active, {} skipped ({:.1}ms) at {}",
        uuid::Uuid::new_v4(),
        processed,
        engine.rules().len(),
        skipped.len(),
        elapsed.as_secs_f64() * 1000.0,
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
    );

    Ok(())
}

fn render(result: &SimulationOutput, out: Option<&std::path::Path>) -> Result<()> {
    match (result, out) {
        (SimulationOutput::Table(rows), Some(path))
            if path.extension().map(|e| e == "csv").unwrap_or(false) =>
        {
            write_table_csv(rows, path)?;
            println!("Results written to {}", path.display());
        }
        (_, Some(path)) => {
            let json = serde_json::to_string_pretty(result)?;
            std::fs::write(path, json)
                .with_context(|| format!("failed to write results to {}", path.display()))?;
            println!("Results written to {}", path.display());
        }
        (SimulationOutput::Mean(means), None) => {
            let mut table = Table::new();
            table.set_header(vec!["Skill", "Mean score"]);
            for (skill, mean) in projection::positive_means(means) {
                table.add_row(vec![skill, format!("{mean:.2}")]);
            }
            println!("{table}");
        }
        (SimulationOutput::TopSkills(counts), None) => {
            let mut table = Table::new();
            table.set_header(vec!["Skill", "Times ranked first"]);
            let mut ranked: Vec<_> = counts.iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (skill, count) in ranked {
                table.add_row(vec![skill.clone(), count.to_string()]);
            }
            println!("{table}");
        }
        (other, None) => {
            println!("{}", serde_json::to_string_pretty(other)?);
        }
    }
    Ok(())
}

/// Export the table projection as CSV: every feature column in stored
/// order plus a final `pilha` column holding the snapshot as JSON.
fn write_table_csv(rows: &[TableRow], path: &std::path::Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    let columns: Vec<String> = rows
        .first()
        .map(|row| row.record.fields.keys().cloned().collect())
        .unwrap_or_default();

    let mut header = columns.clone();
    header.push("pilha".to_string());
    writer.write_record(&header)?;

    for row in rows {
        let mut cells: Vec<String> = columns
            .iter()
            .map(|col| {
                row.record
                    .fields
                    .get(col)
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            })
            .collect();
        cells.push(serde_json::to_string(&row.skills)?);
        writer.write_record(&cells)?;
    }

    writer.flush()?;
    Ok(())
}
