//! The `skillstack add-rule` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use skillstack_core::model::Rule;
use skillstack_core::predicate;
use skillstack_store::RuleStore;

pub fn execute(
    rules_path: PathBuf,
    skill: String,
    expr: String,
    weight: f64,
    decay: f64,
) -> Result<()> {
    // Compile up front so a typo is rejected before it reaches the store.
    predicate::compile(&expr).context("invalid predicate expression")?;

    let rule = Rule {
        skill,
        expr,
        weight,
        decay,
    };

    let store = RuleStore::new(&rules_path);
    store.append(rule)?;

    let total = store.load()?.len();
    println!(
        "Rule added to {} ({} rule(s) stored).",
        rules_path.display(),
        total
    );
    Ok(())
}
