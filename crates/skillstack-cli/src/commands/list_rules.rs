//! The `skillstack list-rules` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::Table;

use skillstack_store::RuleStore;

pub fn execute(rules_path: PathBuf) -> Result<()> {
    let rules = RuleStore::new(&rules_path).load()?;

    if rules.is_empty() {
        println!("No rules stored in {}.", rules_path.display());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Skill", "Expression", "Weight", "Decay"]);
    for (i, rule) in rules.iter().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            rule.skill.clone(),
            rule.expr.clone(),
            rule.weight.to_string(),
            rule.decay.to_string(),
        ]);
    }
    println!("{table}");
    println!("{} rule(s) in {}.", rules.len(), rules_path.display());

    Ok(())
}
