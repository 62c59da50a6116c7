//! The `skillstack validate` command.

use std::path::PathBuf;

use anyhow::Result;

use skillstack_core::predicate;
use skillstack_store::RuleStore;

pub fn execute(rules_path: PathBuf) -> Result<()> {
    let rules = RuleStore::new(&rules_path).load()?;

    let mut failures = 0;
    for (i, rule) in rules.iter().enumerate() {
        if let Err(e) = rule.validate() {
            println!("  [#{}] '{}' INVALID: {e}", i + 1, rule.skill);
            failures += 1;
            continue;
        }
        if let Err(e) = predicate::compile(&rule.expr) {
            println!("  [#{}] '{}' does not compile: {e}", i + 1, rule.skill);
            failures += 1;
        }
    }

    if failures == 0 {
        println!("All {} rule(s) valid.", rules.len());
        Ok(())
    } else {
        anyhow::bail!("{failures} invalid rule(s) in {}", rules_path.display());
    }
}
