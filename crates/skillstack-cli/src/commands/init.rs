//! The `skillstack init` command — writes a starter rule store.

use anyhow::Result;

use skillstack_core::model::Rule;
use skillstack_store::RuleStore;

const RULES_FILE: &str = "rules.json";

pub fn execute() -> Result<()> {
    if std::path::Path::new(RULES_FILE).exists() {
        println!("{RULES_FILE} already exists, skipping.");
        return Ok(());
    }

    let starter = vec![
        Rule {
            skill: "habilidade_teste".to_string(),
            expr: "trecho_outro_genero_9 == 0".to_string(),
            weight: 10.0,
            decay: 0.0,
        },
        Rule {
            skill: "outra_habilidade_teste".to_string(),
            expr: "trecho_outro_genero_9 == 0 & num_pontuacao_eixo_2 >= 120".to_string(),
            weight: 5.0,
            decay: 0.0,
        },
    ];

    RuleStore::new(RULES_FILE).replace_all(&starter)?;
    println!("Created {RULES_FILE} with {} starter rule(s).", starter.len());
    Ok(())
}
