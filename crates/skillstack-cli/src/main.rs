//! skillstack CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "skillstack",
    version,
    about = "Rule-driven skill scoring for essay datasets"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scoring simulation over a dataset
    Run {
        /// Path to the .csv dataset
        #[arg(long)]
        dataset: PathBuf,

        /// Rule store file
        #[arg(long, default_value = "rules.json")]
        rules: PathBuf,

        /// Extra rule file merged ahead of the stored rules for this run
        #[arg(long)]
        extra_rules: Option<PathBuf>,

        /// Scoring mode: independent, sequential
        #[arg(long, default_value = "independent")]
        mode: String,

        /// Projection: raw, table, mean, trace, top-skills
        #[arg(long, default_value = "raw")]
        output: String,

        /// Restrict to specific record ids (comma-separated)
        #[arg(long)]
        ids: Option<String>,

        /// Write the projection to a file instead of stdout
        /// (.csv for the table projection, JSON otherwise)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Validate and append one rule to the store
    AddRule {
        /// Rule store file
        #[arg(long, default_value = "rules.json")]
        rules: PathBuf,

        /// Skill the rule contributes to
        #[arg(long)]
        skill: String,

        /// Predicate expression (e.g. "num_pontuacao_eixo_2 >= 120")
        #[arg(long)]
        expr: String,

        /// Weight awarded when the predicate matches
        #[arg(long)]
        weight: f64,

        /// Decay rate in [0, 1]
        #[arg(long, default_value = "0.0")]
        decay: f64,
    },

    /// List the stored rules
    ListRules {
        /// Rule store file
        #[arg(long, default_value = "rules.json")]
        rules: PathBuf,
    },

    /// Check that every stored rule compiles
    Validate {
        /// Rule store file
        #[arg(long, default_value = "rules.json")]
        rules: PathBuf,
    },

    /// Create a starter rules.json
    Init,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("skillstack_core=info".parse().unwrap())
                .add_directive("skillstack_store=info".parse().unwrap())
                .add_directive("skillstack_cli=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            dataset,
            rules,
            extra_rules,
            mode,
            output,
            ids,
            out,
        } => commands::run::execute(dataset, rules, extra_rules, mode, output, ids, out),
        Commands::AddRule {
            rules,
            skill,
            expr,
            weight,
            decay,
        } => commands::add_rule::execute(rules, skill, expr, weight, decay),
        Commands::ListRules { rules } => commands::list_rules::execute(rules),
        Commands::Validate { rules } => commands::validate::execute(rules),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
