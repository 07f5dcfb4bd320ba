use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{error, info, warn};

use bh_catalog::catalog::{FailurePolicy, NameRules};
use bh_catalog::config::{Config, DEFAULT_CONFIG_PATH};
use bh_catalog::journal::{self, Journal};
use bh_catalog::logging;
use bh_catalog::session::{IngestionSession, TaskReport, TaskState};
use bh_catalog::tasks::TaskRegistry;
use bh_catalog::vocab::Vocabulary;

#[derive(Parser)]
#[command(name = "bh_catalog")]
#[command(about = "Black hole catalog builder: ingests published tables into a journaled catalog")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run ingestion tasks and journal the results
    Import {
        /// Specific tasks to run (comma-separated). Defaults to every enabled task
        #[arg(long, value_delimiter = ',')]
        tasks: Vec<String>,
        /// Stop each task after this many accepted records
        #[arg(long)]
        limit: Option<usize>,
        /// Override the configured failure policy (ignore, warn, raise)
        #[arg(long)]
        policy: Option<FailurePolicy>,
        /// Ignore saved checkpoints and start every task from the first record
        #[arg(long)]
        fresh: bool,
    },
    /// Check the journal against checkpoints and expected counts
    Verify,
    /// List the available tasks
    Tasks,
}

fn print_report(report: &TaskReport) {
    println!("\n📊 {} ({}):", report.task, report.state);
    if let Some(start) = report.resumed_from {
        println!("   Resumed from record: {}", start);
    }
    println!("   Accepted: {} ({} this run)", report.accepted, report.accepted_this_run);
    println!("   Skipped: {}", report.skipped);
    println!("   Dropped: {}", report.dropped);
    match report.expected {
        Some(expected) => println!("   Expected: {}", expected),
        None => println!("   Expected: unknown"),
    }
    if report.limited {
        println!("   Stopped at the record limit");
    }
    if let Some(reason) = &report.abort_reason {
        println!("   ❌ Aborted: {}", reason);
    }
    if !report.warnings.is_empty() {
        println!("\n⚠️  Warnings:");
        for w in &report.warnings {
            println!("   - {}", w);
        }
    }
}

fn run_import(
    config: &Config,
    registry: &TaskRegistry,
    tasks: Vec<String>,
    limit: Option<usize>,
    policy: Option<FailurePolicy>,
    fresh: bool,
) -> anyhow::Result<()> {
    let selected = registry.select(&tasks)?;
    // An explicit --tasks list runs tasks even when the config disables them.
    let selected: Vec<_> = selected
        .into_iter()
        .filter(|t| !tasks.is_empty() || config.task(t.name()).enabled)
        .collect();
    if selected.is_empty() {
        warn!("No tasks selected");
        return Ok(());
    }

    let policy = policy.unwrap_or(config.catalog.failure_policy);
    let journal = Journal::open(&config.journal.dir, &config.journal.meta_db)?;
    let catalog = journal::open_catalog(&journal, NameRules::standard(), policy)?;

    let mut options = config.session_options();
    options.limit = limit;
    options.resume = !fresh;

    let mut session = IngestionSession::new(catalog, journal, Vocabulary::standard(), options);
    let mut aborted = Vec::new();
    for task in selected {
        let path = config.input_path(task);
        info!(task = %task.name(), path = %path.display(), "Starting task");
        let report = session
            .run_file(task, &path)
            .with_context(|| format!("task {}", task.name()))?;
        print_report(&report);
        if report.state == TaskState::Aborted {
            aborted.push(report.task.clone());
        }
    }

    println!("\n✅ Catalog holds {} entries", session.catalog().len());
    if !aborted.is_empty() {
        anyhow::bail!("aborted tasks: {}", aborted.join(", "));
    }
    Ok(())
}

fn run_verify(config: &Config, registry: &TaskRegistry) -> anyhow::Result<()> {
    let journal = Journal::open(&config.journal.dir, &config.journal.meta_db)?;
    let expected: BTreeMap<String, Option<usize>> = registry
        .iter()
        .map(|t| {
            let total = config.task(t.name()).expected_total.or_else(|| t.expected_total());
            (t.name().to_string(), total)
        })
        .collect();

    let report = journal::verify(&journal, &expected)?;
    println!("🔎 Journal at {}: {} entries", journal.dir().display(), report.entries);
    for task in &report.tasks {
        let mark = if task.is_consistent() { "✅" } else { "⚠️ " };
        println!(
            "   {} {}: accepted {}, expected {}, tagged entries {}, {}",
            mark,
            task.task,
            task.accepted.map_or("-".to_string(), |n| n.to_string()),
            task.expected.map_or("-".to_string(), |n| n.to_string()),
            task.entries_tagged,
            if task.complete { "complete" } else { "incomplete" },
        );
    }
    for u in &report.unresolved {
        println!("   ❌ {} / {}: cites missing source {}", u.entry, u.key, u.source_ref);
    }

    if !report.is_clean() {
        anyhow::bail!("journal verification found problems");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    let _guard = logging::init_logging(&config.logging.dir);
    let registry = TaskRegistry::standard();

    let result = match cli.command {
        Commands::Import {
            tasks,
            limit,
            policy,
            fresh,
        } => {
            println!("🔄 Running import...");
            run_import(&config, &registry, tasks, limit, policy, fresh)
        }
        Commands::Verify => run_verify(&config, &registry),
        Commands::Tasks => {
            for task in registry.iter() {
                let enabled = if config.task(task.name()).enabled { "" } else { " (disabled)" };
                println!("{:<18} {}{}", task.name(), task.description(), enabled);
                println!("{:<18} input: {}", "", config.input_path(task).display());
            }
            Ok(())
        }
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}
