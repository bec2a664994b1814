//! `harmonic` command-line tool: export, import, stats and pruning for a
//! Harmonic store.

use anyhow::Context;
use clap::{Parser, Subcommand};
use harmonic_app::{init_tracing, DatabaseTarget, Harmonic, HarmonicConfig};
use std::path::PathBuf;

/// Operator tooling for the Harmonic local store
#[derive(Debug, Parser)]
#[command(name = "harmonic", version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file, or `memory`
    #[arg(long, global = true, value_name = "PATH")]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write every collection as an export document
    Export {
        /// Output file (stdout if omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Upsert every row of an export document
    Import {
        /// Export file to read
        file: PathBuf,
    },
    /// Print row counts per collection
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete messages and events older than N days (0 deletes all)
    Prune {
        /// Days to keep (configured retention if omitted)
        #[arg(long)]
        keep_days: Option<u32>,
    },
    /// Delete everything
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = HarmonicConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(database) = cli.database {
        config.database = DatabaseTarget::from(database);
    }
    init_tracing(&config.logging);

    let app = Harmonic::start(config).await.context("starting store")?;
    let outcome = run(&app, cli.command).await;
    app.shutdown().await.context("stopping store")?;
    outcome
}

async fn run(app: &Harmonic, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Export { output: Some(path) } => {
            let stats = app
                .export_to(&path)
                .await
                .with_context(|| format!("exporting to {}", path.display()))?;
            println!("Exported {} rows to {}", stats.total(), path.display());
        }
        Command::Export { output: None } => {
            let export = app.export().await.context("exporting")?;
            println!("{}", export.to_json()?);
        }
        Command::Import { file } => {
            let stats = app
                .import_from(&file)
                .await
                .with_context(|| format!("importing {}", file.display()))?;
            println!("Imported {} rows", stats.total());
            print_stats(&stats);
        }
        Command::Stats { json } => {
            let stats = app.stats().await.context("reading stats")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats);
            }
        }
        Command::Prune { keep_days } => {
            let report = app.prune(keep_days).await.context("pruning")?;
            println!(
                "Removed {} messages and {} analytics events",
                report.messages, report.events
            );
        }
        Command::Clear => {
            let removed = app.clear().await.context("clearing")?;
            println!("Removed {} rows", removed.total());
        }
    }
    Ok(())
}

fn print_stats(stats: &harmonic_durable::StoreStats) {
    println!("  Messages:  {}", stats.total_messages);
    println!("  Documents: {}", stats.total_documents);
    println!("  Projects:  {}", stats.total_projects);
    println!("  Events:    {}", stats.total_events);
}
