//! Dirgraph CLI: ingest collector dumps into an in-memory graph and
//! inspect what they would produce

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use dirgraph::driver::MemoryDriver;
use dirgraph::ingest::relationships::derive_batches;
use dirgraph::ingest::{load_document, ChannelSink, GraphSummary, IngestionJob, Ingestor, StatsNotifier};
use dirgraph::{FailurePolicy, IngestConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dirgraph", version, about = "Directory reconnaissance graph ingestion")]
struct Cli {
    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest collector files and print a store summary
    Ingest {
        /// Collector JSON files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Concurrent chunk workers per document
        #[arg(long, default_value_t = dirgraph::config::DEFAULT_WORKERS, env = "DIRGRAPH_WORKERS")]
        workers: usize,

        /// Attempts per store statement
        #[arg(long, default_value_t = dirgraph::config::DEFAULT_RETRIES, env = "DIRGRAPH_RETRIES")]
        retries: u32,

        /// Also derive RDP, local admin, DCOM and PS-remote relationships
        #[arg(long, env = "DIRGRAPH_LEGACY")]
        legacy: bool,

        /// abort-job, skip-group or continue-phase
        #[arg(long, default_value = "abort-job")]
        policy: FailurePolicy,

        /// Write the resulting graph as JSON
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Show what each file would produce without writing anything
    Inspect {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Include legacy relationship kinds
        #[arg(long, env = "DIRGRAPH_LEGACY")]
        legacy: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Ingest { files, workers, retries, legacy, policy, export } => {
            let config = IngestConfig::default()
                .with_workers(workers)
                .with_retries(retries)
                .with_legacy_mode(legacy)
                .with_failure_policy(policy);
            run_ingest(files, config, export, &cli.format).await
        }
        Commands::Inspect { files, legacy } => run_inspect(&files, legacy, &cli.format).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_ingest(
    files: Vec<PathBuf>,
    config: IngestConfig,
    export: Option<PathBuf>,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let driver = Arc::new(MemoryDriver::new());
    let (sink, mut lines) = ChannelSink::channel();
    let printer = tokio::spawn(async move {
        while let Some(line) = lines.recv().await {
            println!("{}", line);
        }
    });

    let notifier = Arc::new(StatsNotifier::new(driver.clone(), config.clone()));
    let ingestor = Ingestor::new(driver.clone(), Arc::new(sink), notifier.clone());
    let outcome = ingestor.run(IngestionJob::new(files, config)).await;
    drop(ingestor);
    printer.await.context("progress printer stopped")?;

    if let Some(summary) = notifier.summary() {
        print_summary(&summary, format)?;
    }

    if let Some(path) = export {
        let snapshot = driver.store().read().await.snapshot();
        let file = std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &snapshot)
            .with_context(|| format!("writing {}", path.display()))?;
        eprintln!("Graph exported to {}", path.display());
    }

    if let Some(diagnostic) = outcome.diagnostic() {
        bail!("ingestion failed\n{}", diagnostic);
    }
    Ok(())
}

fn print_summary(summary: &GraphSummary, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary)?);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Metric", "Count"]);
            for (label, count) in &summary.node_counts {
                table.add_row(vec![format!("{} nodes", label), count.to_string()]);
            }
            table.add_row(vec!["Relationships".to_string(), summary.relationship_count.to_string()]);
            table.add_row(vec!["ACL relationships".to_string(), summary.acl_count.to_string()]);
            println!("{}", table);
            if !summary.relationship_types.is_empty() {
                println!("Relationship types: {}", summary.relationship_types.join(", "));
            }
        }
    }
    Ok(())
}

async fn run_inspect(files: &[PathBuf], legacy: bool, format: &OutputFormat) -> anyhow::Result<()> {
    let mut report = Vec::with_capacity(files.len());
    for path in files {
        let doc = load_document(path).await?;
        let batches = derive_batches(&doc.entity_type, &doc.records, legacy);
        let relationships: Vec<(String, usize)> = batches
            .iter()
            .map(|b| (b.edge_type.as_str().to_string(), b.len()))
            .collect();
        report.push((doc.file_name(), doc.entity_type.to_string(), doc.records.len(), relationships));
    }

    match format {
        OutputFormat::Json => {
            let value: Vec<serde_json::Value> = report
                .iter()
                .map(|(file, entity_type, records, relationships)| {
                    let rels: serde_json::Map<String, serde_json::Value> = relationships
                        .iter()
                        .map(|(t, n)| (t.clone(), serde_json::Value::from(*n)))
                        .collect();
                    serde_json::json!({
                        "file": file,
                        "type": entity_type,
                        "records": records,
                        "relationships": rels,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["File", "Type", "Records", "Relationships"]);
            for (file, entity_type, records, relationships) in &report {
                let rels: Vec<String> = relationships.iter().map(|(t, n)| format!("{} ({})", t, n)).collect();
                table.add_row(vec![file.clone(), entity_type.clone(), records.to_string(), rels.join("\n")]);
            }
            println!("{}", table);
        }
    }
    Ok(())
}
