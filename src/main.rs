// rentroll - extract tenancy records from rent-roll PDFs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use rentroll::storage::{RecordSink, SqliteStorage};
use rentroll::types::format_currency;
use rentroll::{DocumentParser, PipelineConfig};

#[derive(Parser)]
#[command(name = "rentroll")]
#[command(author, version, about = "Extract unit records from rent-roll PDFs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract units from one or more PDFs
    Process {
        /// PDF files to process
        #[arg(required = true)]
        pdfs: Vec<PathBuf>,
        /// Pipeline configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// SQLite database to store results in
        #[arg(long)]
        db: Option<PathBuf>,
        /// Print each parsed document as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show totals across every stored document
    Summary {
        #[arg(long)]
        db: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rentroll=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process { pdfs, config, db, json } => process(&pdfs, config.as_deref(), db.as_deref(), json),
        Commands::Summary { db } => summary(&db),
    }
}

fn process(pdfs: &[PathBuf], config: Option<&Path>, db: Option<&Path>, json: bool) -> Result<()> {
    let config = PipelineConfig::load(config).context("Failed to load configuration")?;
    let parser = DocumentParser::new(config).context("Failed to build document parser")?;

    let mut storage = match db {
        Some(path) => Some(
            SqliteStorage::new(Some(path))
                .with_context(|| format!("Failed to open database {}", path.display()))?,
        ),
        None => None,
    };

    let mut failed = 0usize;
    for pdf in pdfs {
        let doc = match parser.parse_document(pdf) {
            Ok(doc) => doc,
            Err(e) => {
                eprintln!("{}: {}", pdf.display(), e);
                failed += 1;
                continue;
            }
        };

        if json {
            println!("{}", serde_json::to_string_pretty(&doc)?);
        } else {
            println!("{}", doc.summary_line());
        }

        if let Some(storage) = storage.as_mut() {
            storage
                .store(&doc)
                .with_context(|| format!("Failed to store {}", doc.file_name))?;
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} documents could not be read", failed, pdfs.len());
    }
    Ok(())
}

fn summary(db: &Path) -> Result<()> {
    let storage =
        SqliteStorage::new(Some(db)).with_context(|| format!("Failed to open database {}", db.display()))?;

    for doc in storage.list_documents()? {
        println!(
            "{:<40} {:>4} pages {:>4} units  ${:>12}",
            doc.file_name,
            doc.page_count,
            doc.total_units,
            format_currency(doc.total_rent)
        );
    }

    let totals = storage.property_summary()?;
    println!("{}", "=".repeat(72));
    println!(
        "{} documents, {} units ({} occupied, {} vacant, {:.1}% occupancy)",
        totals.document_count,
        totals.total_units,
        totals.occupied_units,
        totals.vacant_units,
        totals.occupancy_rate() * 100.0
    );
    println!(
        "Total rent ${}  Total area {} sq ft",
        format_currency(totals.total_rent),
        totals.total_area
    );
    Ok(())
}
