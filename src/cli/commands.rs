//! CLI commands implementation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::extraction::PdfToolkit;
use crate::gold::GoldStore;
use crate::queue::{QueueConfig, WorkQueue};
use crate::repository::{DocumentRepository, FilingRepository, RecordRepository};
use crate::services::{BuildService, ExtractEvent, ExtractService, IngestService, ParseService};

#[derive(Parser)]
#[command(name = "disclose")]
#[command(about = "Financial disclosure extraction and analytics pipeline")]
#[command(version)]
pub struct Cli {
    /// Settings file (defaults to ./disclose.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides the settings file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Ingest a year's disclosure bundle into the raw archive
    Ingest {
        /// Filing year the bundle covers
        year: i32,
        /// Path to the downloaded zip bundle
        bundle: PathBuf,
        /// URL the bundle was fetched from, recorded as provenance
        #[arg(long)]
        source_url: Option<String>,
    },

    /// Extract text from queued documents (direct text or OCR)
    Extract {
        /// Number of extraction workers
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Parse extracted text into structured records
    Parse {
        /// Limit number of documents to parse (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        limit: usize,
    },

    /// Build the star schema for a year
    Build {
        /// Year to build
        year: i32,
        /// Build even if extraction for the year is incomplete
        #[arg(long)]
        force: bool,
    },

    /// Show pipeline status
    Status {
        /// Year to report on (defaults to current year)
        year: Option<i32>,
    },

    /// Inspect and requeue dead-lettered documents
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// List dead-lettered documents
    Dead,
    /// Requeue dead-lettered documents for another attempt
    Requeue {
        /// Document ID to requeue (all dead letters if omitted)
        doc_id: Option<String>,
    },
    /// Delete completed queue messages
    Purge,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        settings = settings.with_data_dir(&data_dir);
    }

    match cli.command {
        Commands::Init => cmd_init(&settings),
        Commands::Ingest {
            year,
            bundle,
            source_url,
        } => cmd_ingest(&settings, year, &bundle, source_url.as_deref()),
        Commands::Extract { workers } => cmd_extract(settings, workers).await,
        Commands::Parse { limit } => cmd_parse(&settings, limit),
        Commands::Build { year, force } => cmd_build(&settings, year, force),
        Commands::Status { year } => cmd_status(&settings, year),
        Commands::Queue { command } => match command {
            QueueCommands::Dead => cmd_queue_dead(&settings),
            QueueCommands::Requeue { doc_id } => cmd_queue_requeue(&settings, doc_id.as_deref()),
            QueueCommands::Purge => cmd_queue_purge(&settings),
        },
    }
}

fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    // Initialize repositories (creates the schema)
    let db_path = settings.database_path();
    let _filings = FilingRepository::new(&db_path)?;
    let _documents = DocumentRepository::new(&db_path)?;
    let _records = RecordRepository::new(&db_path)?;
    let _queue = WorkQueue::new(&db_path, QueueConfig::from(&settings.queue))?;
    let _gold = GoldStore::new(&db_path)?;

    for (tool, found) in PdfToolkit::check_tools() {
        if found {
            println!("  {} {} found", style("✓").green(), tool);
        } else {
            println!(
                "  {} {} missing (extraction will fail until installed)",
                style("!").yellow(),
                tool
            );
        }
    }

    println!(
        "{} Initialized disclose in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    Ok(())
}

fn cmd_ingest(
    settings: &Settings,
    year: i32,
    bundle: &std::path::Path,
    source_url: Option<&str>,
) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let service = IngestService::new(settings)?;

    println!(
        "{} Ingesting {} bundle from {}",
        style("→").cyan(),
        year,
        bundle.display()
    );
    let report = service.ingest_bundle(year, bundle, source_url)?;

    println!(
        "{} Indexed {} filings ({} malformed lines skipped)",
        style("✓").green(),
        report.filings_indexed,
        report.index_errors
    );
    println!(
        "  PDFs: {} stored, {} unchanged, {} superseded, {} missing",
        report.pdfs_stored, report.pdfs_unchanged, report.pdfs_superseded, report.pdfs_missing
    );
    println!("  Queued for extraction: {}", report.enqueued);
    Ok(())
}

async fn cmd_extract(settings: Settings, workers: Option<usize>) -> anyhow::Result<()> {
    let workers = workers.unwrap_or(settings.workers);
    let queue = WorkQueue::new(
        &settings.database_path(),
        QueueConfig::from(&settings.queue),
    )?;
    let depth = queue.depth()?;

    if depth == 0 {
        println!("{} Queue is empty, nothing to extract", style("!").yellow());
        return Ok(());
    }

    println!(
        "{} Extracting {} documents with {} workers",
        style("→").cyan(),
        depth,
        workers
    );

    let pb = ProgressBar::new(depth);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  [{bar:30.cyan/dim}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    let (event_tx, mut event_rx) = mpsc::channel::<ExtractEvent>(256);
    let progress = {
        let pb = pb.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match event {
                    ExtractEvent::Started { doc_id, .. } => pb.set_message(doc_id),
                    ExtractEvent::Completed { .. } | ExtractEvent::Skipped { .. } => pb.inc(1),
                    ExtractEvent::Failed { doc_id, error } => {
                        pb.inc(1);
                        pb.println(format!("  {} {}: {}", style("✗").red(), doc_id, error));
                    }
                }
            }
        })
    };

    let service = ExtractService::new(settings);
    let result = service.process(workers, event_tx).await?;
    let _ = progress.await;
    pb.finish_and_clear();

    println!(
        "{} Extracted {} documents ({} already done, {} failed)",
        style("✓").green(),
        result.succeeded,
        result.skipped,
        result.failed
    );
    for year in &result.watermarked_years {
        println!("  {} Extraction complete for {}", style("✓").green(), year);
    }
    if result.failed > 0 {
        println!(
            "  {} Failed documents retry until the attempt cap; see 'disclose queue dead'",
            style("!").yellow()
        );
    }
    Ok(())
}

fn cmd_parse(settings: &Settings, limit: usize) -> anyhow::Result<()> {
    let service = ParseService::new(settings)?;
    let limit = if limit == 0 { None } else { Some(limit) };

    let report = service.run(limit)?;
    println!(
        "{} Parsed {} documents: {} records written, {} rejected",
        style("✓").green(),
        report.parsed,
        report.records_written,
        report.records_rejected
    );
    if report.unsupported > 0 {
        println!("  Unsupported filing types: {}", report.unsupported);
    }
    if report.failed > 0 {
        println!("  {} Failed: {}", style("✗").red(), report.failed);
    }
    Ok(())
}

fn cmd_build(settings: &Settings, year: i32, force: bool) -> anyhow::Result<()> {
    let service = BuildService::new(settings)?;

    println!("{} Building star schema for {}", style("→").cyan(), year);
    let report = service.build_year(year, force)?;

    println!(
        "  Dimensions: {} members, {} assets, {} filing types changed",
        report.dimensions.members_changed,
        report.dimensions.assets_changed,
        report.dimensions.filing_types_changed
    );
    println!(
        "  Facts: {} transactions, {} holdings",
        report.facts.transactions, report.facts.holdings
    );
    println!(
        "  Aggregates: {} ticker windows, {} member rows, {} quality rows, {} pair rows",
        report.aggregates.ticker_windows,
        report.aggregates.member_rows,
        report.aggregates.quality_rows,
        report.aggregates.pair_rows
    );
    println!("{} Build complete for {}", style("✓").green(), year);
    Ok(())
}

fn cmd_status(settings: &Settings, year: Option<i32>) -> anyhow::Result<()> {
    use chrono::Datelike;
    let year = year.unwrap_or_else(|| chrono::Utc::now().year());
    let db_path = settings.database_path();

    let filings = FilingRepository::new(&db_path)?;
    let documents = DocumentRepository::new(&db_path)?;
    let records = RecordRepository::new(&db_path)?;
    let queue = WorkQueue::new(&db_path, QueueConfig::from(&settings.queue))?;
    let gold = GoldStore::new(&db_path)?;

    println!("\n{}", style(format!("Pipeline Status: {year}")).bold());
    println!("{}", "-".repeat(40));

    let ingested = filings.ingest_watermark(year)?;
    println!(
        "{:<20} {}",
        "Last Ingest:",
        ingested
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "Never".to_string())
    );
    println!("{:<20} {}", "Filings:", filings.count_by_year(year)?);

    let counts = documents.status_counts(year)?;
    println!(
        "{:<20} {} total ({} pending, {} success, {} failed)",
        "Documents:",
        counts.total(),
        counts.pending,
        counts.success,
        counts.failed
    );
    println!("{:<20} {}", "Records:", records.count_for_year(year)?);

    let stats = queue.stats()?;
    println!(
        "{:<20} {} available, {} leased, {} done, {} dead",
        "Queue:", stats.available, stats.leased, stats.done, stats.dead
    );

    for stage in ["extraction", "build"] {
        let mark = gold.watermark(stage, year)?;
        let status = match mark {
            Some(mark) => format!(
                "{} (v{}, {})",
                style("complete").green(),
                mark.extraction_version,
                mark.completed_at.format("%Y-%m-%d %H:%M")
            ),
            None => style("not reached").dim().to_string(),
        };
        println!("{:<20} {}", format!("{stage} watermark:"), status);
    }

    Ok(())
}

fn cmd_queue_dead(settings: &Settings) -> anyhow::Result<()> {
    let queue = WorkQueue::new(
        &settings.database_path(),
        QueueConfig::from(&settings.queue),
    )?;
    let dead = queue.dead_letters()?;

    if dead.is_empty() {
        println!("{} No dead-lettered documents", style("✓").green());
        return Ok(());
    }

    println!("\n{}", style("Dead Letters").bold());
    println!("{}", "-".repeat(60));
    for letter in dead {
        println!(
            "{:<12} {} attempts, died {}",
            letter.message.document_id,
            letter.message.attempt_count,
            letter.dead_lettered_at.format("%Y-%m-%d %H:%M")
        );
        if let Some(error) = letter.last_error {
            println!("             {}", style(error).dim());
        }
    }
    println!("\nRequeue with 'disclose queue requeue [doc_id]'");
    Ok(())
}

fn cmd_queue_purge(settings: &Settings) -> anyhow::Result<()> {
    let queue = WorkQueue::new(
        &settings.database_path(),
        QueueConfig::from(&settings.queue),
    )?;
    let purged = queue.purge_done()?;
    println!(
        "{} Purged {} completed message(s)",
        style("✓").green(),
        purged
    );
    Ok(())
}

fn cmd_queue_requeue(settings: &Settings, doc_id: Option<&str>) -> anyhow::Result<()> {
    let queue = WorkQueue::new(
        &settings.database_path(),
        QueueConfig::from(&settings.queue),
    )?;
    let requeued = queue.requeue_dead(doc_id)?;

    if requeued == 0 {
        println!("{} Nothing to requeue", style("!").yellow());
    } else {
        println!(
            "{} Requeued {} document(s) for extraction",
            style("✓").green(),
            requeued
        );
    }
    Ok(())
}
