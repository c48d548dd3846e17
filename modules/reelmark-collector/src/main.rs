use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ollama_client::{OllamaClient, OllamaError};
use reelmark_collector::collector::{Collector, CollectorConfig};
use reelmark_collector::feed::JsonlFeed;
use reelmark_collector::session::{self, ResumeMode, SessionState};
use reelmark_collector::{enrichment, export};
use reelmark_common::{Config, Record, ReelmarkError, RuleSet};

#[derive(Parser)]
#[command(name = "reelmark", about = "Bookmark collection and filtering pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect and classify records from a captured feed.
    Collect {
        /// Capture file with one feed frame per line.
        #[arg(long)]
        input: PathBuf,
        /// Where the combined collection output is written.
        #[arg(long, default_value = "reelmark_output.json")]
        output: PathBuf,
        /// Session snapshot location (overrides REELMARK_SESSION_FILE).
        #[arg(long)]
        session_file: Option<PathBuf>,
        /// Cycle budget for this run (overrides REELMARK_MAX_CYCLES).
        #[arg(long)]
        max_cycles: Option<u32>,
        /// How to treat an existing session snapshot: full, seen-only, or fresh.
        #[arg(long, default_value = "full")]
        resume: ResumeMode,
        /// Disable randomized jitter on pacing delays.
        #[arg(long)]
        no_jitter: bool,
        /// Abort on the first cycle error instead of logging and continuing.
        #[arg(long)]
        fail_fast: bool,
    },
    /// Enrich collected records with a local Ollama model.
    Enrich {
        /// Collection output file produced by `collect`.
        #[arg(long)]
        input: PathBuf,
        /// Where the enrichment report is written.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Model to use (overrides OLLAMA_MODEL).
        #[arg(long)]
        model: Option<String>,
        /// Enrich at most this many records.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Re-export a collection or enrichment output into other formats.
    Export {
        /// Collection or enrichment output file.
        #[arg(long)]
        input: PathBuf,
        /// Write a CSV file here.
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Write a links-only JSON file here.
        #[arg(long)]
        links: Option<PathBuf>,
        /// Write per-category JSON buckets into this directory.
        #[arg(long)]
        categorized: Option<PathBuf>,
    },
}

/// The subset of a previously written output document the subcommands
/// read back.
#[derive(Deserialize)]
struct StoredDocument {
    #[serde(default)]
    config: Option<RuleSet>,
    #[serde(default)]
    tweets: Vec<Record>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("reelmark=info".parse()?))
        .init();

    match Cli::parse().command {
        Command::Collect {
            input,
            output,
            session_file,
            max_cycles,
            resume,
            no_jitter,
            fail_fast,
        } => {
            run_collect(
                input,
                output,
                session_file,
                max_cycles,
                resume,
                no_jitter,
                fail_fast,
            )
            .await
        }
        Command::Enrich {
            input,
            output,
            model,
            limit,
        } => run_enrich(input, output, model, limit).await,
        Command::Export {
            input,
            csv,
            links,
            categorized,
        } => run_export(input, csv, links, categorized),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_collect(
    input: PathBuf,
    output: PathBuf,
    session_file: Option<PathBuf>,
    max_cycles: Option<u32>,
    resume: ResumeMode,
    no_jitter: bool,
    fail_fast: bool,
) -> Result<()> {
    let config = Config::from_env();
    let rules = config.rules();

    let mut loop_cfg = CollectorConfig::from_config(&config);
    if let Some(path) = session_file {
        loop_cfg.session_file = path;
    }
    if let Some(budget) = max_cycles {
        loop_cfg.max_cycles = budget;
    }
    loop_cfg.jitter = !no_jitter;
    loop_cfg.continue_on_error = !fail_fast;

    let driver = JsonlFeed::from_path(&input)?;
    info!(frames = driver.frame_count(), input = %input.display(), "Loaded capture");

    let mut state = SessionState::resume(&loop_cfg.session_file, resume);
    if resume == ResumeMode::Fresh {
        session::clear(&loop_cfg.session_file)?;
    }

    let session_file = loop_cfg.session_file.clone();
    let mut collector = Collector::new(driver, rules.clone(), loop_cfg);

    // Ctrl-C requests a graceful stop; the current cycle still completes.
    let flags = collector.flags();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flags.request_stop();
        }
    });

    let outcome = collector.run(&mut state).await?;

    export::write_combined(&output, &rules, &state.stats, state.matched())?;
    if outcome.reason.is_complete() {
        session::clear(&session_file)?;
        info!("Collection complete, session snapshot cleared");
    } else {
        info!(session = %session_file.display(), "Session kept for resuming");
    }
    print!("{}", state.stats);
    Ok(())
}

async fn run_enrich(
    input: PathBuf,
    output: Option<PathBuf>,
    model: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let config = Config::from_env();
    let model = model.unwrap_or_else(|| config.ollama_model.clone());

    let document = read_document(&input)?;
    info!(records = document.tweets.len(), model = %model, "Starting enrichment");

    let client = OllamaClient::new(&config.ollama_url);
    match client.verify(&model).await {
        Ok(()) => {}
        Err(err @ OllamaError::ModelMissing { .. }) => {
            return Err(ReelmarkError::ModelUnavailable(err.to_string()).into());
        }
        Err(err) => warn!(error = %err, "Could not verify model, proceeding anyway"),
    }

    let report = enrichment::enrich(
        &client,
        &model,
        &input.display().to_string(),
        document.tweets,
        limit,
    )
    .await;

    let output = output.unwrap_or_else(|| default_report_path(&input, &model));
    export::write_report(&output, &report)?;
    Ok(())
}

fn run_export(
    input: PathBuf,
    csv: Option<PathBuf>,
    links: Option<PathBuf>,
    categorized: Option<PathBuf>,
) -> Result<()> {
    let document = read_document(&input)?;
    let rules = document
        .config
        .unwrap_or_else(|| Config::from_env().rules());

    if let Some(path) = csv {
        export::write_csv(&path, &document.tweets)?;
    }
    if let Some(path) = links {
        export::write_links(&path, &document.tweets, &rules.target_domains)?;
    }
    if let Some(dir) = categorized {
        export::write_categorized(&dir, &document.tweets, &rules)?;
    }
    Ok(())
}

fn read_document(path: &Path) -> Result<StoredDocument> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn default_report_path(input: &Path, model: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("bookmarks");
    input.with_file_name(format!("{stem}_processed_{model}.json"))
}
