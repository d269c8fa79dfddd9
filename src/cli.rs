// B-Roll CLI binary

use std::path::PathBuf;
use clap::{Parser, Subcommand};
use anyhow::Result;

use broll_lib::chat::{ChatOutcome, ChatSynthesizer};
use broll_lib::config::Config;
use broll_lib::constants::{DEFAULT_BROWSE_LIMIT, DEFAULT_SEARCH_LIMIT};
use broll_lib::db::models::Video;
use broll_lib::db::Catalog;
use broll_lib::inference::{InferenceGate, OllamaClient};
use broll_lib::ingest::{IngestOptions, Pipeline};
use broll_lib::metadata::ToolProbe;
use broll_lib::search::SearchEngine;

#[derive(Parser)]
#[command(name = "broll")]
#[command(about = "B-Roll - A searchable AI catalog for footage on external drives", long_about = None)]
#[command(version)]
struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a catalog on a drive
    Init {
        /// Drive root path
        drive: PathBuf,
        /// Embedding size of the configured embedding model
        #[arg(long)]
        dimensions: Option<usize>,
    },

    /// Scan the drive and analyze new or failed videos
    Process {
        /// Drive root path
        drive: PathBuf,
        /// Record files and metadata without AI analysis
        #[arg(long)]
        scan_only: bool,
        /// Re-analyze videos that are already analyzed
        #[arg(long)]
        force: bool,
        /// Keyframes sent to the vision model per video
        #[arg(long)]
        keyframes: Option<usize>,
    },

    /// Search the catalog
    Search {
        /// Search text
        query: String,
        /// Drive root path
        #[arg(short, long)]
        drive: PathBuf,
        /// hybrid, keyword or semantic
        #[arg(short, long, default_value = "hybrid")]
        mode: String,
        /// Maximum results
        #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show catalog statistics
    Stats {
        /// Drive root path
        drive: PathBuf,
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask a question about the footage
    Chat {
        /// Question text
        question: String,
        /// Drive root path
        #[arg(short, long)]
        drive: PathBuf,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Browse catalog folders
    Ls {
        /// Drive root path
        drive: PathBuf,
        /// Folder inside the drive (defaults to the root)
        #[arg(default_value = "")]
        path: String,
        /// Zero-based page number
        #[arg(long, default_value_t = 0)]
        page: usize,
        /// Videos per page
        #[arg(long, default_value_t = DEFAULT_BROWSE_LIMIT)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = Config::from_env();

    match cli.command {
        Commands::Init { drive, dimensions } => cmd_init(&config, drive, dimensions),
        Commands::Process { drive, scan_only, force, keyframes } => {
            cmd_process(&config, drive, scan_only, force, keyframes)
        }
        Commands::Search { query, drive, mode, limit, json } => cmd_search(&config, &query, drive, &mode, limit, json),
        Commands::Stats { drive, json } => cmd_stats(drive, json),
        Commands::Chat { question, drive, json } => cmd_chat(&config, &question, drive, json),
        Commands::Ls { drive, path, page, limit } => cmd_ls(drive, &path, page, limit),
    }
}

fn cmd_init(config: &Config, drive: PathBuf, dimensions: Option<usize>) -> Result<()> {
    let drive_root = resolve_drive_root(drive);
    let dimensions = dimensions.unwrap_or(config.embedding_dimensions);

    let catalog = Catalog::init(&drive_root, dimensions)?;

    println!("Initialized catalog at {}", drive_root.display());
    println!("  Database:   {}", catalog.db_path().display());
    println!("  Embeddings: {} dimensions ({})", dimensions, config.embedding_model);
    println!();
    println!("Next: broll process {}", drive_root.display());

    catalog.close()?;
    Ok(())
}

fn cmd_process(config: &Config, drive: PathBuf, scan_only: bool, force: bool, keyframes: Option<usize>) -> Result<()> {
    let catalog = Catalog::open(&resolve_drive_root(drive))?;
    let gate = InferenceGate::new(OllamaClient::new(config)?, config.inference_retries);
    let probe = ToolProbe;

    let options = IngestOptions {
        scan_only,
        force,
        num_keyframes: keyframes.unwrap_or(config.num_keyframes),
    };

    let result = Pipeline::new(&catalog, &probe, &gate, &gate).run(&options)?;

    println!();
    println!("{} complete:", if scan_only { "Scan" } else { "Processing" });
    println!("  Discovered:   {}", result.discovered);
    println!("  New:          {}", result.new_files);
    println!("  Moved:        {}", result.moved);
    println!("  Duplicates:   {}", result.duplicates);
    println!("  Unchanged:    {}", result.unchanged);
    if result.scan_errors > 0 {
        println!("  Scan errors:  {}", result.scan_errors);
    }
    if !scan_only {
        println!("  Analyzed:     {}", result.analyzed);
        println!("  Failed:       {}", result.failed);
    }
    if result.cancelled {
        println!("  (cancelled before finishing)");
    }

    if !result.device_breakdown.is_empty() {
        println!();
        println!("By device:");
        for (device, count) in &result.device_breakdown {
            println!("  {:<14}{}", device, count);
        }
    }

    catalog.close()?;
    Ok(())
}

fn cmd_search(config: &Config, query: &str, drive: PathBuf, mode: &str, limit: usize, json: bool) -> Result<()> {
    let catalog = Catalog::open(&resolve_drive_root(drive))?;
    let gate = InferenceGate::new(OllamaClient::new(config)?, config.inference_retries);

    let results = SearchEngine::new(&catalog, &gate).search_str(query, mode, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.degraded {
        println!("(semantic search unavailable, showing keyword matches only)");
    }
    if results.hits.is_empty() {
        println!("No results for {:?}.", query);
        return Ok(());
    }

    println!("{:>3}  {:>8}  {:>8}  {}", "#", "Score", "Duration", "File");
    println!("{}", "-".repeat(70));
    for (i, hit) in results.hits.iter().enumerate() {
        println!(
            "{:>3}  {:>8.4}  {:>8}  {}",
            i + 1,
            hit.score,
            duration_label(&hit.video),
            hit.video.file_path
        );
        if let Some(analysis) = hit.video.analysis() {
            println!("     {}", truncate(&analysis.scene_description, 100));
            if !analysis.tags.is_empty() {
                println!("     tags: {}", analysis.tags.join(", "));
            }
        }
    }

    Ok(())
}

fn cmd_stats(drive: PathBuf, json: bool) -> Result<()> {
    let catalog = Catalog::open(&resolve_drive_root(drive))?;
    let stats = catalog.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Catalog: {}", catalog.drive_root().display());
    println!();
    println!("Videos:       {}", stats.total);
    println!("  Analyzed:   {}", stats.analyzed);
    println!("  Scanned:    {}", stats.scanned);
    println!("  Failed:     {}", stats.failed);
    println!("Total size:   {}", format_size(stats.total_size_bytes));
    println!("Duration:     {}", format_duration(stats.total_duration_seconds));
    println!("Geotagged:    {}", stats.geotagged);
    println!("Embedded:     {}", stats.embedded);

    if !stats.devices.is_empty() {
        println!();
        println!("By device:");
        for (device, count) in &stats.devices {
            println!("  {:<14}{}", device, count);
        }
    }

    Ok(())
}

fn cmd_chat(config: &Config, question: &str, drive: PathBuf, json: bool) -> Result<()> {
    let catalog = Catalog::open(&resolve_drive_root(drive))?;
    let gate = InferenceGate::new(OllamaClient::new(config)?, config.inference_retries);

    let response = ChatSynthesizer::new(&catalog, &gate, &gate).ask(question, &[])?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match response.outcome {
        ChatOutcome::Answered | ChatOutcome::NoMatches => println!("{}", response.answer),
        ChatOutcome::Failed => {
            println!(
                "The model could not answer: {}",
                response.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    if !response.clips.is_empty() {
        println!();
        println!("Clips:");
        for clip in &response.clips {
            let marker = if response.cited_ids.contains(&clip.file_hash) { "*" } else { " " };
            println!("{} {}", marker, clip.file_path);
        }
    }

    Ok(())
}

fn cmd_ls(drive: PathBuf, path: &str, page: usize, limit: usize) -> Result<()> {
    let catalog = Catalog::open(&resolve_drive_root(drive))?;
    let listing = catalog.list_by_path_prefix(path, page, limit)?;

    let shown = if listing.path.is_empty() { "/" } else { listing.path.as_str() };
    println!("{} (page {})", shown, listing.page);
    println!();

    for folder in &listing.folders {
        println!("  {}/", folder);
    }
    for video in &listing.videos {
        println!(
            "  {:<40} {:>8}  {:>10}  {}",
            video.file_name,
            duration_label(video),
            format_size(video.file_size),
            video.status()
        );
    }

    if listing.folders.is_empty() && listing.videos.is_empty() {
        println!("  (empty)");
    }
    if listing.has_more {
        println!();
        println!("More videos: --page {}", listing.page + 1);
    }

    Ok(())
}

// --- Helper Functions ---

fn resolve_drive_root(drive: PathBuf) -> PathBuf {
    drive.canonicalize().unwrap_or(drive)
}

fn duration_label(video: &Video) -> String {
    video
        .duration_seconds
        .map(format_duration)
        .unwrap_or_else(|| "-".to_string())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

fn format_size(bytes: i64) -> String {
    const KB: i64 = 1024;
    const MB: i64 = KB * 1024;
    const GB: i64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
