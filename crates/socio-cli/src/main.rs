//! Socio.io CLI
//!
//! CLI tool for classifying content, running the moderation pipeline over a
//! page fixture and compiling rule lists.

mod scan;

use std::fs;
use std::path::Path;
use std::time::Instant;

use clap::{Parser, Subcommand};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use socio_core::memory::MemoryDocument;
use socio_core::types::{ContentKind, ContentNode, FilterEvent, NodeId, PipelineStatus, TransformRecord, Verdict};
use socio_core::RuleSetBuilder;
use socio_engine::classify::ClassifierChain;
use socio_engine::{HttpRemote, RemoteClassifier};
use socio_rules::compile_rule_lists;
use ts_rs::TS;

use scan::{load_config, make_remote, run_scan, ScanOptions};

#[derive(Parser)]
#[command(name = "socio-cli")]
#[command(about = "Socio.io content moderation tools")]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a piece of text or an image URL
    Classify {
        /// Text to classify
        #[arg(long, conflicts_with = "image", required_unless_present = "image")]
        text: Option<String>,

        /// Image URL to classify
        #[arg(long)]
        image: Option<String>,

        /// Rendered image width
        #[arg(long, requires = "height")]
        width: Option<u32>,

        /// Rendered image height
        #[arg(long, requires = "width")]
        height: Option<u32>,

        /// Classification service URL; local rules only when omitted
        #[arg(short, long)]
        backend: Option<String>,
    },

    /// Moderate a page fixture and print the resulting elements
    Scan {
        /// Page fixture (JSON)
        #[arg(short, long)]
        page: String,

        /// Moderation config (JSON)
        #[arg(short, long)]
        config: Option<String>,

        /// Classification service URL; local rules only when omitted
        #[arg(short, long)]
        backend: Option<String>,

        /// Extra rule lists
        #[arg(short, long)]
        rules: Vec<String>,

        /// State file for counters and transform history
        #[arg(long)]
        history: Option<String>,
    },

    /// Check that the classification service answers
    Ping {
        #[arg(short, long, default_value = "http://127.0.0.1:5000")]
        backend: String,
    },

    /// Compile rule lists and report what they contain
    Rules {
        /// Input rule list files
        #[arg(short, long, required = true)]
        input: Vec<String>,
    },

    /// Write TypeScript definitions for the wire types
    ExportTypes {
        #[arg(short, long, default_value = "bindings")]
        out: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else if cli.quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    };
    let _ = TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto);

    let result = match cli.command {
        Commands::Classify {
            text,
            image,
            width,
            height,
            backend,
        } => block_on(cmd_classify(text, image, width.zip(height), backend)),
        Commands::Scan {
            page,
            config,
            backend,
            rules,
            history,
        } => block_on(cmd_scan(ScanOptions {
            page,
            config,
            backend,
            rules,
            history,
        })),
        Commands::Ping { backend } => block_on(cmd_ping(&backend)),
        Commands::Rules { input } => cmd_rules(&input),
        Commands::ExportTypes { out } => cmd_export_types(&out),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn block_on<F: std::future::Future<Output = Result<(), String>>>(future: F) -> Result<(), String> {
    let runtime = tokio::runtime::Runtime::new().map_err(|e| format!("Failed to start runtime: {}", e))?;
    runtime.block_on(future)
}

async fn classify_one(
    text: Option<String>,
    image: Option<String>,
    dimensions: Option<(u32, u32)>,
    backend: Option<String>,
) -> Result<Verdict, String> {
    let config = load_config(None, backend.as_deref())?;
    let remote = make_remote(&config, backend.as_deref())?;
    let chain = ClassifierChain::new(config.local_classifier(config.default_rules()), remote, config.request_timeout());

    let doc = MemoryDocument::new("about:blank");
    let (element, kind, payload) = match (text, image) {
        (Some(text), _) => (doc.push_text(&text), ContentKind::Text, text),
        (None, Some(url)) => (doc.push_image(&url, dimensions.map(|d| d.0), dimensions.map(|d| d.1)), ContentKind::Image, url),
        (None, None) => return Err("Either --text or --image is required".to_string()),
    };
    let node = ContentNode {
        element,
        node_id: NodeId(1),
        kind,
        payload: payload.trim().to_string(),
        dimensions,
    };

    let outcome = chain.classify(&node, "about:blank", backend.is_some()).await;
    if let Some(failure) = outcome.remote_failure {
        log::warn!("backend unavailable, used local rules: {}", failure);
    }
    Ok(outcome.verdict)
}

async fn cmd_classify(
    text: Option<String>,
    image: Option<String>,
    dimensions: Option<(u32, u32)>,
    backend: Option<String>,
) -> Result<(), String> {
    let verdict = classify_one(text, image, dimensions, backend).await?;
    let json = serde_json::to_string_pretty(&verdict).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

async fn cmd_scan(options: ScanOptions) -> Result<(), String> {
    let start = Instant::now();
    let report = run_scan(&options).await?;
    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{}", json);
    log::info!(
        "scanned '{}': {} filtered, {} processed in {:.1}ms",
        options.page,
        report.filtered,
        report.status.processed_count,
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}

async fn cmd_ping(backend: &str) -> Result<(), String> {
    let remote = HttpRemote::new(backend, std::time::Duration::from_secs(3))
        .map_err(|e| format!("Failed to create HTTP client: {}", e))?;
    let start = Instant::now();
    let ping = remote
        .ping()
        .await
        .map_err(|e| format!("Backend at '{}' is unreachable: {}", backend, e))?;

    println!("Backend '{}' is up", remote.base_url());
    println!("  Status:      {}", ping.status);
    println!("  Message:     {}", ping.message);
    println!("  Latency:     {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);
    Ok(())
}

fn cmd_rules(inputs: &[String]) -> Result<(), String> {
    if inputs.is_empty() {
        return Err("No input files specified".to_string());
    }

    let (_, stats) = compile_rule_lists(inputs, RuleSetBuilder::with_builtin()).map_err(|e| e.to_string())?;

    println!("Compiled {} rule lists", stats.lists);
    for path in inputs {
        println!("  - {}", Path::new(path).file_name().unwrap_or_default().to_string_lossy());
    }
    println!(
        "  Entries:   {} -> {} (dedupe removed {}, {} disabled by {} rules)",
        stats.optimize.before,
        stats.optimize.after,
        stats.optimize.deduped,
        stats.optimize.disabled_rules,
        stats.optimize.disable_rules
    );
    println!("  Profanity:      {}", stats.counts.profanity);
    println!("  Hate speech:    {}", stats.counts.hate_speech);
    println!("  Image keywords: {}", stats.counts.image_keywords);
    println!("  Allowed hosts:  {}", stats.counts.allowed_hosts);
    println!("  Time:      {:.1}ms", stats.total_ms);
    Ok(())
}

fn cmd_export_types(out: &str) -> Result<(), String> {
    fs::create_dir_all(out).map_err(|e| format!("Failed to create '{}': {}", out, e))?;

    Verdict::export_all_to(out).map_err(|e| format!("Failed to export Verdict: {}", e))?;
    TransformRecord::export_all_to(out).map_err(|e| format!("Failed to export TransformRecord: {}", e))?;
    PipelineStatus::export_all_to(out).map_err(|e| format!("Failed to export PipelineStatus: {}", e))?;
    FilterEvent::export_all_to(out).map_err(|e| format!("Failed to export FilterEvent: {}", e))?;

    println!("Exported TypeScript definitions to '{}'", out);
    Ok(())
}
