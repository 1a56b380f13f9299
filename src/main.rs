//! schemafaq builds FAQPage JSON-LD for a webpage from its title keywords,
//! "People Also Ask" questions and an LLM.
//!
//! The tool has four commands:
//! 1. `generate` - Runs the pipeline once for a URL and prints the result
//! 2. `serve` - Exposes the pipeline, live progress and the log over HTTP
//! 3. `logs` - Prints the invocation log
//! 4. `clear-logs` - Empties the invocation log

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Builder;
use log::{LevelFilter, info};

use schemafaq::progress::ProgressHub;
use schemafaq::server::{self, AppState};
use schemafaq::{
    FetchStrategy, KeywordSource, LogStore, PartialCredentials, Pipeline, PipelineConfig,
    PipelineResult, SearchPolicy,
};

/// A CLI tool to generate FAQ structured data for a webpage
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The command to execute
    #[command(subcommand)]
    command: Command,

    /// Path to a JSON configuration file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[arg(long, short, action = clap::ArgAction::Count, help = "Output v(v...)erbosity: error (0), warn (1), info (2), debug (3), trace (4)", global = true, default_value_t = 2)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Generate the FAQ schema and plain text for one URL
    Generate {
        /// The page URL to generate the FAQ for
        url: String,
        /// Print the whole result as JSON
        #[arg(long)]
        json: bool,
        /// Number of questions to generate
        #[arg(long)]
        faq_count: Option<usize>,
        /// Abort when any related-question search fails
        #[arg(long)]
        strict_search: bool,
        /// Page retrieval: "direct" or "firecrawl"
        #[arg(long)]
        fetch: Option<FetchStrategy>,
        /// Keyword source: "title" or "content-analysis"
        #[arg(long)]
        keyword_source: Option<KeywordSource>,
        /// Path to the invocation log file
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Serve the pipeline over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:9002")]
        addr: SocketAddr,
        /// Path to the invocation log file
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Print the invocation log as JSON, newest first
    Logs {
        /// Path to the invocation log file
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Remove every entry from the invocation log
    ClearLogs {
        /// Path to the invocation log file
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    Builder::new()
        .filter_level(match cli.verbose {
            0 => LevelFilter::Error,
            1 => LevelFilter::Warn,
            2 => LevelFilter::Info,
            3 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        })
        .init();

    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded environment from {}", path.display());
    }

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Command::Generate {
            url,
            json,
            faq_count,
            strict_search,
            fetch,
            keyword_source,
            log,
        } => {
            let mut config = with_log_path(config, log);
            if faq_count.is_some() {
                config.faq_count = faq_count;
            }
            if strict_search {
                config.search_policy = SearchPolicy::Strict;
            }
            if let Some(fetch) = fetch {
                config.fetch_strategy = fetch;
            }
            if let Some(keyword_source) = keyword_source {
                config.keyword_source = keyword_source;
            }
            handle_generate_command(config, &url, json).await
        }
        Command::Serve { addr, log } => handle_serve_command(with_log_path(config, log), addr).await,
        Command::Logs { log } => {
            let store = LogStore::new(with_log_path(config, log).log_path);
            let entries = store.entries().await;
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(())
        }
        Command::ClearLogs { log } => {
            LogStore::new(with_log_path(config, log).log_path)
                .clear()
                .await
        }
    }
}

fn with_log_path(mut config: PipelineConfig, log: Option<PathBuf>) -> PipelineConfig {
    if let Some(log) = log {
        config.log_path = log;
    }
    config
}

async fn handle_generate_command(config: PipelineConfig, url: &str, json: bool) -> Result<()> {
    let credentials = PartialCredentials::from_env().into_credentials()?;
    let pipeline = Pipeline::from_config(config)?;

    let result = pipeline
        .run(url, &credentials)
        .await
        .with_context(|| format!("Failed to generate FAQ for {url}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

fn print_result(result: &PipelineResult) {
    println!("Keywords: {}", result.keywords.join(", "));
    println!("Related questions: {}", result.related_questions.len());
    println!("\n{}\n", result.faq_schema);
    println!("{}", result.plain_text_faq);
    if let Some(error) = &result.error {
        eprintln!("\nFinished with errors: {error}");
    }
}

async fn handle_serve_command(config: PipelineConfig, addr: SocketAddr) -> Result<()> {
    let state = AppState {
        pipeline: Arc::new(Pipeline::from_config(config)?),
        hub: ProgressHub::new(),
        default_credentials: PartialCredentials::from_env(),
    };
    server::serve(addr, state).await
}
