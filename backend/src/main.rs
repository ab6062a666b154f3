//! hreflang-connect CLI
//!
//! # Main Commands
//!
//! ```bash
//! hreflang-connect serve                      # HTTP server + hourly import (port 3000)
//! hreflang-connect run                        # Import the configured feed once
//! hreflang-connect import <feed-url>          # Import an explicit feed URL
//! hreflang-connect set-feed <url>             # Configure the feed URL
//! hreflang-connect render 12 --format head    # Print an item's hreflang markup
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! hreflang-connect parse feed.csv             # Parse a local feed to JSON
//! hreflang-connect show-feed                  # Print the configured feed URL
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use hreflang_connect::{
    head_links, links_fragment, parse, start_server, AppState, Config, FeedPointer, FileStore,
    HreflangRenderer, HttpFetcher, ImportOrchestrator, ImportRun, ItemId, LanguageCode,
    PermalinkFile,
};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hreflang-connect")]
#[command(about = "Import hreflang alternate links from a CSV feed and render them", long_about = None)]
struct Cli {
    /// Data directory (overrides HREFLANG_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server and the periodic import
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Import the configured feed URL once, then clear it
    Run,

    /// Import an explicit feed URL
    Import {
        /// Feed URL
        feed_url: String,
    },

    /// Parse a local CSV feed and output JSON
    Parse {
        /// Input CSV file
        input: PathBuf,
    },

    /// Configure the feed URL for the next scheduled import
    SetFeed {
        url: String,
    },

    /// Clear the configured feed URL
    ClearFeed,

    /// Print the configured feed URL
    ShowFeed,

    /// Render an item's alternate links
    Render {
        /// Item ID
        item: ItemId,

        /// Default language (defaults to the site locale)
        #[arg(short, long)]
        default_lang: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "head")]
        format: RenderFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RenderFormat {
    Head,
    Fragment,
    Json,
}

type CmdResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match load_config(cli.data_dir) {
        Ok(config) => match cli.command {
            Commands::Serve { port } => cmd_serve(config, port).await,
            Commands::Run => cmd_run(config, None).await,
            Commands::Import { feed_url } => cmd_run(config, Some(feed_url)).await,
            Commands::Parse { input } => cmd_parse(&input),
            Commands::SetFeed { url } => cmd_set_feed(config, &url).await,
            Commands::ClearFeed => cmd_clear_feed(config).await,
            Commands::ShowFeed => cmd_show_feed(config).await,
            Commands::Render {
                item,
                default_lang,
                format,
            } => cmd_render(config, item, default_lang, format).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(data_dir: Option<PathBuf>) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = Config::from_env()?;
    if let Some(dir) = data_dir {
        if std::env::var_os("HREFLANG_SITEMAP").is_none() {
            config.sitemap = dir.join("sitemap.json");
        }
        config.data_dir = dir;
    }
    Ok(config)
}

async fn open_store(config: &Config) -> Result<Arc<FileStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(FileStore::open(&config.data_dir).await?))
}

async fn orchestrator(config: &Config, store: Arc<FileStore>) -> Result<ImportOrchestrator, Box<dyn std::error::Error>> {
    let fetcher = HttpFetcher::new(config.fetch_timeout, config.max_feed_bytes)?;
    let resolver = PermalinkFile::open(&config.sitemap).await?;
    tracing::info!(permalinks = resolver.len(), sitemap = %config.sitemap.display(), "resolver loaded");

    Ok(ImportOrchestrator::new(Arc::new(fetcher), Arc::new(resolver), store.clone(), store)
        .with_history(config.run_history))
}

async fn cmd_serve(config: Config, port: u16) -> CmdResult {
    let store = open_store(&config).await?;
    let renderer = HreflangRenderer::new(store.clone(), config.default_language());
    let orchestrator = Arc::new(orchestrator(&config, store).await?);

    if config.admin_token.is_none() {
        tracing::warn!("HREFLANG_ADMIN_TOKEN is not set, admin routes are disabled");
    }

    let state = AppState::new(orchestrator, renderer, config.admin_token.clone(), config.origin(port));
    start_server(state, port, config.import_interval).await
}

async fn cmd_run(config: Config, feed_url: Option<String>) -> CmdResult {
    let store = open_store(&config).await?;
    let orchestrator = orchestrator(&config, store).await?;

    let run = match feed_url {
        Some(url) => orchestrator.run(&url).await,
        None => orchestrator.run_scheduled().await,
    };

    print_run(&run)?;
    if run.outcome.is_failure() {
        return Err(format!("import failed: {}", run.detail.unwrap_or_default()).into());
    }
    Ok(())
}

fn print_run(run: &ImportRun) -> CmdResult {
    eprintln!("📊 {}", run.summary());
    for failure in &run.failures {
        eprintln!("   line {}: {}", failure.line, failure.reason);
    }
    println!("{}", serde_json::to_string_pretty(run)?);
    Ok(())
}

fn cmd_parse(input: &Path) -> CmdResult {
    eprintln!("📄 Parsing feed: {}", input.display());

    let bytes = fs::read(input)?;
    let feed = parse(&bytes)?;

    eprintln!("   Encoding: {}", feed.encoding);
    let codes: Vec<&str> = feed.languages.iter().map(LanguageCode::as_str).collect();
    eprintln!("   Languages: {}", codes.join(", "));

    let rows: Vec<_> = feed.rows.collect();
    eprintln!("✅ Parsed {} rows", rows.len());

    let json = json!({ "languages": codes, "rows": rows });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn pointer(config: &Config) -> Result<FeedPointer, Box<dyn std::error::Error>> {
    Ok(FeedPointer::new(open_store(config).await?))
}

async fn cmd_set_feed(config: Config, url: &str) -> CmdResult {
    pointer(&config).await?.set(url).await?;
    eprintln!("✅ Feed URL set to {}", url.trim());
    Ok(())
}

async fn cmd_clear_feed(config: Config) -> CmdResult {
    pointer(&config).await?.clear().await?;
    eprintln!("✅ Feed URL cleared");
    Ok(())
}

async fn cmd_show_feed(config: Config) -> CmdResult {
    let url = pointer(&config).await?.get().await?;
    if url.is_empty() {
        eprintln!("No feed URL configured");
    } else {
        println!("{}", url);
    }
    Ok(())
}

async fn cmd_render(config: Config, item: ItemId, default_lang: Option<String>, format: RenderFormat) -> CmdResult {
    let store = open_store(&config).await?;
    let renderer = HreflangRenderer::new(store, config.default_language());
    let default_language = default_lang
        .map(LanguageCode::new)
        .unwrap_or_else(|| renderer.default_language().clone());

    match format {
        RenderFormat::Head => print!("{}", head_links(&renderer.render(item, &default_language).await?)),
        RenderFormat::Fragment => {
            if let Some(links) = renderer.stored(item).await? {
                println!("{}", links_fragment(&links));
            }
        }
        RenderFormat::Json => {
            let links = renderer.render(item, &default_language).await?;
            println!("{}", serde_json::to_string_pretty(&links)?);
        }
    }
    Ok(())
}
