//! `stc`: search the catalog through the first healthy provider.
//!
//! ```bash
//! stc search "black holes" --language en --category books
//! stc search "black holes" --provider 1 --json
//! stc providers
//! stc bookmark add nexus_science "black holes"
//! stc metrics --last 10
//! stc ingest catalog.jsonl --index nexus_free
//! ```

mod output;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use stc_core::compiler::build_request;
use stc_core::config::{Settings, SEGMENTS_SUBDIR};
use stc_core::profile::{default_index_configs, is_supported_language, BackendProfile, Category};
use stc_core::types::{Bookmark, SearchOptions, SortMode, TimeRange};
use stc_core::IndexEngine;
use stc_search::{build_service, SearchProvider, SearchService};
use stc_store::MetaStore;
use stc_text::{CatalogIndexer, TantivyEngine};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stc", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search the active provider
    Search(SearchArgs),
    /// Set up every provider and show its status
    Providers,
    /// Manage saved queries
    #[command(subcommand)]
    Bookmark(BookmarkCommand),
    /// Show recent search latency
    Metrics {
        /// Average over this many most recent searches
        #[arg(long, default_value = "10")]
        last: usize,
    },
    /// Build a local collection from JSON lines
    Ingest {
        file: PathBuf,
        #[arg(long, default_value = "nexus_free")]
        index: String,
    },
}

#[derive(Args)]
struct SearchArgs {
    text: String,
    #[arg(long, default_value = "1")]
    page: u32,
    #[arg(long)]
    page_size: Option<usize>,
    /// Two-letter language code
    #[arg(long)]
    language: Option<String>,
    #[arg(long)]
    category: Option<Category>,
    /// Unix seconds, inclusive
    #[arg(long, requires = "to")]
    from: Option<i64>,
    /// Unix seconds, exclusive
    #[arg(long, requires = "from")]
    to: Option<i64>,
    #[arg(long)]
    sort_by_date: bool,
    /// Random sample of matching documents
    #[arg(long)]
    random: bool,
    /// Switch to this provider before searching
    #[arg(long)]
    provider: Option<usize>,
    /// Query an ingested collection directly, without providers
    #[arg(long, value_name = "INDEX")]
    offline: Option<String>,
    #[arg(long)]
    json: bool,
}

impl SearchArgs {
    fn options(&self) -> Result<SearchOptions> {
        if let Some(language) = &self.language {
            if !is_supported_language(language) {
                bail!("unsupported language '{language}'");
            }
        }
        Ok(SearchOptions {
            page: self.page,
            page_size: self.page_size,
            fields: None,
            language: self.language.clone(),
            category: self.category,
            timerange: self.from.zip(self.to).map(|(from, to)| TimeRange { from, to }),
            sort: if self.sort_by_date { SortMode::Date } else { SortMode::Relevance },
            random: self.random,
        })
    }
}

#[derive(Subcommand)]
enum BookmarkCommand {
    Add { index: String, query: String },
    Remove { index: String, query: String },
    List,
}

struct App {
    settings: Settings,
    base_dir: PathBuf,
    store: Arc<MetaStore>,
}

impl App {
    /// Engine over collections built by `stc ingest`.
    fn engine(&self) -> Arc<TantivyEngine> {
        Arc::new(TantivyEngine::new(self.settings.cache_dir(&self.base_dir)))
    }

    fn service(&self) -> Result<SearchService> {
        let replicas = Arc::new(TantivyEngine::new(self.settings.segments_dir(&self.base_dir)));
        Ok(build_service(&self.settings, &self.base_dir, Arc::clone(&self.store), replicas)?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    let base_dir = std::env::current_dir()?;
    let store_path = settings.store_path(&base_dir);
    let store = Arc::new(
        MetaStore::open(&store_path).with_context(|| format!("opening metadata store at {}", store_path.display()))?,
    );
    let app = App { settings, base_dir, store };

    match cli.command {
        Command::Search(args) => search(&app, args).await,
        Command::Providers => providers(&app).await,
        Command::Bookmark(cmd) => bookmark(&app, cmd),
        Command::Metrics { last } => metrics(&app, last),
        Command::Ingest { file, index } => ingest(&app, file, &index),
    }
}

fn bootstrap_bar(name: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(format!("bootstrapping {name}"));
    pb
}

/// Mirrors local bootstrap progress onto a terminal bar until the task is aborted.
fn watch_bootstrap(service: &SearchService) -> Vec<tokio::task::JoinHandle<()>> {
    service
        .providers()
        .iter()
        .filter_map(|provider| {
            let mut progress = provider.bootstrap_progress()?;
            let name = provider.name().to_string();
            Some(tokio::spawn(async move {
                let mut bar: Option<ProgressBar> = None;
                while progress.changed().await.is_ok() {
                    let current = *progress.borrow_and_update();
                    match current {
                        Some(percent) => bar.get_or_insert_with(|| bootstrap_bar(&name)).set_position(percent.round() as u64),
                        None => {
                            if let Some(done) = bar.take() {
                                done.finish_and_clear();
                            }
                        }
                    }
                }
            }))
        })
        .collect()
}

async fn search(app: &App, args: SearchArgs) -> Result<()> {
    let options = args.options()?;

    if let Some(index) = &args.offline {
        let engine = app.engine();
        app.store.install_default_index_configs(&default_index_configs(&app.settings.local.data_url))?;
        let config = app
            .store
            .get_index_config(index)?
            .with_context(|| format!("no stored config for collection '{index}'"))?;
        engine.register(&config).await?;
        let profile = BackendProfile::for_index(&config).with_page_size(5);
        let outputs = engine.search(&build_request(&args.text, &options, &profile)).await?;
        println!("{}", output::render(&args.text, &outputs, args.json));
        return Ok(());
    }

    let service = app.service()?;
    let watchers = watch_bootstrap(&service);
    service.setup().await;
    if let Some(index) = args.provider {
        if !service.change_provider(index).await? {
            eprintln!("Provider {index} is not healthy, keeping the current one");
        }
    }
    let outcome = service.search(&args.text, &options).await;
    watchers.iter().for_each(|w| w.abort());

    let outputs = outcome?;
    if let Some(provider) = service.active_provider() {
        info!(provider = %provider.name(), "search served");
    }
    println!("{}", output::render(&args.text, &outputs, args.json));
    Ok(())
}

async fn providers(app: &App) -> Result<()> {
    let service = app.service()?;
    let watchers = watch_bootstrap(&service);
    service.setup().await;
    for provider in service.providers() {
        if !provider.is_set_up() {
            if let Err(e) = provider.setup().await {
                info!(provider = %provider.name(), error = %e, "provider setup failed");
            }
        }
    }
    watchers.iter().for_each(|w| w.abort());

    let active = service.active_index();
    for (ix, provider) in service.providers().iter().enumerate() {
        let marker = if active == Some(ix) { "*" } else { " " };
        println!("{marker} {ix}. {} [{}] {}", provider.name(), provider.kind(), provider.status());
        if let Some(reason) = provider.failure_reason() {
            println!("     {reason}");
        }
    }
    if let Some(reason) = service.failure_reason() {
        println!("\nNo provider available: {reason}");
    }
    Ok(())
}

fn bookmark(app: &App, cmd: BookmarkCommand) -> Result<()> {
    match cmd {
        BookmarkCommand::Add { index, query } => {
            app.store.add_bookmark(&Bookmark::new(index, query))?;
            println!("Bookmark saved");
        }
        BookmarkCommand::Remove { index, query } => {
            if app.store.delete_bookmark(&index, &query)? {
                println!("Bookmark removed");
            } else {
                println!("No such bookmark");
            }
        }
        BookmarkCommand::List => {
            for b in app.store.list_bookmarks()? {
                println!("{}  {:<14} {}", b.created_at.format("%Y-%m-%d %H:%M"), b.index_name, b.query);
            }
        }
    }
    Ok(())
}

fn metrics(app: &App, last: usize) -> Result<()> {
    let total = app.store.search_metric_count()?;
    match app.store.average_spent(last)? {
        Some(avg) => println!("Average over last {last} searches: {avg:.3}s"),
        None => println!("Not enough data: {total} searches recorded, {last} needed"),
    }
    for metric in app.store.recent_search_metrics(last)? {
        println!("  {}  {:.3}s", metric.created_at.with_timezone(&chrono::Local).format("%H:%M:%S"), metric.spent);
    }
    Ok(())
}

fn ingest(app: &App, file: PathBuf, index: &str) -> Result<()> {
    if index == SEGMENTS_SUBDIR {
        bail!("'{SEGMENTS_SUBDIR}' is reserved for bootstrapped replicas");
    }
    let dir = app.settings.cache_dir(&app.base_dir).join(index);
    let reader = BufReader::new(File::open(&file).with_context(|| format!("opening {}", file.display()))?);

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("indexing {} into {}", file.display(), dir.display()));
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));
    let indexer = CatalogIndexer::create_in_dir(dir.clone())?;
    let count = indexer.add_json_lines(reader)?;
    spinner.finish_and_clear();

    println!("Indexed {count} documents into {}", dir.display());
    println!("Query it with: stc search <text> --offline {index}");
    Ok(())
}

