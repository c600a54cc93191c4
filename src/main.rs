use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use cinema_showtimes::allocine::{AllocineClient, find_theater};
use cinema_showtimes::cache::EnrichmentCache;
use cinema_showtimes::catalog::{CatalogApi, Enricher, TmdbClient};
use cinema_showtimes::config::Settings;
use cinema_showtimes::feed::day_feed;
use cinema_showtimes::orchestrator::Orchestrator;
use cinema_showtimes::store::DocumentStore;
use cinema_showtimes::http_client;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "cinema-showtimes")]
#[command(about = "Scrape a week of showtimes for the configured theaters")]
struct Cli {
    /// Re-scrape every date, ignoring existing data and staleness checks
    #[arg(long)]
    force: bool,
    /// Delete the enrichment cache before running
    #[arg(long)]
    clear_cache: bool,
    /// Also write today's showtimes as an RSS feed to this path
    #[arg(long)]
    rss: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Look a theater up by name and print its THEATERS entry
    FindTheater { query: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinema_showtimes=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let client = http_client()?;

    if let Some(Commands::FindTheater { query }) = cli.command {
        let source = AllocineClient::new(client);
        match find_theater(&source, &query).await? {
            Some(theater) => println!("{}", serde_json::to_string(&theater)?),
            None => bail!("no theater found for {query:?}"),
        }
        return Ok(());
    }

    if settings.theaters.is_empty() {
        bail!("no theaters configured, set THEATERS");
    }

    let mut cache = EnrichmentCache::open(&settings.cache_file).await;
    if cli.clear_cache {
        cache.clear().await?;
        info!(path = %cache.path().display(), "enrichment cache cleared");
    }

    let catalog: Option<Box<dyn CatalogApi>> = match &settings.tmdb_api_key {
        Some(key) => Some(Box::new(TmdbClient::new(client.clone(), key.clone()))),
        None => {
            warn!("TMDB_API_KEY not set, movies will carry placeholder metadata");
            None
        }
    };

    info!(theaters = settings.theaters.len(), days = settings.window_days, "starting scrape");
    let store = DocumentStore::new(&settings.movies_file);
    let mut orchestrator = Orchestrator::new(
        Box::new(AllocineClient::new(client)),
        Enricher::new(catalog, cache),
        store.clone(),
        Box::new(settings.pacing),
        settings.theaters.clone(),
        settings.window_days,
    );

    let today = chrono::Local::now().date_naive();
    let summary = orchestrator.run(today, cli.force).await?;
    info!(
        fetched = summary.fetched.len(),
        stale = summary.stale.len(),
        days = summary.days,
        "scrape complete"
    );

    if let Some(path) = cli.rss {
        let document = store.load().await?;
        let Some(day) = document.day(today) else {
            bail!("no showtimes for {today} to export");
        };
        let xml = day_feed(day, "Séances du jour", "https://www.allocine.fr")
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        std::fs::write(&path, xml).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "rss feed written");
    }

    Ok(())
}
