use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use feedcast::api::{self, AppState};
use feedcast::blob::{FsBlobStore, HttpBlobStore};
use feedcast::config::AppConfig;
use feedcast::generator::CommandArtifactGenerator;
use feedcast::pipeline::CycleOptions;
use feedcast::replication::AudioReplicator;
use feedcast::telemetry::init_tracing;
use feedcast::{
    cutoff_from_hours, BlobStore, Fetcher, IngestionOrchestrator, ItemStore, MemoryItemStore, PgItemStore,
    PodcastOrchestrator, ScanFilter,
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "feedcast", about = "Feed ingestion and podcast generation")]
struct Cli {
    /// Keep items in process memory instead of Postgres
    #[arg(global = true, long, default_value_t = false)]
    in_memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve,
    /// Fetch one feed page and store new items
    Ingest {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Run one podcast generation cycle
    Generate {
        #[arg(long)]
        cutoff_hours: Option<i64>,
        #[arg(long)]
        batch_limit: Option<usize>,
        /// Wait for every item to finish and report results
        #[arg(long, default_value_t = false)]
        wait: bool,
    },
    /// List stored items through the paginated scan
    Backlog {
        #[arg(long, default_value_t = false)]
        blank_artifact_only: bool,
        /// Only items last touched after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

struct Services {
    ingestion: Arc<IngestionOrchestrator>,
    podcasts: Arc<PodcastOrchestrator>,
}

async fn build_services(config: &AppConfig, in_memory: bool) -> anyhow::Result<Services> {
    let store: Arc<dyn ItemStore> = if in_memory {
        warn!("Using the in-memory item store; nothing will be persisted");
        Arc::new(MemoryItemStore::new())
    } else {
        let database_url = config.require_database_url()?;
        let store = PgItemStore::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        store.run_migrations().await?;
        Arc::new(store)
    };

    let blob: Arc<dyn BlobStore> = if config.blob.endpoint.is_some() {
        Arc::new(HttpBlobStore::new(&config.blob)?)
    } else {
        info!("BLOB_ENDPOINT not set, storing audio under {}", config.blob.local_dir.display());
        Arc::new(FsBlobStore::from_config(&config.blob))
    };

    let source = Arc::new(Fetcher::new(config.fetch.clone())?);
    let generator = Arc::new(CommandArtifactGenerator::new(&config.generator)?);

    let mut ingestion = IngestionOrchestrator::new(source, store.clone());
    if config.audio.enabled {
        ingestion = ingestion.with_audio_replication(AudioReplicator::new(blob.clone(), &config.audio)?);
    }
    let ingestion = Arc::new(ingestion);
    let podcasts = Arc::new(
        PodcastOrchestrator::new(store, blob, generator, config.cycle.clone(), config.podcast.clone())?
            .with_key_prefix(config.blob.key_prefix.clone()),
    );

    Ok(Services { ingestion, podcasts })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let services = build_services(&config, cli.in_memory).await?;

    match cli.command {
        Commands::Serve => {
            let state = AppState {
                ingestion: services.ingestion,
                podcasts: services.podcasts,
                default_limit: config.feed_default_limit,
            };
            api::serve(state, &config.api.host, config.api.port).await?;
        }
        Commands::Ingest { limit, offset } => {
            let outcome = services
                .ingestion
                .ingest(limit.unwrap_or(config.feed_default_limit), offset)
                .await?;
            println!(
                "saved {} of {} fetched items, replicated {} audio files",
                outcome.saved,
                outcome.items.len(),
                outcome.uploaded
            );
        }
        Commands::Generate { cutoff_hours, batch_limit, wait } => {
            let options = CycleOptions {
                cutoff_age: cutoff_hours.map(cutoff_from_hours).transpose()?,
                batch_limit,
                podcast: None,
            };
            let dispatch = services.podcasts.run_cycle_with(options).await?;
            println!("started {} items (cutoff {})", dispatch.started, dispatch.cutoff);
            if dispatch.tasks.is_empty() {
                return Ok(());
            }

            // Returning from main would abort the tasks, so the CLI always
            // joins them; --wait only controls the report.
            let outcomes = dispatch.wait().await;
            let done = outcomes.iter().filter(|o| o.is_done()).count();
            if wait {
                for outcome in outcomes.iter().filter(|o| !o.is_done()) {
                    println!(
                        "FAILED {} at {}: {}",
                        outcome.item_id,
                        outcome.reached.as_str(),
                        outcome.error.as_deref().unwrap_or("unknown error")
                    );
                }
                println!("{} done, {} failed", done, outcomes.len() - done);
            } else {
                info!("Cycle finished: {} done, {} failed", done, outcomes.len() - done);
            }
        }
        Commands::Backlog { blank_artifact_only, since, limit } => {
            let filter = ScanFilter { last_query_before: None, last_query_after: since, blank_artifact_only };
            let items = services.ingestion.backlog(&filter, limit).await?;
            for item in &items {
                println!(
                    "{}\t{}\t{}",
                    item.uuid,
                    item.last_query_datetime.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string()),
                    item.title
                );
            }
            println!("{} items", items.len());
        }
    }

    Ok(())
}
