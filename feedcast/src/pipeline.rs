use crate::document::render_item_pdf;
use crate::ingestion::scan_filtered;
use crate::scratch::{GenerationTask, WorkDir};
use crate::tasks::TaskGroup;
use crate::types::{
    ArtifactGenerator, BlobStore, CycleConfig, FeedItem, GenerationRequest, ItemOutcome, ItemStage, ItemStore,
    PipelineError, PodcastConfig, Result, ScanFilter,
};
use crate::utils::content_type_for;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Per-call overrides for one cycle. Unset fields fall back to the
/// orchestrator's configuration.
#[derive(Debug, Clone, Default)]
pub struct CycleOptions {
    pub cutoff_age: Option<chrono::Duration>,
    pub batch_limit: Option<usize>,
    pub podcast: Option<PodcastConfig>,
}

/// What `run_cycle` hands back immediately, before any item finishes.
#[derive(Debug)]
pub struct CycleDispatch {
    /// Tasks launched by this cycle.
    pub started: usize,
    /// Selected items left alone because an earlier cycle is still on them.
    pub skipped_in_flight: usize,
    pub cutoff: DateTime<Utc>,
    pub cycle_started_at: DateTime<Utc>,
    pub tasks: TaskGroup<ItemOutcome>,
}

impl CycleDispatch {
    /// Block until every dispatched item reaches DONE or FAILED.
    pub async fn wait(self) -> Vec<ItemOutcome> {
        self.tasks.join_all().await
    }
}

type InFlight = Arc<Mutex<HashSet<String>>>;

/// Marks an item as being processed until dropped.
struct InFlightGuard {
    registry: InFlight,
    item_id: String,
}

impl InFlightGuard {
    fn try_register(registry: &InFlight, item_id: &str) -> Option<Self> {
        let mut ids = registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !ids.insert(item_id.to_string()) {
            return None;
        }
        Some(Self { registry: registry.clone(), item_id: item_id.to_string() })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut ids = self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        ids.remove(&self.item_id);
    }
}

/// Selects stale items without an artifact and runs the per-item
/// document → audio → upload → store pipeline for each in the background.
pub struct PodcastOrchestrator {
    pipeline: ItemPipeline,
    config: CycleConfig,
    podcast: PodcastConfig,
    slots: Arc<Semaphore>,
    in_flight: InFlight,
}

impl PodcastOrchestrator {
    pub fn new(
        store: Arc<dyn ItemStore>,
        blob: Arc<dyn BlobStore>,
        generator: Arc<dyn ArtifactGenerator>,
        config: CycleConfig,
        podcast: PodcastConfig,
    ) -> Result<Self> {
        config.validate()?;
        podcast.conversation.validate()?;

        let pipeline = ItemPipeline {
            store,
            blob,
            generator,
            work: WorkDir::new(config.work_dir.clone()),
            key_prefix: String::new(),
        };

        Ok(Self {
            pipeline,
            slots: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
            podcast,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Prefix prepended to every uploaded blob key.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.pipeline.key_prefix = prefix.into();
        self
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().map(|ids| ids.len()).unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub async fn run_cycle(&self) -> Result<CycleDispatch> {
        self.run_cycle_with(CycleOptions::default()).await
    }

    /// Sweep, select and dispatch. Returns once the tasks are spawned.
    pub async fn run_cycle_with(&self, options: CycleOptions) -> Result<CycleDispatch> {
        let podcast = options.podcast.unwrap_or_else(|| self.podcast.clone());
        podcast.conversation.validate()?;

        let batch_limit = options.batch_limit.unwrap_or(self.config.batch_limit);
        if batch_limit == 0 {
            return Err(PipelineError::Configuration("batch_limit must be positive".to_string()));
        }
        let cutoff_age = options.cutoff_age.unwrap_or(self.config.cutoff_age);
        if cutoff_age < chrono::Duration::zero() {
            return Err(PipelineError::Configuration("cutoff age cannot be negative".to_string()));
        }

        let cycle_started_at = Utc::now();
        let cutoff = cycle_started_at
            .checked_sub_signed(cutoff_age)
            .ok_or_else(|| PipelineError::Configuration(format!("cutoff age {} is out of range", cutoff_age)))?;

        let work = &self.pipeline.work;
        let running = self.in_flight_count();
        if running == 0 {
            match work.sweep().await {
                Ok(removed) if removed > 0 => info!("Removed {} leftover files from {}", removed, work.root().display()),
                Ok(_) => {}
                Err(e) => warn!("Cleanup sweep of {} failed: {}", work.root().display(), e),
            }
        } else {
            info!("Skipping cleanup sweep, {} items still in flight", running);
        }
        work.ensure().await?;

        let candidates =
            scan_filtered(self.pipeline.store.as_ref(), &ScanFilter::eligible_for_generation(cutoff), batch_limit)
                .await?;
        info!("Selected {} items older than {}", candidates.len(), cutoff);

        let podcast = Arc::new(podcast);
        let mut tasks = TaskGroup::new();
        let mut skipped_in_flight = 0;

        for item in candidates {
            let Some(guard) = InFlightGuard::try_register(&self.in_flight, &item.uuid) else {
                debug!(item_id = %item.uuid, "Already in flight, not dispatching again");
                skipped_in_flight += 1;
                continue;
            };

            let span = info_span!("podcast_item", item_id = %item.uuid);
            let pipeline = self.pipeline.clone();
            let podcast = podcast.clone();
            let slots = self.slots.clone();
            let item_timeout = self.config.item_timeout;
            let throttle = self.config.throttle;

            tasks.push(tokio::spawn(
                async move {
                    let _guard = guard;
                    let item_id = item.uuid.clone();
                    let _slot = match slots.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return ItemOutcome::failed(item_id, ItemStage::Selected, "worker slots closed"),
                    };

                    let outcome = pipeline.run(item, &podcast, item_timeout).await;

                    // Held slot keeps the next generator call back.
                    if !throttle.is_zero() {
                        tokio::time::sleep(throttle).await;
                    }
                    outcome
                }
                .instrument(span),
            ));
        }

        let started = tasks.len();
        info!("Dispatched {} podcast tasks ({} already in flight)", started, skipped_in_flight);

        Ok(CycleDispatch { started, skipped_in_flight, cutoff, cycle_started_at, tasks })
    }
}

/// Shared handles one item task needs.
#[derive(Clone)]
struct ItemPipeline {
    store: Arc<dyn ItemStore>,
    blob: Arc<dyn BlobStore>,
    generator: Arc<dyn ArtifactGenerator>,
    work: WorkDir,
    key_prefix: String,
}

impl ItemPipeline {
    async fn run(&self, item: FeedItem, podcast: &PodcastConfig, item_timeout: Duration) -> ItemOutcome {
        let mut task = self.work.task(&item.uuid);
        let mut reached = ItemStage::Selected;

        let result = match tokio::time::timeout(item_timeout, self.steps(&item, podcast, &mut task, &mut reached)).await
        {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout { seconds: item_timeout.as_secs() }),
        };

        task.cleanup().await;

        match result {
            Ok(url) => {
                info!(item_id = %item.uuid, "Podcast published at {}", url);
                ItemOutcome::done(item.uuid, url)
            }
            Err(e) => {
                error!(
                    item_id = %item.uuid,
                    stage = reached.as_str(),
                    kind = e.kind(),
                    "Podcast pipeline failed: {}",
                    e
                );
                ItemOutcome::failed(item.uuid, reached, e.to_string())
            }
        }
    }

    async fn steps(
        &self,
        item: &FeedItem,
        podcast: &PodcastConfig,
        task: &mut GenerationTask,
        reached: &mut ItemStage,
    ) -> Result<String> {
        render_item_pdf(item, &task.document_path).await?;
        advance(reached, ItemStage::DocumentBuilt);

        let request = GenerationRequest {
            item_id: item.uuid.clone(),
            documents: vec![task.document_path.clone()],
            image_urls: item.images.clone(),
            tts_model: podcast.tts_model,
            style: podcast.conversation.clone(),
            scratch_dir: task.scratch_dir.clone(),
        };
        let artifact = self.generator.generate(&request).await?;
        task.record_artifact(artifact);
        advance(reached, ItemStage::AudioGenerated);

        let (audio_path, key) = match (task.audio_path(), task.blob_key(&self.key_prefix)) {
            (Some(path), Some(key)) => (path.to_path_buf(), key),
            _ => return Err(PipelineError::Generation("no audio file recorded".to_string())),
        };
        let body = tokio::fs::read(&audio_path)
            .await
            .map_err(|e| PipelineError::Upload(format!("cannot read {}: {}", audio_path.display(), e)))?;
        let url = self.blob.put(&key, body, content_type_for(&audio_path)).await?;
        advance(reached, ItemStage::Uploaded);

        self.store.mark_artifact(&item.uuid, &url, Utc::now()).await?;
        advance(reached, ItemStage::StoreUpdated);

        Ok(url)
    }
}

fn advance(reached: &mut ItemStage, next: ItemStage) {
    debug!("Stage {} -> {}", reached.as_str(), next.as_str());
    *reached = next;
}
