use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

// Use the interfaces crate for core types
pub use interfaces::defs::{
    ConversationStyleConfig, FeedItem, GeneratedArtifact, GenerationRequest, PodcastConfig, RawFeedRecord,
    ScanFilter, ScanPage, TtsBackend, TtsVoiceConfig, MAX_SCAN_PAGE,
};
pub use interfaces::error::{PipelineError, Result};
pub use interfaces::traits::{ArtifactGenerator, BlobStore, FeedSource, ItemStore};

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub base_url: String,
    pub user_agent: String,
    pub version: String,
    pub topic: String,
    pub source: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    /// When set, every fetched page is also written here as pretty JSON.
    pub raw_dump_path: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.perplexity.ai/rest/discover/feed".to_string(),
            user_agent: "ReplitClient/1.0".to_string(),
            version: "2.18".to_string(),
            topic: "top".to_string(),
            source: "default".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 2,
            raw_dump_path: None,
        }
    }
}

/// Tunables for one podcast generation cycle.
#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// Items untouched for longer than this are eligible.
    pub cutoff_age: chrono::Duration,
    pub batch_limit: usize,
    pub max_concurrent: usize,
    /// Pause after each item before its slot is released.
    pub throttle: Duration,
    pub item_timeout: Duration,
    pub work_dir: PathBuf,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            cutoff_age: chrono::Duration::days(5),
            batch_limit: 100,
            max_concurrent: 4,
            throttle: Duration::from_secs(50),
            item_timeout: Duration::from_secs(30 * 60),
            work_dir: PathBuf::from("data"),
        }
    }
}

impl CycleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_limit == 0 {
            return Err(PipelineError::Configuration("batch_limit must be positive".to_string()));
        }
        if self.max_concurrent == 0 {
            return Err(PipelineError::Configuration("max_concurrent must be positive".to_string()));
        }
        if self.cutoff_age < chrono::Duration::zero() {
            return Err(PipelineError::Configuration("cutoff age cannot be negative".to_string()));
        }
        if Utc::now().checked_sub_signed(self.cutoff_age).is_none() {
            return Err(PipelineError::Configuration(format!("cutoff age {} is out of range", self.cutoff_age)));
        }
        if self.item_timeout.is_zero() {
            return Err(PipelineError::Configuration("item timeout must be positive".to_string()));
        }
        Ok(())
    }
}

/// Cutoff age from a whole number of hours. Values chrono cannot represent
/// are a configuration error rather than a panic.
pub fn cutoff_from_hours(hours: i64) -> Result<chrono::Duration> {
    chrono::Duration::try_hours(hours)
        .ok_or_else(|| PipelineError::Configuration(format!("cutoff of {} hours is out of range", hours)))
}

/// Result of one ingestion call. `items` holds every parsed record,
/// including the ones that were already stored.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub saved: usize,
    /// Feed audio files copied into the blob store.
    pub uploaded: usize,
    pub items: Vec<FeedItem>,
}

/// Pipeline stages an item passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStage {
    Selected,
    DocumentBuilt,
    AudioGenerated,
    Uploaded,
    StoreUpdated,
}

impl ItemStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStage::Selected => "selected",
            ItemStage::DocumentBuilt => "document_built",
            ItemStage::AudioGenerated => "audio_generated",
            ItemStage::Uploaded => "uploaded",
            ItemStage::StoreUpdated => "store_updated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemState {
    Done,
    Failed,
}

/// Terminal report of one item's pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub item_id: String,
    pub state: ItemState,
    /// Last stage the item completed.
    pub reached: ItemStage,
    pub artifact_url: Option<String>,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl ItemOutcome {
    pub fn done(item_id: String, artifact_url: String) -> Self {
        Self {
            item_id,
            state: ItemState::Done,
            reached: ItemStage::StoreUpdated,
            artifact_url: Some(artifact_url),
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(item_id: String, reached: ItemStage, error: impl Into<String>) -> Self {
        Self {
            item_id,
            state: ItemState::Failed,
            reached,
            artifact_url: None,
            error: Some(error.into()),
            finished_at: Utc::now(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == ItemState::Done
    }
}
