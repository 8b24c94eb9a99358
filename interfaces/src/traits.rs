use crate::defs::{FeedItem, GeneratedArtifact, GenerationRequest, RawFeedRecord, ScanFilter, ScanPage};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Remote source of paged feed records.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Human-readable name for this source
    fn source_name(&self) -> String;

    /// Fetch exactly one page of up to `limit` raw records starting at `offset`.
    async fn fetch_page(&self, limit: usize, offset: usize) -> Result<Vec<RawFeedRecord>>;
}

/// Durable key-value table of feed items keyed by identifier.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<FeedItem>>;

    /// Write `item` unless its identifier is already present.
    /// Returns `true` only when a row was written.
    async fn insert_if_absent(&self, item: &FeedItem) -> Result<bool>;

    /// Return up to `page_size` matching items (capped at `MAX_SCAN_PAGE`)
    /// whose identifiers sort after `cursor`.
    async fn scan_page(&self, filter: &ScanFilter, cursor: Option<&str>, page_size: usize) -> Result<ScanPage>;

    /// Set the artifact location and refresh `last_query_datetime`.
    async fn mark_artifact(&self, id: &str, artifact_url: &str, touched_at: DateTime<Utc>) -> Result<()>;
}

/// Key-addressed binary storage with public retrieval URLs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `body` under `key` and return its public URL.
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String>;

    fn public_url(&self, key: &str) -> String;
}

/// Turns source documents into a spoken-dialogue audio file.
#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    fn backend_name(&self) -> String;

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedArtifact>;
}
