#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feedcast::{
    ArtifactGenerator, BlobStore, CycleConfig, FeedItem, FeedSource, GeneratedArtifact, GenerationRequest,
    ItemStore, MemoryItemStore, PipelineError, RawFeedRecord, Result, ScanFilter, ScanPage,
};
use serde_json::json;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).with_test_writer().try_init();
}

pub fn temp_work_dir() -> PathBuf {
    std::env::temp_dir().join(format!("feedcast-test-{}", uuid::Uuid::new_v4()))
}

pub fn cycle_config(work_dir: PathBuf) -> CycleConfig {
    CycleConfig {
        throttle: Duration::ZERO,
        item_timeout: Duration::from_secs(10),
        work_dir,
        ..CycleConfig::default()
    }
}

pub fn raw_record(id: &str) -> RawFeedRecord {
    json!({
        "uuid": id,
        "slug": format!("slug-{}", id),
        "title": format!("Story {}", id),
        "summary": "A short summary",
        "bullet_summary_preload": "- point one\n- point two",
        "featured_images": [{"image": format!("https://img.example/{}.jpg", id)}]
    })
}

pub fn stored_item(id: &str, last_query: Option<DateTime<Utc>>) -> FeedItem {
    FeedItem {
        uuid: id.to_string(),
        title: format!("Story {}", id),
        bullet_summary_preload: "- point one\n- point two".to_string(),
        images: vec![format!("https://img.example/{}.jpg", id)],
        last_query_datetime: last_query,
        ..Default::default()
    }
}

/// Serves slices of a fixed record list.
pub struct StaticFeedSource {
    records: Vec<RawFeedRecord>,
    pub calls: AtomicUsize,
}

impl StaticFeedSource {
    pub fn new(records: Vec<RawFeedRecord>) -> Self {
        Self { records, calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl FeedSource for StaticFeedSource {
    fn source_name(&self) -> String {
        "static test feed".to_string()
    }

    async fn fetch_page(&self, limit: usize, offset: usize) -> Result<Vec<RawFeedRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.iter().skip(offset).take(limit).cloned().collect())
    }
}

pub struct FailingFeedSource;

#[async_trait]
impl FeedSource for FailingFeedSource {
    fn source_name(&self) -> String {
        "failing test feed".to_string()
    }

    async fn fetch_page(&self, _limit: usize, _offset: usize) -> Result<Vec<RawFeedRecord>> {
        Err(PipelineError::SourceFetch("blocked by anti-bot protection (HTTP 403)".to_string()))
    }
}

fn id_set(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// Memory store whose inserts or artifact updates fail for chosen identifiers.
pub struct FlakyStore {
    pub inner: MemoryItemStore,
    failing_inserts: HashSet<String>,
    failing_marks: HashSet<String>,
}

impl FlakyStore {
    pub fn new(failing: &[&str]) -> Self {
        Self { inner: MemoryItemStore::new(), failing_inserts: id_set(failing), failing_marks: HashSet::new() }
    }

    pub fn rejecting_marks(failing: &[&str]) -> Self {
        Self { inner: MemoryItemStore::new(), failing_inserts: HashSet::new(), failing_marks: id_set(failing) }
    }
}

#[async_trait]
impl ItemStore for FlakyStore {
    async fn get(&self, id: &str) -> Result<Option<FeedItem>> {
        self.inner.get(id).await
    }

    async fn insert_if_absent(&self, item: &FeedItem) -> Result<bool> {
        if self.failing_inserts.contains(&item.uuid) {
            return Err(PipelineError::Store(format!("write rejected for {}", item.uuid)));
        }
        self.inner.insert_if_absent(item).await
    }

    async fn scan_page(&self, filter: &ScanFilter, cursor: Option<&str>, page_size: usize) -> Result<ScanPage> {
        self.inner.scan_page(filter, cursor, page_size).await
    }

    async fn mark_artifact(&self, id: &str, artifact_url: &str, touched_at: DateTime<Utc>) -> Result<()> {
        if self.failing_marks.contains(id) {
            return Err(PipelineError::Store(format!("update rejected for {}", id)));
        }
        self.inner.mark_artifact(id, artifact_url, touched_at).await
    }
}

/// Writes `{work}/audio/{id}.mp3` plus a transcript, optionally slowly or
/// failing for chosen identifiers. Tracks peak concurrency.
pub struct FakeGenerator {
    failing: HashSet<String>,
    delay: Duration,
    pub calls: AtomicUsize,
    active: AtomicUsize,
    pub peak_active: AtomicUsize,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self::failing_for(&[])
    }

    pub fn failing_for(ids: &[&str]) -> Self {
        Self {
            failing: id_set(ids),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArtifactGenerator for FakeGenerator {
    fn backend_name(&self) -> String {
        "fake".to_string()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _active = ActiveGuard(&self.active);
        self.peak_active.fetch_max(now_active, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let document = request
            .documents
            .first()
            .ok_or_else(|| PipelineError::Generation("no document".to_string()))?;
        if !document.exists() {
            return Err(PipelineError::Generation(format!("missing document {}", document.display())));
        }
        if self.failing.contains(&request.item_id) {
            return Err(PipelineError::Generation(format!("synthesis failed for {}", request.item_id)));
        }

        let work = request.scratch_dir.parent().map(PathBuf::from).unwrap_or_default();
        let audio_path = work.join("audio").join(format!("{}.mp3", request.item_id));
        let transcript_path = work.join("transcripts").join(format!("transcript_{}.txt", request.item_id));
        tokio::fs::write(&audio_path, b"ID3 fake audio").await?;
        tokio::fs::write(&transcript_path, b"Person1: hi\nPerson2: hello").await?;

        Ok(GeneratedArtifact { audio_path, transcript_path: Some(transcript_path) })
    }
}

/// Keeps every upload in memory.
pub struct RecordingBlobStore {
    fail: bool,
    pub uploads: Mutex<Vec<(String, usize, String)>>,
}

impl RecordingBlobStore {
    pub fn new() -> Self {
        Self { fail: false, uploads: Mutex::new(Vec::new()) }
    }

    pub fn failing() -> Self {
        Self { fail: true, uploads: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String> {
        if self.fail {
            return Err(PipelineError::Upload(format!("PUT {} returned HTTP 503", key)));
        }
        self.uploads
            .lock()
            .unwrap()
            .push((key.to_string(), body.len(), content_type.to_string()));
        Ok(self.public_url(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://test-bucket/{}", key)
    }
}
