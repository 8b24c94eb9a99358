use crate::parser::parse_records;
use crate::replication::AudioReplicator;
use crate::types::{FeedItem, FeedSource, IngestOutcome, ItemStore, PipelineError, Result, ScanFilter, MAX_SCAN_PAGE};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Pulls pages from the feed source and stores the items it has not seen.
pub struct IngestionOrchestrator {
    source: Arc<dyn FeedSource>,
    store: Arc<dyn ItemStore>,
    replicator: Option<AudioReplicator>,
}

impl IngestionOrchestrator {
    pub fn new(source: Arc<dyn FeedSource>, store: Arc<dyn ItemStore>) -> Self {
        Self { source, store, replicator: None }
    }

    /// Copy each new item's feed audio into the blob store before saving it.
    pub fn with_audio_replication(mut self, replicator: AudioReplicator) -> Self {
        self.replicator = Some(replicator);
        self
    }

    /// Fetch one page and insert the new items. A failing source fails the
    /// whole call; a failing write or audio copy only affects that item.
    pub async fn ingest(&self, limit: usize, offset: usize) -> Result<IngestOutcome> {
        if limit == 0 {
            return Err(PipelineError::Configuration("limit must be positive".to_string()));
        }

        let records = self.source.fetch_page(limit, offset).await?;
        let mut items = parse_records(&records);
        info!("Fetched {} records from {}", items.len(), self.source.source_name());

        let mut saved = 0;
        let mut uploaded = 0;
        for item in &mut items {
            if item.uuid.is_empty() {
                warn!(title = %item.title, "Skipping record without an identifier");
                continue;
            }

            if self.replicate_audio(item).await {
                uploaded += 1;
            }

            match self.store.insert_if_absent(item).await {
                Ok(true) => {
                    debug!(item_id = %item.uuid, "Saved new item");
                    saved += 1;
                }
                Ok(false) => debug!(item_id = %item.uuid, "Item already known"),
                Err(e) => error!(item_id = %item.uuid, kind = e.kind(), "Failed to save item: {}", e),
            }
        }

        info!(
            "Saved {}/{} items, replicated {} audio files (limit={}, offset={})",
            saved,
            items.len(),
            uploaded,
            limit,
            offset
        );
        Ok(IngestOutcome { saved, uploaded, items })
    }

    /// Point `item.audio_url` at a copy in the blob store, keeping the feed's
    /// URL in `original_audio_url`. Items already stored are left alone, and
    /// a failed copy keeps the feed's URL. Returns whether a file was uploaded.
    async fn replicate_audio(&self, item: &mut FeedItem) -> bool {
        let (Some(replicator), Some(source_url)) = (&self.replicator, item.audio_url.clone()) else {
            return false;
        };

        match self.store.get(&item.uuid).await {
            Ok(Some(_)) => return false,
            Ok(None) => {}
            Err(e) => warn!(item_id = %item.uuid, "Could not check for a stored copy: {}", e),
        }

        match replicator.replicate(&source_url).await {
            Ok(url) => {
                item.original_audio_url = Some(source_url);
                item.audio_url = Some(url);
                true
            }
            Err(e) => {
                warn!(item_id = %item.uuid, kind = e.kind(), "Keeping feed audio URL: {}", e);
                false
            }
        }
    }

    /// Stored items matching `filter`, following the cursor across pages.
    pub async fn backlog(&self, filter: &ScanFilter, limit: usize) -> Result<Vec<FeedItem>> {
        scan_filtered(self.store.as_ref(), filter, limit).await
    }
}

/// Up to `limit` matching items in identifier order, however many store
/// pages that takes.
pub async fn scan_filtered(store: &dyn ItemStore, filter: &ScanFilter, limit: usize) -> Result<Vec<FeedItem>> {
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;

    while items.len() < limit {
        let wanted = (limit - items.len()).min(MAX_SCAN_PAGE);
        let page = store.scan_page(filter, cursor.as_deref(), wanted).await?;
        items.extend(page.items);

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    items.truncate(limit);
    Ok(items)
}
