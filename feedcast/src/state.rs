use crate::types::{FeedItem, ItemStore, PipelineError, Result, ScanFilter, ScanPage, MAX_SCAN_PAGE};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::ops::Bound;
use tokio::sync::RwLock;

/// In-process item table with the same ordering and paging rules as
/// `PgItemStore`. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryItemStore {
    items: RwLock<BTreeMap<String, FeedItem>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Insert or replace unconditionally. Handy for seeding.
    pub async fn upsert(&self, item: FeedItem) {
        self.items.write().await.insert(item.uuid.clone(), item);
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn get(&self, id: &str) -> Result<Option<FeedItem>> {
        Ok(self.items.read().await.get(id).cloned())
    }

    async fn insert_if_absent(&self, item: &FeedItem) -> Result<bool> {
        let mut items = self.items.write().await;
        if items.contains_key(&item.uuid) {
            return Ok(false);
        }

        let mut stored = item.clone();
        stored.created_at.get_or_insert_with(Utc::now);
        items.insert(stored.uuid.clone(), stored);
        Ok(true)
    }

    async fn scan_page(&self, filter: &ScanFilter, cursor: Option<&str>, page_size: usize) -> Result<ScanPage> {
        let page_size = page_size.min(MAX_SCAN_PAGE);
        if page_size == 0 {
            return Ok(ScanPage::default());
        }

        let items = self.items.read().await;
        let lower = match cursor {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Unbounded,
        };

        let page: Vec<FeedItem> = items
            .range((lower, Bound::Unbounded))
            .map(|(_, item)| item)
            .filter(|item| filter.matches(item))
            .take(page_size)
            .cloned()
            .collect();

        let next_cursor = if page.len() == page_size {
            page.last().map(|item| item.uuid.clone())
        } else {
            None
        };

        Ok(ScanPage { items: page, next_cursor })
    }

    async fn mark_artifact(&self, id: &str, artifact_url: &str, touched_at: DateTime<Utc>) -> Result<()> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(id)
            .ok_or_else(|| PipelineError::Store(format!("item {} not found", id)))?;

        item.artifact_url = Some(artifact_url.to_string());
        item.last_query_datetime = Some(touched_at);
        Ok(())
    }
}
