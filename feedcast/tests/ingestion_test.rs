mod common;

use common::*;
use feedcast::{
    FeedItem, IngestionOrchestrator, ItemStore, MemoryItemStore, PipelineError, Result, ScanFilter, MAX_SCAN_PAGE,
};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn test_known_identifier_is_not_saved_again() -> Result<()> {
    init_tracing();
    let store = Arc::new(MemoryItemStore::new());
    store.insert_if_absent(&stored_item("b", None)).await?;

    let source = Arc::new(StaticFeedSource::new(vec![raw_record("a"), raw_record("b"), raw_record("c")]));
    let orchestrator = IngestionOrchestrator::new(source, store.clone());

    let outcome = orchestrator.ingest(10, 0).await?;

    assert_eq!(outcome.saved, 2);
    assert_eq!(outcome.items.len(), 3);
    assert_eq!(store.len().await, 3);
    let a = store.get("a").await?.expect("a stored");
    assert_eq!(a.title, "Story a");
    assert_eq!(a.images, vec!["https://img.example/a.jpg"]);
    Ok(())
}

#[tokio::test]
async fn test_repeated_ingestion_is_idempotent() -> Result<()> {
    let store = Arc::new(MemoryItemStore::new());
    let records = (0..5).map(|n| raw_record(&format!("item-{}", n))).collect();
    let orchestrator = IngestionOrchestrator::new(Arc::new(StaticFeedSource::new(records)), store.clone());

    let first = orchestrator.ingest(5, 0).await?;
    let second = orchestrator.ingest(5, 0).await?;
    let overlapping = orchestrator.ingest(3, 2).await?;

    assert_eq!(first.saved, 5);
    assert_eq!(second.saved, 0);
    assert_eq!(second.items.len(), 5);
    assert_eq!(overlapping.saved, 0);

    let all = orchestrator.backlog(&ScanFilter::default(), 100).await?;
    let unique: HashSet<&str> = all.iter().map(|i| i.uuid.as_str()).collect();
    assert_eq!(all.len(), 5);
    assert_eq!(unique.len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_duplicates_within_one_page_are_saved_once() -> Result<()> {
    let store = Arc::new(MemoryItemStore::new());
    let source = Arc::new(StaticFeedSource::new(vec![raw_record("a"), raw_record("a"), raw_record("b")]));
    let orchestrator = IngestionOrchestrator::new(source, store.clone());

    let outcome = orchestrator.ingest(10, 0).await?;

    assert_eq!(outcome.saved, 2);
    assert_eq!(outcome.items.len(), 3);
    assert_eq!(store.len().await, 2);
    Ok(())
}

#[tokio::test]
async fn test_source_failure_fails_the_call_and_writes_nothing() {
    let store = Arc::new(MemoryItemStore::new());
    let orchestrator = IngestionOrchestrator::new(Arc::new(FailingFeedSource), store.clone());

    let result = orchestrator.ingest(10, 0).await;

    assert!(matches!(result, Err(PipelineError::SourceFetch(_))));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_store_failure_on_one_item_does_not_abort_the_batch() -> Result<()> {
    let store = Arc::new(FlakyStore::new(&["b"]));
    let source = Arc::new(StaticFeedSource::new(vec![raw_record("a"), raw_record("b"), raw_record("c")]));
    let orchestrator = IngestionOrchestrator::new(source, store.clone());

    let outcome = orchestrator.ingest(10, 0).await?;

    assert_eq!(outcome.saved, 2);
    assert_eq!(outcome.items.len(), 3);
    assert!(store.get("b").await?.is_none());
    assert!(store.get("c").await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_records_without_identifier_are_returned_but_not_stored() -> Result<()> {
    let store = Arc::new(MemoryItemStore::new());
    let mut nameless = raw_record("x");
    nameless.as_object_mut().unwrap().remove("uuid");
    let source = Arc::new(StaticFeedSource::new(vec![nameless, raw_record("a")]));
    let orchestrator = IngestionOrchestrator::new(source, store.clone());

    let outcome = orchestrator.ingest(10, 0).await?;

    assert_eq!(outcome.saved, 1);
    assert_eq!(outcome.items.len(), 2);
    assert_eq!(outcome.items[0].uuid, "");
    assert_eq!(store.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_zero_limit_is_rejected_before_fetching() {
    let source = Arc::new(StaticFeedSource::new(vec![raw_record("a")]));
    let orchestrator = IngestionOrchestrator::new(source.clone(), Arc::new(MemoryItemStore::new()));

    let result = orchestrator.ingest(0, 0).await;

    assert!(matches!(result, Err(PipelineError::Configuration(_))));
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_backlog_follows_cursor_past_page_boundary() -> Result<()> {
    let store = Arc::new(MemoryItemStore::new());
    let total = MAX_SCAN_PAGE * 2 + 500;
    for n in 0..total {
        let mut item = FeedItem { uuid: format!("item-{:05}", n), ..Default::default() };
        if n % 4 == 0 {
            item.artifact_url = Some(format!("https://test-bucket/audio/{}.mp3", n));
        }
        store.upsert(item).await;
    }
    let orchestrator = IngestionOrchestrator::new(Arc::new(StaticFeedSource::new(vec![])), store.clone());

    let filter = ScanFilter { blank_artifact_only: true, ..Default::default() };
    let blank = orchestrator.backlog(&filter, usize::MAX).await?;
    assert_eq!(blank.len(), total - total.div_ceil(4));
    assert!(blank.iter().all(|item| !item.has_artifact()));
    assert!(blank.windows(2).all(|pair| pair[0].uuid < pair[1].uuid));

    let limited = orchestrator.backlog(&filter, 1500).await?;
    assert_eq!(limited.len(), 1500);
    assert_eq!(limited[..], blank[..1500]);
    Ok(())
}

#[tokio::test]
async fn test_backlog_combines_timestamp_and_artifact_filters() -> Result<()> {
    let store = Arc::new(MemoryItemStore::new());
    let now = chrono::Utc::now();
    store.upsert(stored_item("recent", Some(now - chrono::Duration::minutes(5)))).await;
    store.upsert(stored_item("old", Some(now - chrono::Duration::days(3)))).await;
    store.upsert(stored_item("never", None)).await;
    let mut done = stored_item("recent-done", Some(now - chrono::Duration::minutes(1)));
    done.artifact_url = Some("https://test-bucket/audio/recent-done.mp3".to_string());
    store.upsert(done).await;

    let orchestrator = IngestionOrchestrator::new(Arc::new(StaticFeedSource::new(vec![])), store);
    let filter = ScanFilter {
        last_query_after: Some(now - chrono::Duration::hours(1)),
        blank_artifact_only: true,
        ..Default::default()
    };

    let items = orchestrator.backlog(&filter, 100).await?;
    let ids: Vec<&str> = items.iter().map(|i| i.uuid.as_str()).collect();
    assert_eq!(ids, vec!["recent"]);
    Ok(())
}
