use crate::types::{FeedItem, RawFeedRecord};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::debug;

/// Turn one raw feed record into a `FeedItem`. Never fails: absent or
/// non-string fields come out empty.
pub fn parse_record(record: &RawFeedRecord) -> FeedItem {
    let text = |key: &str| record.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

    let images = record
        .get("featured_images")
        .and_then(Value::as_array)
        .map(|images| {
            images
                .iter()
                .filter_map(|image| image.get("image").and_then(Value::as_str))
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    FeedItem {
        uuid: text("uuid"),
        slug: text("slug"),
        title: text("title"),
        summary: text("summary"),
        first_answer: text("first_answer"),
        description: text("description"),
        bullet_summary_preload: text("bullet_summary_preload"),
        images,
        last_query_datetime: record
            .get("last_query_datetime")
            .and_then(Value::as_str)
            .and_then(parse_timestamp),
        audio_url: Some(text("audio_url")).filter(|url| !url.trim().is_empty()),
        original_audio_url: None,
        artifact_url: None,
        created_at: None,
    }
}

pub fn parse_records(records: &[RawFeedRecord]) -> Vec<FeedItem> {
    let items: Vec<FeedItem> = records.iter().map(parse_record).collect();
    debug!("Parsed {} feed records", items.len());
    items
}

/// Accepts RFC 3339 and the naive ISO form (assumed UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
