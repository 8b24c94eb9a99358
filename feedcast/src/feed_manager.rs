use crate::types::{FeedItem, ItemStore, PipelineError, Result, ScanFilter, ScanPage, MAX_SCAN_PAGE};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

const ITEM_COLUMNS: &str = "uuid, slug, title, summary, first_answer, description, bullet_summary_preload, \
     images, last_query_datetime, audio_url, original_audio_url, artifact_url, created_at";

/// Postgres-backed item table.
pub struct PgItemStore {
    db: PgPool,
}

impl PgItemStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(store_error)?;

        Ok(Self { db })
    }

    /// Apply pending migrations from `migrations/`. Idempotent.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .map_err(|e| PipelineError::Store(format!("migration failed: {}", e)))?;
        info!("Item store schema is up to date");
        Ok(())
    }
}

fn store_error(e: sqlx::Error) -> PipelineError {
    PipelineError::Store(e.to_string())
}

fn row_to_item(row: &PgRow) -> Result<FeedItem> {
    let images: Json<Vec<String>> = row.try_get("images").map_err(store_error)?;

    Ok(FeedItem {
        uuid: row.try_get("uuid").map_err(store_error)?,
        slug: row.try_get("slug").map_err(store_error)?,
        title: row.try_get("title").map_err(store_error)?,
        summary: row.try_get("summary").map_err(store_error)?,
        first_answer: row.try_get("first_answer").map_err(store_error)?,
        description: row.try_get("description").map_err(store_error)?,
        bullet_summary_preload: row.try_get("bullet_summary_preload").map_err(store_error)?,
        images: images.0,
        last_query_datetime: row.try_get("last_query_datetime").map_err(store_error)?,
        audio_url: row.try_get("audio_url").map_err(store_error)?,
        original_audio_url: row.try_get("original_audio_url").map_err(store_error)?,
        artifact_url: row.try_get("artifact_url").map_err(store_error)?,
        created_at: row.try_get("created_at").map_err(store_error)?,
    })
}

#[async_trait]
impl ItemStore for PgItemStore {
    async fn get(&self, id: &str) -> Result<Option<FeedItem>> {
        let query = format!("SELECT {} FROM feed_items WHERE uuid = $1", ITEM_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(store_error)?;

        row.as_ref().map(row_to_item).transpose()
    }

    async fn insert_if_absent(&self, item: &FeedItem) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO feed_items
                (uuid, slug, title, summary, first_answer, description, bullet_summary_preload,
                 images, last_query_datetime, audio_url, original_audio_url, artifact_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (uuid) DO NOTHING
            "#,
        )
        .bind(&item.uuid)
        .bind(&item.slug)
        .bind(&item.title)
        .bind(&item.summary)
        .bind(&item.first_answer)
        .bind(&item.description)
        .bind(&item.bullet_summary_preload)
        .bind(Json(&item.images))
        .bind(item.last_query_datetime)
        .bind(&item.audio_url)
        .bind(&item.original_audio_url)
        .bind(&item.artifact_url)
        .execute(&self.db)
        .await
        .map_err(store_error)?;

        let written = result.rows_affected() > 0;
        if !written {
            debug!(item_id = %item.uuid, "Item already stored");
        }
        Ok(written)
    }

    async fn scan_page(&self, filter: &ScanFilter, cursor: Option<&str>, page_size: usize) -> Result<ScanPage> {
        let page_size = page_size.min(MAX_SCAN_PAGE);
        if page_size == 0 {
            return Ok(ScanPage::default());
        }

        let query = format!(
            r#"
            SELECT {}
            FROM feed_items
            WHERE ($1::TEXT IS NULL OR uuid > $1)
              AND ($2::TIMESTAMPTZ IS NULL OR last_query_datetime IS NULL OR last_query_datetime < $2)
              AND ($3::TIMESTAMPTZ IS NULL OR last_query_datetime > $3)
              AND (NOT $4::BOOLEAN OR artifact_url IS NULL OR btrim(artifact_url) = '')
            ORDER BY uuid
            LIMIT $5
            "#,
            ITEM_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(cursor)
            .bind(filter.last_query_before)
            .bind(filter.last_query_after)
            .bind(filter.blank_artifact_only)
            .bind(page_size as i64)
            .fetch_all(&self.db)
            .await
            .map_err(store_error)?;

        let items = rows.iter().map(row_to_item).collect::<Result<Vec<_>>>()?;
        let next_cursor = if items.len() == page_size {
            items.last().map(|item| item.uuid.clone())
        } else {
            None
        };

        debug!("Scanned {} items (more: {})", items.len(), next_cursor.is_some());
        Ok(ScanPage { items, next_cursor })
    }

    async fn mark_artifact(&self, id: &str, artifact_url: &str, touched_at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE feed_items
            SET artifact_url = $2, last_query_datetime = $3
            WHERE uuid = $1
            "#,
        )
        .bind(id)
        .bind(artifact_url)
        .bind(touched_at)
        .execute(&self.db)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::Store(format!("item {} not found", id)));
        }

        debug!(item_id = %id, "Recorded artifact location");
        Ok(())
    }
}
