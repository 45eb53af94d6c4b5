use super::schema::Database;
use super::types::{Source, SourceDbRow, SourceStatus, StoreError};
use crate::util::strip_control_chars;

impl Database {
    // ========================================================================
    // Source Operations
    // ========================================================================

    /// Add a source, or refresh its name and homepage if the feed URL is
    /// already registered. Returns the source id.
    ///
    /// Status and failure count are left alone on conflict so re-adding a
    /// disabled source does not silently re-enable it.
    pub async fn insert_source(&self, source: &Source) -> Result<i64, StoreError> {
        if !source.is_valid() {
            return Err(StoreError::Invalid {
                kind: "source",
                reason: "a source needs a name and a feed URL".into(),
            });
        }

        let name = strip_control_chars(source.name.trim()).into_owned();

        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO sources (name, homepage_url, feed_url, status, failed_get_count)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(feed_url) DO UPDATE SET
                name = excluded.name,
                homepage_url = excluded.homepage_url
            RETURNING id
        "#,
        )
        .bind(&name)
        .bind(source.homepage_url.trim())
        .bind(source.feed_url.trim())
        .bind(source.status.as_i64())
        .bind(i64::from(source.failed_get_count))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    pub async fn get_source(&self, id: i64) -> Result<Option<Source>, StoreError> {
        let row: Option<SourceDbRow> = sqlx::query_as(
            "SELECT id, name, homepage_url, feed_url, status, failed_get_count FROM sources WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SourceDbRow::into_source))
    }

    /// New and active sources, in id order.
    pub async fn get_active_sources(&self) -> Result<Vec<Source>, StoreError> {
        let rows: Vec<SourceDbRow> = sqlx::query_as(
            r#"
            SELECT id, name, homepage_url, feed_url, status, failed_get_count
            FROM sources
            WHERE status IN (?, ?)
            ORDER BY id
        "#,
        )
        .bind(SourceStatus::New.as_i64())
        .bind(SourceStatus::Active.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SourceDbRow::into_source).collect())
    }

    pub async fn save_source_health(&self, source: &Source) -> Result<(), StoreError> {
        sqlx::query("UPDATE sources SET status = ?, failed_get_count = ? WHERE id = ?")
            .bind(source.status.as_i64())
            .bind(i64::from(source.failed_get_count))
            .bind(source.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Manually change a source's status, e.g. to re-enable one that
    /// stopped responding. Resets the failure count.
    pub async fn set_source_status(&self, id: i64, status: SourceStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE sources SET status = ?, failed_get_count = 0 WHERE id = ?")
            .bind(status.as_i64())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get_source() {
        let db = test_db().await;
        let id = db
            .insert_source(&Source::new("News", "https://news.example", "https://news.example/rss"))
            .await
            .unwrap();

        let source = db.get_source(id).await.unwrap().unwrap();
        assert_eq!(source.name, "News");
        assert_eq!(source.status, SourceStatus::New);
        assert_eq!(source.failed_get_count, 0);
        assert!(source.candidate_items.is_empty());
    }

    #[tokio::test]
    async fn test_insert_invalid_source_rejected() {
        let db = test_db().await;
        let result = db.insert_source(&Source::new("", "h", "https://x/rss")).await;
        assert!(matches!(result, Err(StoreError::Invalid { kind: "source", .. })));
    }

    #[tokio::test]
    async fn test_duplicate_feed_url_keeps_health() {
        let db = test_db().await;
        let first = Source::new("Old", "https://h", "https://x/rss");
        let id = db.insert_source(&first).await.unwrap();

        let mut disabled = db.get_source(id).await.unwrap().unwrap();
        disabled.status = SourceStatus::NotResponding;
        disabled.failed_get_count = 3;
        db.save_source_health(&disabled).await.unwrap();

        let again = db
            .insert_source(&Source::new("New", "https://h2", "https://x/rss"))
            .await
            .unwrap();
        assert_eq!(id, again);

        let stored = db.get_source(id).await.unwrap().unwrap();
        assert_eq!(stored.name, "New");
        assert_eq!(stored.status, SourceStatus::NotResponding);
        assert_eq!(stored.failed_get_count, 3);
    }

    #[tokio::test]
    async fn test_active_sources_exclude_disabled() {
        let db = test_db().await;
        let a = db.insert_source(&Source::new("A", "", "https://a/rss")).await.unwrap();
        let b = db.insert_source(&Source::new("B", "", "https://b/rss")).await.unwrap();
        let c = db.insert_source(&Source::new("C", "", "https://c/rss")).await.unwrap();
        db.set_source_status(b, SourceStatus::Active).await.unwrap();
        db.set_source_status(c, SourceStatus::NotResponding).await.unwrap();

        let ids: Vec<_> = db
            .get_active_sources()
            .await
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![a, b]);

        db.set_source_status(c, SourceStatus::Active).await.unwrap();
        assert_eq!(db.get_active_sources().await.unwrap().len(), 3);
    }
}
