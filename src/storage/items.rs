use super::schema::Database;
use super::types::{StoreError, StoredItem, Tag};
use crate::feed::CandidateItem;
use crate::util::strip_control_chars;

impl Database {
    // ========================================================================
    // Item Operations
    // ========================================================================

    pub async fn item_exists_for_url(&self, content_url: &str) -> Result<bool, StoreError> {
        let row: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM items WHERE content_url = ?)")
                .bind(content_url)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    /// Insert an item, or update the stored row with the same content URL.
    pub async fn save_item(&self, item: &CandidateItem) -> Result<i64, StoreError> {
        if !item.is_valid() {
            return Err(StoreError::Invalid {
                kind: "item",
                reason: format!("{} is missing a title or description", item.content_url),
            });
        }

        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO items (
                source_id, guid, title, description, content_url, publication_time,
                import_time, category_id, image_filename, tags, declared_categories
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_url) DO UPDATE SET
                guid = excluded.guid,
                title = excluded.title,
                description = excluded.description,
                publication_time = excluded.publication_time,
                category_id = excluded.category_id,
                image_filename = COALESCE(excluded.image_filename, items.image_filename),
                tags = excluded.tags,
                declared_categories = excluded.declared_categories
            RETURNING id
        "#,
        )
        .bind(item.source_id)
        .bind(&item.feed_data.guid)
        .bind(strip_control_chars(item.title.trim()).into_owned())
        .bind(&item.description)
        .bind(item.content_url.as_str())
        .bind(item.publication_time.timestamp())
        .bind(item.import_time.timestamp())
        .bind(item.category_id())
        .bind(item.image_filename.as_deref())
        .bind(Tag::join(&item.tags))
        .bind(item.feed_data.categories.join(", "))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    pub async fn get_item_by_url(&self, content_url: &str) -> Result<Option<StoredItem>, StoreError> {
        let item = sqlx::query_as::<_, StoredItem>(
            r#"
            SELECT id, source_id, guid, title, description, content_url, publication_time,
                   import_time, category_id, image_filename, tags, declared_categories
            FROM items
            WHERE content_url = ?
        "#,
        )
        .bind(content_url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    /// Items for a source, newest first.
    pub async fn get_items_for_source(&self, source_id: i64) -> Result<Vec<StoredItem>, StoreError> {
        let items = sqlx::query_as::<_, StoredItem>(
            r#"
            SELECT id, source_id, guid, title, description, content_url, publication_time,
                   import_time, category_id, image_filename, tags, declared_categories
            FROM items
            WHERE source_id = ?
            ORDER BY publication_time DESC, id DESC
        "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }
}
