use super::schema::Database;
use super::types::{Category, CategoryDbRow, StoreError, Tag};
use crate::util::strip_control_chars;

impl Database {
    // ========================================================================
    // Category Operations
    // ========================================================================

    /// Sanitize and validate a category name.
    ///
    /// Strips control characters, trims whitespace, and rejects
    /// empty/whitespace-only names.
    fn sanitize_category_name(name: &str) -> Result<String, StoreError> {
        let sanitized = strip_control_chars(name);
        let trimmed = sanitized.trim();
        if trimmed.is_empty() {
            return Err(StoreError::Invalid {
                kind: "category",
                reason: "name cannot be empty or whitespace-only".into(),
            });
        }
        Ok(trimmed.to_owned())
    }

    /// Create a category, or replace the tags, parent and status of the one
    /// with the same name. Returns the category id; the id on `category` is
    /// ignored.
    pub async fn insert_category(&self, category: &Category) -> Result<i64, StoreError> {
        let clean_name = Self::sanitize_category_name(&category.name)?;

        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO categories (name, parent_id, status, tags)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                parent_id = excluded.parent_id,
                status = excluded.status,
                tags = excluded.tags
            RETURNING id
        "#,
        )
        .bind(&clean_name)
        .bind(category.parent_id)
        .bind(category.status.as_i64())
        .bind(Tag::join(&category.tags))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// All categories in id order, whatever their status.
    pub async fn get_categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows: Vec<CategoryDbRow> = sqlx::query_as(
            "SELECT id, name, parent_id, status, tags FROM categories ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CategoryDbRow::into_category).collect())
    }

    pub async fn get_category_by_id(&self, id: i64) -> Result<Option<Category>, StoreError> {
        let row: Option<CategoryDbRow> = sqlx::query_as(
            "SELECT id, name, parent_id, status, tags FROM categories WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CategoryDbRow::into_category))
    }
}
