//! # Catalog Repository
//!
//! Item master. Exact matching goes through the `name_key` column, which
//! holds the trimmed lower-case name computed by
//! [`normalize_name`](ledger_core::codes::normalize_name). SQLite's own
//! `lower()` only folds ASCII, so the key is computed in Rust.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use ledger_core::codes::normalize_name;
use ledger_core::CatalogItem;

const ITEM_COLUMNS: &str = "id, code, name, parent_id, unit, created_at";

/// Repository for catalog item operations.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Finds the oldest item whose normalized name equals `name`'s.
    pub async fn find_by_name(&self, name: &str) -> DbResult<Option<CatalogItem>> {
        let sql = format!(
            "SELECT {} FROM catalog_items WHERE name_key = ?1 ORDER BY created_at, rowid LIMIT 1",
            ITEM_COLUMNS
        );
        let item = sqlx::query_as::<_, CatalogItem>(&sql)
            .bind(normalize_name(name))
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CatalogItem>> {
        let sql = format!("SELECT {} FROM catalog_items WHERE id = ?1", ITEM_COLUMNS);
        let item = sqlx::query_as::<_, CatalogItem>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    pub async fn code_exists(&self, code: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_items WHERE code = ?1")
            .bind(code)
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    /// Inserts a new item under `code`.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` if the code is taken.
    pub async fn insert(
        &self,
        code: &str,
        name: &str,
        unit: Option<&str>,
    ) -> DbResult<CatalogItem> {
        let item = CatalogItem {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            name: name.trim().to_string(),
            parent_id: None,
            unit: unit.map(str::to_string),
            created_at: Utc::now(),
        };

        debug!(code = %item.code, name = %item.name, "Creating catalog item");

        sqlx::query(
            r#"
            INSERT INTO catalog_items (id, code, name, name_key, parent_id, unit, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&item.id)
        .bind(&item.code)
        .bind(&item.name)
        .bind(normalize_name(&item.name))
        .bind(&item.parent_id)
        .bind(&item.unit)
        .bind(item.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: item.code.clone(),
            },
            other => other,
        })?;

        Ok(item)
    }

    /// Merges `id` into `parent_id` (or detaches it with `None`).
    pub async fn set_parent(&self, id: &str, parent_id: Option<&str>) -> DbResult<()> {
        if parent_id == Some(id) {
            return Err(DbError::InvalidValue {
                field: "parent_id".into(),
                reason: "an item cannot be its own parent".into(),
            });
        }

        let result = sqlx::query("UPDATE catalog_items SET parent_id = ?2 WHERE id = ?1")
            .bind(id)
            .bind(parent_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CatalogItem", id));
        }

        Ok(())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_items")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig, DbError};

    #[tokio::test]
    async fn test_find_by_name_is_case_and_space_insensitive() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.catalog();

        let item = repo.insert("CEME-0001", " Cement ", Some("bag")).await.unwrap();
        assert_eq!(item.name, "Cement");

        let found = repo.find_by_name("  CEMENT").await.unwrap().unwrap();
        assert_eq!(found.id, item.id);
        assert!(repo.find_by_name("Cement M-500").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_code_uniqueness() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.catalog();

        repo.insert("CEME-0001", "Cement", None).await.unwrap();
        assert!(repo.code_exists("CEME-0001").await.unwrap());
        assert!(!repo.code_exists("CEME-0002").await.unwrap());

        let err = repo.insert("CEME-0001", "Cement grey", None).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_set_parent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.catalog();

        let canonical = repo.insert("CEME-0001", "Cement", None).await.unwrap();
        let variant = repo.insert("CEME-0002", "Cement M400", None).await.unwrap();

        repo.set_parent(&variant.id, Some(&canonical.id)).await.unwrap();
        let reloaded = repo.get_by_id(&variant.id).await.unwrap().unwrap();
        assert_eq!(reloaded.resolved_id(), canonical.id);

        assert!(repo.set_parent(&canonical.id, Some(&canonical.id)).await.is_err());
    }
}
