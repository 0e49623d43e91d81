//! # Catalog Item Resolution
//!
//! Maps invoice line names onto catalog items, creating items on demand.
//!
//! ## Resolution Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  "  Cement " ──► normalize ──► "cement"                                │
//! │                                   │                                     │
//! │        ┌──────────────────────────┼─────────────────────────┐          │
//! │        ▼                          ▼                         ▼          │
//! │  1. pass cache hit        2. exact name match       3. create item     │
//! │     (same run)               in the store              CEME-0001       │
//! │                                                         CEME-0002 ...  │
//! │                                                   (first unused code)  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Matching is exact on the normalized name; there is no fuzzy matching.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use ledger_core::codes::{code_prefix, item_code, normalize_name};
use ledger_core::CatalogItem;
use ledger_db::DbError;

use crate::error::{SyncError, SyncResult};
use crate::store::LedgerStore;

/// Highest counter tried before giving up on a prefix.
const MAX_CODE_COUNTER: u32 = 999_999;

/// Resolves line names to catalog items for the duration of one pass.
pub struct ItemResolver {
    store: Arc<dyn LedgerStore>,
    by_name: HashMap<String, CatalogItem>,
    next_counter: HashMap<String, u32>,
}

impl ItemResolver {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        ItemResolver {
            store,
            by_name: HashMap::new(),
            next_counter: HashMap::new(),
        }
    }

    /// Returns the item named `name`, creating it if no exact match exists.
    pub async fn resolve(&mut self, name: &str, unit: Option<&str>) -> SyncResult<CatalogItem> {
        let key = normalize_name(name);
        if let Some(item) = self.by_name.get(&key) {
            return Ok(item.clone());
        }

        let item = match self.store.catalog_item_by_name(name).await? {
            Some(item) => {
                debug!(code = %item.code, name = %name, "Matched catalog item");
                item
            }
            None => self.create(name, unit).await?,
        };

        self.by_name.insert(key, item.clone());
        Ok(item)
    }

    async fn create(&mut self, name: &str, unit: Option<&str>) -> SyncResult<CatalogItem> {
        let prefix = code_prefix(name);
        let mut counter = self.next_counter.get(&prefix).copied().unwrap_or(1);

        while counter <= MAX_CODE_COUNTER {
            let code = item_code(&prefix, counter);
            counter += 1;

            if self.store.catalog_code_exists(&code).await? {
                continue;
            }

            match self.store.create_catalog_item(&code, name, unit).await {
                Ok(item) => {
                    info!(code = %item.code, name = %item.name, "Created catalog item");
                    self.next_counter.insert(prefix, counter);
                    return Ok(item);
                }
                // Taken between the existence check and the insert
                Err(SyncError::Database(DbError::UniqueViolation { .. })) => {
                    debug!(code = %code, "Item code taken, trying next");
                }
                Err(e) => return Err(e),
            }
        }

        Err(SyncError::CodesExhausted(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_db::{Database, DbConfig};

    async fn setup() -> (Database, ItemResolver) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let resolver = ItemResolver::new(Arc::new(db.clone()));
        (db, resolver)
    }

    #[tokio::test]
    async fn test_same_name_resolves_to_one_item() {
        let (db, mut resolver) = setup().await;

        let first = resolver.resolve("Cement", Some("bag")).await.unwrap();
        let second = resolver.resolve("  CEMENT ", None).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.code, "CEME-0001");
        assert_eq!(db.catalog().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_existing_item_is_matched_across_passes() {
        let (db, mut resolver) = setup().await;
        let existing = db.catalog().insert("CEM-1", "Cement", None).await.unwrap();

        let item = resolver.resolve("cement", None).await.unwrap();
        assert_eq!(item.id, existing.id);

        // A fresh pass sees the same row
        let mut next_pass = ItemResolver::new(Arc::new(db.clone()));
        assert_eq!(next_pass.resolve("Cement", None).await.unwrap().id, existing.id);
    }

    #[tokio::test]
    async fn test_code_collision_increments_counter() {
        let (db, mut resolver) = setup().await;
        db.catalog().insert("CEME-0001", "Cemetery fence", None).await.unwrap();
        db.catalog().insert("CEME-0002", "Cement mixer", None).await.unwrap();

        let item = resolver.resolve("Cement", None).await.unwrap();
        assert_eq!(item.code, "CEME-0003");

        let other = resolver.resolve("Cement M-500", None).await.unwrap();
        assert_eq!(other.code, "CEME-0004");
    }

    #[tokio::test]
    async fn test_name_without_alphanumerics_uses_fallback_prefix() {
        let (_db, mut resolver) = setup().await;
        let item = resolver.resolve("---", None).await.unwrap();
        assert_eq!(item.code, "ITEM-0001");
    }
}
