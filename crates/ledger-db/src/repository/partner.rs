//! # Partner Repository
//!
//! Counterparties keyed by TIN. Rows are created on demand by the
//! reconciler; the warehouse link is maintained by operators.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use ledger_core::{NewPartner, Partner};

const PARTNER_COLUMNS: &str = "id, tin, name, address, bank_account, bank_code, director, \
                               warehouse_id, created_at, updated_at";

/// Repository for partner operations.
#[derive(Debug, Clone)]
pub struct PartnerRepository {
    pool: SqlitePool,
}

impl PartnerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PartnerRepository { pool }
    }

    /// Looks up a partner by TIN.
    pub async fn get_by_tin(&self, tin: &str) -> DbResult<Option<Partner>> {
        let sql = format!("SELECT {} FROM partners WHERE tin = ?1", PARTNER_COLUMNS);
        let partner = sqlx::query_as::<_, Partner>(&sql)
            .bind(tin.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(partner)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Partner>> {
        let sql = format!("SELECT {} FROM partners WHERE id = ?1", PARTNER_COLUMNS);
        let partner = sqlx::query_as::<_, Partner>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(partner)
    }

    /// Creates a partner.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` if the TIN is already registered.
    pub async fn create(&self, draft: &NewPartner) -> DbResult<Partner> {
        let now = Utc::now();
        let partner = Partner {
            id: Uuid::new_v4().to_string(),
            tin: draft.tin.trim().to_string(),
            name: draft.name.trim().to_string(),
            address: draft.address.clone(),
            bank_account: draft.bank_account.clone(),
            bank_code: draft.bank_code.clone(),
            director: draft.director.clone(),
            warehouse_id: None,
            created_at: now,
            updated_at: now,
        };

        debug!(tin = %partner.tin, name = %partner.name, "Creating partner");

        sqlx::query(
            r#"
            INSERT INTO partners (
                id, tin, name, address, bank_account, bank_code, director,
                warehouse_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&partner.id)
        .bind(&partner.tin)
        .bind(&partner.name)
        .bind(&partner.address)
        .bind(&partner.bank_account)
        .bind(&partner.bank_code)
        .bind(&partner.director)
        .bind(&partner.warehouse_id)
        .bind(partner.created_at)
        .bind(partner.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: partner.tin.clone(),
            },
            other => other,
        })?;

        Ok(partner)
    }

    /// Links (or unlinks) the warehouse stock is shipped from.
    pub async fn set_warehouse(&self, id: &str, warehouse_id: Option<&str>) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE partners SET warehouse_id = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(warehouse_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Partner", id));
        }

        Ok(())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM partners")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig, DbError};
    use ledger_core::NewPartner;

    fn draft(tin: &str) -> NewPartner {
        NewPartner {
            tin: tin.into(),
            name: "Stroy Trade LLC".into(),
            address: Some("Tashkent, Navoi 12".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup_by_tin() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.partners();

        let created = repo.create(&draft("111")).await.unwrap();
        let found = repo.get_by_tin("111").await.unwrap().unwrap();

        assert_eq!(found.id, created.id);
        assert_eq!(found.address.as_deref(), Some("Tashkent, Navoi 12"));
        assert!(found.warehouse_id.is_none());
        assert!(repo.get_by_tin("222").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_tin_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.partners();

        repo.create(&draft("111")).await.unwrap();
        let err = repo.create(&draft("111")).await.unwrap_err();

        assert!(matches!(err, DbError::UniqueViolation { ref value, .. } if value == "111"));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_set_warehouse() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.partners();
        let partner = repo.create(&draft("111")).await.unwrap();

        repo.set_warehouse(&partner.id, Some("WH-SUPPLIER")).await.unwrap();
        let reloaded = repo.get_by_id(&partner.id).await.unwrap().unwrap();
        assert_eq!(reloaded.warehouse_id.as_deref(), Some("WH-SUPPLIER"));

        let missing = repo.set_warehouse("nope", Some("X")).await;
        assert!(matches!(missing, Err(DbError::NotFound { .. })));
    }
}
