//! Postgres-backed stores.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate id or duplicate (user, catalog item) pair |
//! | Database (check constraint violation) | `23514` | `Invalid` | e.g. quantity < 1 |
//! | Database (not-null violation) | `23502` | `Invalid` | Missing required column |
//! | Database (numeric value out of range) | `22003` | `Invalid` | `quantity + delta` overflows BIGINT |
//! | RowNotFound | N/A | `NotFound` | |
//! | Other | N/A | `Backend` | Network errors, pool closed, etc. |
//!
//! Version-checked updates are a single `UPDATE ... WHERE version = $n`; a
//! zero row count is disambiguated into `NotFound` or `Conflict` afterwards.

use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};
use uuid::Uuid;

use holdings_core::{CatalogItemId, ExpectedVersion, InventoryItemId, MessageId, UserId};
use holdings_inventory::{
    CatalogItemRecord, InventoryRecord, Page, PageMetadata, PageRequest, UserRecord,
};

use super::{CatalogLookup, InventoryFilter, InventoryStore, UserReplicaStore};
use crate::error::StoreError;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id          BIGINT PRIMARY KEY CHECK (id > 0),
        permissions TEXT[] NOT NULL DEFAULT '{}',
        activated   BOOLEAN NOT NULL DEFAULT FALSE,
        version     BIGINT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS catalog_items (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        version     BIGINT NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inventory_items (
        id              UUID PRIMARY KEY,
        user_id         BIGINT NOT NULL CHECK (user_id > 0),
        catalog_item_id UUID NOT NULL,
        quantity        BIGINT NOT NULL CHECK (quantity >= 1),
        version         BIGINT NOT NULL CHECK (version >= 1),
        acquired_date   TIMESTAMPTZ NOT NULL,
        message_ids     UUID[] NOT NULL DEFAULT '{}',
        UNIQUE (user_id, catalog_item_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS inventory_items_user_idx ON inventory_items (user_id)",
];

/// Create the tables this service owns, if they don't exist yet.
#[instrument(skip(pool), err)]
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    }
    Ok(())
}

/// Map SQLx errors to StoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23514") | Some("23502") | Some("22003") => StoreError::Invalid(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn expected_version(expected: ExpectedVersion) -> Option<i64> {
    match expected {
        ExpectedVersion::Any => None,
        ExpectedVersion::Exact(v) => Some(v),
    }
}

fn user_from_row(row: &PgRow) -> Result<UserRecord, sqlx::Error> {
    Ok(UserRecord {
        id: UserId::new(row.try_get("id")?),
        permissions: row.try_get("permissions")?,
        activated: row.try_get("activated")?,
        version: row.try_get("version")?,
    })
}

fn inventory_from_row(row: &PgRow) -> Result<InventoryRecord, sqlx::Error> {
    let message_ids: Vec<Uuid> = row.try_get("message_ids")?;
    Ok(InventoryRecord {
        id: InventoryItemId::from_uuid(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        catalog_item_id: CatalogItemId::from_uuid(row.try_get("catalog_item_id")?),
        quantity: row.try_get("quantity")?,
        version: row.try_get("version")?,
        acquired_date: row.try_get("acquired_date")?,
        message_ids: message_ids.into_iter().map(MessageId::from_uuid).collect(),
    })
}

fn catalog_from_row(row: &PgRow) -> Result<CatalogItemRecord, sqlx::Error> {
    Ok(CatalogItemRecord {
        id: CatalogItemId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        version: row.try_get("version")?,
    })
}

/// Postgres-backed user replica (`users` table).
#[derive(Debug, Clone)]
pub struct PostgresUserStore {
    pool: Arc<PgPool>,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl UserReplicaStore for PostgresUserStore {
    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn get(&self, id: UserId) -> Result<UserRecord, StoreError> {
        let row = sqlx::query("SELECT id, permissions, activated, version FROM users WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?
            .ok_or(StoreError::NotFound)?;

        user_from_row(&row).map_err(|e| map_sqlx_error("decode_user", e))
    }

    #[instrument(skip(self, record), fields(user_id = %record.id), err)]
    async fn create(&self, record: UserRecord) -> Result<UserId, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, permissions, activated, version)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(record.id.get())
        .bind(&record.permissions)
        .bind(record.activated)
        .bind(record.version)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_user", e))?;

        Ok(record.id)
    }

    #[instrument(skip(self, record), fields(user_id = %record.id, expected = ?expected), err)]
    async fn update(&self, record: UserRecord, expected: ExpectedVersion) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET permissions = $2, activated = $3, version = $4
            WHERE id = $1 AND ($5::BIGINT IS NULL OR version = $5)
            "#,
        )
        .bind(record.id.get())
        .bind(&record.permissions)
        .bind(record.activated)
        .bind(record.version)
        .bind(expected_version(expected))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_user", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Zero rows: either the user vanished or the version moved on.
        let current = self.get(record.id).await?;
        Err(StoreError::Conflict(format!(
            "user {} is at version {} (expected {:?})",
            record.id, current.version, expected
        )))
    }
}

/// Postgres-backed inventory store (`inventory_items` table).
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: Arc<PgPool>,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

const INVENTORY_COLUMNS: &str =
    "id, user_id, catalog_item_id, quantity, version, acquired_date, message_ids";

const INVENTORY_FILTER: &str =
    "($1::BIGINT IS NULL OR user_id = $1) AND ($2::UUID IS NULL OR catalog_item_id = $2)";

#[async_trait::async_trait]
impl InventoryStore for PostgresInventoryStore {
    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn get(&self, id: InventoryItemId) -> Result<InventoryRecord, StoreError> {
        let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventory_items WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_inventory_item", e))?
            .ok_or(StoreError::NotFound)?;

        inventory_from_row(&row).map_err(|e| map_sqlx_error("decode_inventory_item", e))
    }

    #[instrument(skip(self), err)]
    async fn find_one(&self, filter: &InventoryFilter) -> Result<InventoryRecord, StoreError> {
        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory_items WHERE {INVENTORY_FILTER} ORDER BY id LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(filter.user_id.map(|u| u.get()))
            .bind(filter.catalog_item_id.map(|c| *c.as_uuid()))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_inventory_item", e))?
            .ok_or(StoreError::NotFound)?;

        inventory_from_row(&row).map_err(|e| map_sqlx_error("decode_inventory_item", e))
    }

    #[instrument(
        skip(self, filter),
        fields(page = page.page, page_size = page.page_size, record_count = tracing::field::Empty),
        err
    )]
    async fn list(
        &self,
        filter: &InventoryFilter,
        page: PageRequest,
    ) -> Result<Page<InventoryRecord>, StoreError> {
        let user_id = filter.user_id.map(|u| u.get());
        let catalog_item_id = filter.catalog_item_id.map(|c| *c.as_uuid());

        let count_sql = format!("SELECT COUNT(*) AS total FROM inventory_items WHERE {INVENTORY_FILTER}");
        let total: i64 = sqlx::query(&count_sql)
            .bind(user_id)
            .bind(catalog_item_id)
            .fetch_one(&*self.pool)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(|e| map_sqlx_error("count_inventory_items", e))?;

        if total == 0 {
            return Ok(Page::empty());
        }

        // Sort column and direction come from the allow-listed SortKey only.
        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory_items WHERE {INVENTORY_FILTER} \
             ORDER BY {} {}, id ASC LIMIT $3 OFFSET $4",
            page.sort.column(),
            page.sort.direction(),
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(catalog_item_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_inventory_items", e))?;

        let items = rows
            .iter()
            .map(inventory_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("decode_inventory_item", e))?;

        Span::current().record("record_count", items.len());
        Ok(Page {
            items,
            metadata: PageMetadata::calculate(total, page.page, page.page_size),
        })
    }

    #[instrument(
        skip(self, record),
        fields(item_id = %record.id, user_id = %record.user_id, catalog_item_id = %record.catalog_item_id),
        err
    )]
    async fn create(&self, record: InventoryRecord) -> Result<InventoryItemId, StoreError> {
        let message_ids: Vec<Uuid> = record.message_ids.iter().map(|m| *m.as_uuid()).collect();
        sqlx::query(
            r#"
            INSERT INTO inventory_items
                (id, user_id, catalog_item_id, quantity, version, acquired_date, message_ids)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(*record.id.as_uuid())
        .bind(record.user_id.get())
        .bind(*record.catalog_item_id.as_uuid())
        .bind(record.quantity)
        .bind(record.version)
        .bind(record.acquired_date)
        .bind(&message_ids)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_inventory_item", e))?;

        Ok(record.id)
    }

    #[instrument(skip(self, record), fields(item_id = %record.id, expected = ?expected), err)]
    async fn update(
        &self,
        record: InventoryRecord,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let message_ids: Vec<Uuid> = record.message_ids.iter().map(|m| *m.as_uuid()).collect();
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET quantity = $2, version = $3, acquired_date = $4, message_ids = $5
            WHERE id = $1 AND ($6::BIGINT IS NULL OR version = $6)
            "#,
        )
        .bind(*record.id.as_uuid())
        .bind(record.quantity)
        .bind(record.version)
        .bind(record.acquired_date)
        .bind(&message_ids)
        .bind(expected_version(expected))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_inventory_item", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let current = self.get(record.id).await?;
        Err(StoreError::Conflict(format!(
            "inventory item {} is at version {} (expected {:?})",
            record.id, current.version, expected
        )))
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn increment_quantity(&self, id: InventoryItemId, delta: i64) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "UPDATE inventory_items SET quantity = quantity + $2 WHERE id = $1 RETURNING quantity",
        )
        .bind(*id.as_uuid())
        .bind(delta)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("increment_quantity", e))?
        .ok_or(StoreError::NotFound)?;

        row.try_get("quantity")
            .map_err(|e| map_sqlx_error("increment_quantity", e))
    }
}

/// Postgres-backed catalog lookup (`catalog_items` table).
#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: Arc<PgPool>,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl CatalogLookup for PostgresCatalogStore {
    #[instrument(skip(self, ids), fields(requested = ids.len()), err)]
    async fn get_many(&self, ids: &[CatalogItemId]) -> Result<Vec<CatalogItemRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query(
            "SELECT id, name, description, version FROM catalog_items WHERE id = ANY($1)",
        )
        .bind(&keys)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_catalog_items", e))?;

        rows.iter()
            .map(catalog_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("decode_catalog_item", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert_eq!(map_sqlx_error("get", sqlx::Error::RowNotFound), StoreError::NotFound);
    }

    #[test]
    fn pool_closed_is_a_backend_error() {
        assert!(matches!(
            map_sqlx_error("get", sqlx::Error::PoolClosed),
            StoreError::Backend(_)
        ));
    }

    #[test]
    fn any_version_skips_the_check() {
        assert_eq!(expected_version(ExpectedVersion::Any), None);
        assert_eq!(expected_version(ExpectedVersion::Exact(4)), Some(4));
    }
}
