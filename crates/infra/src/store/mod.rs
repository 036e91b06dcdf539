//! Per-entity store contracts.
//!
//! Each reconciler depends only on the store it needs. Writes that can race
//! are either version-checked (`update` takes an [`ExpectedVersion`]) or
//! expressed as a single atomic store operation (`increment_quantity`).

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use holdings_core::{CatalogItemId, ExpectedVersion, InventoryItemId, UserId};
use holdings_inventory::{CatalogItemRecord, InventoryRecord, Page, PageRequest, UserRecord};

use crate::error::StoreError;

pub use in_memory::{InMemoryCatalogStore, InMemoryInventoryStore, InMemoryUserStore};
pub use postgres::{PostgresCatalogStore, PostgresInventoryStore, PostgresUserStore, ensure_schema};

/// Replicated user directory.
#[async_trait::async_trait]
pub trait UserReplicaStore: Send + Sync {
    async fn get(&self, id: UserId) -> Result<UserRecord, StoreError>;

    /// Insert a new record. `Conflict` if the id already exists.
    async fn create(&self, record: UserRecord) -> Result<UserId, StoreError>;

    /// Replace the record with `record.id`, provided the stored version
    /// matches `expected`.
    async fn update(&self, record: UserRecord, expected: ExpectedVersion) -> Result<(), StoreError>;
}

/// Predicate over inventory records. `None` fields match anything.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct InventoryFilter {
    pub user_id: Option<UserId>,
    pub catalog_item_id: Option<CatalogItemId>,
}

impl InventoryFilter {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            catalog_item_id: None,
        }
    }

    pub fn for_pair(user_id: UserId, catalog_item_id: CatalogItemId) -> Self {
        Self {
            user_id: Some(user_id),
            catalog_item_id: Some(catalog_item_id),
        }
    }

    pub fn matches(&self, record: &InventoryRecord) -> bool {
        self.user_id.is_none_or(|u| u == record.user_id)
            && self.catalog_item_id.is_none_or(|c| c == record.catalog_item_id)
    }
}

/// Inventory holdings.
#[async_trait::async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get(&self, id: InventoryItemId) -> Result<InventoryRecord, StoreError>;

    /// First record matching `filter`, or `NotFound`.
    async fn find_one(&self, filter: &InventoryFilter) -> Result<InventoryRecord, StoreError>;

    /// One page of matching records, ordered by `page.sort`.
    async fn list(
        &self,
        filter: &InventoryFilter,
        page: PageRequest,
    ) -> Result<Page<InventoryRecord>, StoreError>;

    /// Insert a new record. `Conflict` if the id or the
    /// `(user_id, catalog_item_id)` pair already exists.
    async fn create(&self, record: InventoryRecord) -> Result<InventoryItemId, StoreError>;

    /// Replace the record with `record.id`, provided the stored version
    /// matches `expected`.
    async fn update(
        &self,
        record: InventoryRecord,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    /// Atomically add `delta` to the stored quantity; returns the new quantity.
    async fn increment_quantity(&self, id: InventoryItemId, delta: i64) -> Result<i64, StoreError>;
}

/// Read-only catalog access.
#[async_trait::async_trait]
pub trait CatalogLookup: Send + Sync {
    /// Every record whose id is in `ids`. Unknown ids are simply absent.
    async fn get_many(&self, ids: &[CatalogItemId]) -> Result<Vec<CatalogItemRecord>, StoreError>;
}

#[async_trait::async_trait]
impl<S> UserReplicaStore for Arc<S>
where
    S: UserReplicaStore + ?Sized,
{
    async fn get(&self, id: UserId) -> Result<UserRecord, StoreError> {
        (**self).get(id).await
    }

    async fn create(&self, record: UserRecord) -> Result<UserId, StoreError> {
        (**self).create(record).await
    }

    async fn update(&self, record: UserRecord, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).update(record, expected).await
    }
}

#[async_trait::async_trait]
impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    async fn get(&self, id: InventoryItemId) -> Result<InventoryRecord, StoreError> {
        (**self).get(id).await
    }

    async fn find_one(&self, filter: &InventoryFilter) -> Result<InventoryRecord, StoreError> {
        (**self).find_one(filter).await
    }

    async fn list(
        &self,
        filter: &InventoryFilter,
        page: PageRequest,
    ) -> Result<Page<InventoryRecord>, StoreError> {
        (**self).list(filter, page).await
    }

    async fn create(&self, record: InventoryRecord) -> Result<InventoryItemId, StoreError> {
        (**self).create(record).await
    }

    async fn update(
        &self,
        record: InventoryRecord,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).update(record, expected).await
    }

    async fn increment_quantity(&self, id: InventoryItemId, delta: i64) -> Result<i64, StoreError> {
        (**self).increment_quantity(id, delta).await
    }
}

#[async_trait::async_trait]
impl<S> CatalogLookup for Arc<S>
where
    S: CatalogLookup + ?Sized,
{
    async fn get_many(&self, ids: &[CatalogItemId]) -> Result<Vec<CatalogItemRecord>, StoreError> {
        (**self).get_many(ids).await
    }
}
