//! In-memory stores for tests and local development.
//!
//! Each store guards its map with a single `RwLock`, so every individual
//! operation (including version checks and increments) is atomic with
//! respect to the others. Locks are never held across an await point.

use std::collections::HashMap;
use std::sync::RwLock;

use holdings_core::{CatalogItemId, ExpectedVersion, InventoryItemId, UserId};
use holdings_inventory::{
    CatalogItemRecord, InventoryRecord, Page, PageMetadata, PageRequest, UserRecord,
};

use super::{CatalogLookup, InventoryFilter, InventoryStore, UserReplicaStore};
use crate::error::StoreError;

fn poisoned() -> StoreError {
    StoreError::backend("in-memory store lock poisoned")
}

/// Same rule as the `quantity`/`version` CHECK constraints in Postgres.
fn check_holding(record: &InventoryRecord) -> Result<(), StoreError> {
    if record.quantity < 1 || record.version < 1 {
        return Err(StoreError::Invalid(
            "quantity and version must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// In-memory user replica.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    inner: RwLock<HashMap<UserId, UserRecord>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl UserReplicaStore for InMemoryUserStore {
    async fn get(&self, id: UserId) -> Result<UserRecord, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        map.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn create(&self, record: UserRecord) -> Result<UserId, StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        if map.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!("user {} already exists", record.id)));
        }
        let id = record.id;
        map.insert(id, record);
        Ok(id)
    }

    async fn update(&self, record: UserRecord, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let current = map.get_mut(&record.id).ok_or(StoreError::NotFound)?;
        expected.check(current.version)?;
        *current = record;
        Ok(())
    }
}

/// In-memory inventory store enforcing one record per (user, catalog item).
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    inner: RwLock<HashMap<InventoryItemId, InventoryRecord>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record, in no particular order.
    pub fn all(&self) -> Vec<InventoryRecord> {
        self.inner
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get(&self, id: InventoryItemId) -> Result<InventoryRecord, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        map.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn find_one(&self, filter: &InventoryFilter) -> Result<InventoryRecord, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        map.values()
            .filter(|r| filter.matches(r))
            .min_by_key(|r| r.id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list(
        &self,
        filter: &InventoryFilter,
        page: PageRequest,
    ) -> Result<Page<InventoryRecord>, StoreError> {
        let mut matching: Vec<InventoryRecord> = {
            let map = self.inner.read().map_err(|_| poisoned())?;
            map.values().filter(|r| filter.matches(r)).cloned().collect()
        };
        matching.sort_by(|a, b| page.sort.compare(a, b));

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(page.offset().max(0) as usize)
            .take(page.limit().max(0) as usize)
            .collect();

        Ok(Page {
            items,
            metadata: PageMetadata::calculate(total, page.page, page.page_size),
        })
    }

    async fn create(&self, record: InventoryRecord) -> Result<InventoryItemId, StoreError> {
        check_holding(&record)?;

        let mut map = self.inner.write().map_err(|_| poisoned())?;
        if map.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!("inventory item {} already exists", record.id)));
        }
        if map
            .values()
            .any(|r| r.belongs_to(record.user_id, record.catalog_item_id))
        {
            return Err(StoreError::Conflict(format!(
                "user {} already holds catalog item {}",
                record.user_id, record.catalog_item_id
            )));
        }

        let id = record.id;
        map.insert(id, record);
        Ok(id)
    }

    async fn update(
        &self,
        record: InventoryRecord,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        check_holding(&record)?;
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let current = map.get_mut(&record.id).ok_or(StoreError::NotFound)?;
        expected.check(current.version)?;
        *current = record;
        Ok(())
    }

    async fn increment_quantity(&self, id: InventoryItemId, delta: i64) -> Result<i64, StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let current = map.get_mut(&id).ok_or(StoreError::NotFound)?;
        let next = current
            .quantity
            .checked_add(delta)
            .filter(|q| *q >= 1)
            .ok_or_else(|| StoreError::Invalid(format!("quantity out of range for {id}")))?;
        current.quantity = next;
        Ok(next)
    }
}

/// In-memory catalog, seeded by tests or dev wiring.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    inner: RwLock<HashMap<CatalogItemId, CatalogItemRecord>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: CatalogItemRecord) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(record.id, record);
        }
    }
}

#[async_trait::async_trait]
impl CatalogLookup for InMemoryCatalogStore {
    async fn get_many(&self, ids: &[CatalogItemId]) -> Result<Vec<CatalogItemRecord>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use holdings_inventory::SortKey;

    fn user(id: i64, version: i64) -> UserRecord {
        UserRecord {
            id: UserId::new(id),
            permissions: vec![],
            activated: false,
            version,
        }
    }

    fn holding(user: i64, catalog: CatalogItemId, quantity: i64) -> InventoryRecord {
        InventoryRecord {
            id: InventoryItemId::new(),
            user_id: UserId::new(user),
            catalog_item_id: catalog,
            quantity,
            version: 1,
            acquired_date: Utc::now(),
            message_ids: vec![],
        }
    }

    #[tokio::test]
    async fn user_update_rejects_stale_version() {
        let store = InMemoryUserStore::new();
        store.create(user(1, 3)).await.unwrap();

        let err = store
            .update(user(1, 5), ExpectedVersion::Exact(2))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        store.update(user(1, 4), ExpectedVersion::Exact(3)).await.unwrap();
        assert_eq!(store.get(UserId::new(1)).await.unwrap().version, 4);
    }

    #[tokio::test]
    async fn duplicate_user_create_conflicts() {
        let store = InMemoryUserStore::new();
        store.create(user(1, 1)).await.unwrap();
        assert!(store.create(user(1, 1)).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn inventory_pair_is_unique() {
        let store = InMemoryInventoryStore::new();
        let cat = CatalogItemId::new();
        store.create(holding(1, cat, 1)).await.unwrap();

        let err = store.create(holding(1, cat, 2)).await.unwrap_err();
        assert!(err.is_conflict());
        store.create(holding(2, cat, 2)).await.unwrap();
    }

    #[tokio::test]
    async fn increment_is_applied_in_place() {
        let store = InMemoryInventoryStore::new();
        let rec = holding(1, CatalogItemId::new(), 2);
        let id = store.create(rec).await.unwrap();

        assert_eq!(store.increment_quantity(id, 3).await.unwrap(), 5);
        let stored = store.get(id).await.unwrap();
        assert_eq!(stored.quantity, 5);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn inventory_update_is_version_checked() {
        let store = InMemoryInventoryStore::new();
        let original = holding(1, CatalogItemId::new(), 2);
        let id = store.create(original.clone()).await.unwrap();

        let stale = store
            .update(
                InventoryRecord { quantity: 9, version: 3, ..original.clone() },
                ExpectedVersion::Exact(2),
            )
            .await
            .unwrap_err();
        assert!(stale.is_conflict());

        store
            .update(
                InventoryRecord { quantity: 4, version: 2, ..original },
                ExpectedVersion::Exact(1),
            )
            .await
            .unwrap();
        let stored = store.get(id).await.unwrap();
        assert_eq!((stored.quantity, stored.version), (4, 2));
    }

    #[tokio::test]
    async fn inventory_update_keeps_quantity_and_version_positive() {
        let store = InMemoryInventoryStore::new();
        let original = holding(1, CatalogItemId::new(), 2);
        let id = store.create(original.clone()).await.unwrap();

        for (quantity, version) in [(0, 1), (2, 0), (0, 0), (-3, 1)] {
            let err = store
                .update(
                    InventoryRecord { quantity, version, ..original.clone() },
                    ExpectedVersion::Exact(1),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::Invalid(_)), "({quantity}, {version}) -> {err:?}");
        }

        let stored = store.get(id).await.unwrap();
        assert_eq!((stored.quantity, stored.version), (2, 1));
    }

    #[tokio::test]
    async fn list_filters_sorts_and_pages() {
        let store = InMemoryInventoryStore::new();
        for q in [3, 1, 2] {
            store.create(holding(1, CatalogItemId::new(), q)).await.unwrap();
        }
        store.create(holding(2, CatalogItemId::new(), 9)).await.unwrap();

        let page = PageRequest {
            page: 1,
            page_size: 2,
            sort: SortKey::parse("-quantity").unwrap(),
        };
        let out = store
            .list(&InventoryFilter::for_user(UserId::new(1)), page)
            .await
            .unwrap();

        let quantities: Vec<i64> = out.items.iter().map(|r| r.quantity).collect();
        assert_eq!(quantities, vec![3, 2]);
        assert_eq!(out.metadata.total_records, 3);
        assert_eq!(out.metadata.last_page, 2);
    }

    #[tokio::test]
    async fn catalog_lookup_skips_unknown_ids() {
        let store = InMemoryCatalogStore::new();
        let known = CatalogItemId::new();
        store.insert(CatalogItemRecord::new(known, "Potion", "Heals"));

        let found = store.get_many(&[known, CatalogItemId::new()]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, known);
    }
}
