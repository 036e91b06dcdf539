//! Inventory listing: one page of holdings joined with catalog metadata.

use tracing::{instrument, warn};

use holdings_inventory::{EnrichedInventoryItem, ListQuery, Page, distinct_catalog_ids, join_catalog};

use crate::error::StoreError;
use crate::store::{CatalogLookup, InventoryFilter, InventoryStore};

#[derive(Debug)]
pub struct InventoryListing<I, C> {
    inventory: I,
    catalog: C,
}

impl<I, C> InventoryListing<I, C>
where
    I: InventoryStore,
    C: CatalogLookup,
{
    pub fn new(inventory: I, catalog: C) -> Self {
        Self { inventory, catalog }
    }

    /// Fetch the requested page for the user, then resolve every referenced
    /// catalog item with one batched lookup.
    ///
    /// Entries whose catalog item cannot be resolved are left out; the page
    /// metadata still reflects the inventory query.
    #[instrument(
        skip(self, query),
        fields(user_id = %query.user_id, page = query.page.page, page_size = query.page.page_size),
        err
    )]
    pub async fn list(&self, query: &ListQuery) -> Result<Page<EnrichedInventoryItem>, StoreError> {
        let page = self
            .inventory
            .list(&InventoryFilter::for_user(query.user_id), query.page)
            .await?;

        if page.items.is_empty() {
            return Ok(Page {
                items: Vec::new(),
                metadata: page.metadata,
            });
        }

        let ids = distinct_catalog_ids(&page.items);
        let catalog = self.catalog.get_many(&ids).await?;
        let joined = join_catalog(&page.items, &catalog);

        if joined.unresolved > 0 {
            warn!(
                unresolved = joined.unresolved,
                "inventory entries reference unknown catalog items; omitted from listing"
            );
        }

        Ok(Page {
            items: joined.items,
            metadata: page.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryCatalogStore, InMemoryInventoryStore};
    use chrono::{Duration, Utc};
    use holdings_core::{CatalogItemId, InventoryItemId, UserId};
    use holdings_inventory::{CatalogItemRecord, InventoryRecord, RawListParams};

    fn query(user: &str, sort: Option<&str>) -> ListQuery {
        ListQuery::parse(&RawListParams {
            user_id: Some(user.to_string()),
            sort: sort.map(str::to_string),
            ..RawListParams::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn unresolved_catalog_entries_are_omitted_in_page_order() {
        let inventory = InMemoryInventoryStore::new();
        let catalog = InMemoryCatalogStore::new();
        let a = CatalogItemId::new();
        let b = CatalogItemId::new();
        catalog.insert(CatalogItemRecord::new(a, "Antidote", "Cures poison"));

        let now = Utc::now();
        for (cat, qty, age) in [(a, 3, 2), (b, 1, 1)] {
            inventory
                .create(InventoryRecord {
                    id: InventoryItemId::new(),
                    user_id: UserId::new(1),
                    catalog_item_id: cat,
                    quantity: qty,
                    version: 1,
                    acquired_date: now - Duration::days(age),
                    message_ids: vec![],
                })
                .await
                .unwrap();
        }

        let listing = InventoryListing::new(inventory, catalog);
        let page = listing.list(&query("1", Some("-acquiredDate"))).await.unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].catalog_item_id, a);
        assert_eq!(page.items[0].name, "Antidote");
        assert_eq!(page.items[0].quantity, 3);
        assert_eq!(page.metadata.total_records, 2);
    }

    #[tokio::test]
    async fn user_without_holdings_gets_an_empty_page() {
        let listing = InventoryListing::new(InMemoryInventoryStore::new(), InMemoryCatalogStore::new());
        let page = listing.list(&query("42", None)).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.metadata.total_records, 0);
        assert_eq!(page.metadata.current_page, 0);
    }
}
