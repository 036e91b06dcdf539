//! Integration tests for the full pipeline.
//!
//! Tests: broadcast → consumer → replica store, and grant → listing.
//!
//! Verifies:
//! - Every running instance gets its own copy of each broadcast
//! - Merge rules hold end to end
//! - Granted holdings show up in listings joined with catalog metadata

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use holdings_core::{CatalogItemId, UserId};
    use holdings_events::{Delivery, EventBus, InMemoryEventBus};
    use holdings_inventory::{CatalogItemRecord, GrantRequest, ListQuery, RawListParams};

    use crate::consumer::{ConsumerConfig, ConsumerHandle, UserUpdatedConsumer};
    use crate::dead_letter::InMemoryDeadLetterSink;
    use crate::listing::InventoryListing;
    use crate::reconcile::{GrantReconciler, ReplicaReconciler};
    use crate::store::{
        InMemoryCatalogStore, InMemoryInventoryStore, InMemoryUserStore, UserReplicaStore,
    };

    async fn instance(
        bus: &InMemoryEventBus<Delivery>,
    ) -> (Arc<InMemoryUserStore>, ConsumerHandle) {
        let store = Arc::new(InMemoryUserStore::new());
        let handle = UserUpdatedConsumer::new(
            ReplicaReconciler::new(store.clone()),
            Arc::new(InMemoryDeadLetterSink::new()),
            ConsumerConfig::default(),
        )
        .start(bus)
        .await
        .unwrap();
        (store, handle)
    }

    fn broadcast(body: serde_json::Value) -> Delivery {
        Delivery::new("identity:user-updated", serde_json::to_vec(&body).unwrap())
    }

    async fn settle(handles: &[&ConsumerHandle], expected: u64) {
        for _ in 0..200 {
            if handles.iter().all(|h| h.stats().reconciled >= expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("instances did not converge");
    }

    #[tokio::test]
    async fn every_instance_converges_on_each_broadcast() {
        let bus: InMemoryEventBus<Delivery> = InMemoryEventBus::new();
        let (store_a, handle_a) = instance(&bus).await;
        let (store_b, handle_b) = instance(&bus).await;

        bus.publish(broadcast(serde_json::json!({
            "id": 7, "permissions": ["inventory:read"], "activated": false, "version": 1
        })))
        .await
        .unwrap();
        settle(&[&handle_a, &handle_b], 1).await;

        // Activation without a permission list keeps the existing set.
        bus.publish(broadcast(serde_json::json!({ "id": 7, "activated": true, "version": 2 })))
            .await
            .unwrap();
        settle(&[&handle_a, &handle_b], 2).await;

        for store in [&store_a, &store_b] {
            let user = store.get(UserId::new(7)).await.unwrap();
            assert!(user.activated);
            assert_eq!(user.permissions, vec!["inventory:read".to_string()]);
        }

        handle_a.shutdown().await;
        handle_b.shutdown().await;
    }

    #[tokio::test]
    async fn granted_holdings_are_listed_with_catalog_metadata() {
        let inventory = Arc::new(InMemoryInventoryStore::new());
        let catalog = Arc::new(InMemoryCatalogStore::new());
        let potion = CatalogItemId::new();
        catalog.insert(CatalogItemRecord::new(potion, "Potion", "Restores a small amount of HP"));

        let grants = GrantReconciler::new(inventory.clone());
        for quantity in [2, 3] {
            grants
                .grant(&GrantRequest {
                    user_id: UserId::new(1),
                    catalog_item_id: potion,
                    quantity,
                })
                .await
                .unwrap();
        }

        let listing = InventoryListing::new(inventory, catalog);
        let query = ListQuery::parse(&RawListParams {
            user_id: Some("1".into()),
            ..RawListParams::default()
        })
        .unwrap();
        let page = listing.list(&query).await.unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "Potion");
        assert_eq!(page.items[0].quantity, 5);
        assert_eq!(page.metadata.total_records, 1);
        assert_eq!(page.metadata.last_page, 1);
    }
}
