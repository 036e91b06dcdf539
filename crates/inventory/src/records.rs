//! Persisted record shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use holdings_core::{CatalogItemId, InventoryItemId, MessageId, UserId};

use crate::grant::GrantRequest;

/// How many units of one catalog item a user holds.
///
/// At most one record exists per `(user_id, catalog_item_id)`; grants only
/// ever add to `quantity`, so it stays strictly positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: InventoryItemId,
    pub user_id: UserId,
    pub catalog_item_id: CatalogItemId,
    pub quantity: i64,
    pub version: i64,
    pub acquired_date: DateTime<Utc>,
    /// Broker messages that touched this record. Persisted, never read.
    #[serde(default)]
    pub message_ids: Vec<MessageId>,
}

impl InventoryRecord {
    /// Record created by the first grant for a pair.
    ///
    /// The request must already be validated.
    pub fn first_grant(request: &GrantRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: InventoryItemId::new(),
            user_id: request.user_id,
            catalog_item_id: request.catalog_item_id,
            quantity: request.quantity,
            version: 1,
            acquired_date: now,
            message_ids: Vec::new(),
        }
    }

    pub fn belongs_to(&self, user_id: UserId, catalog_item_id: CatalogItemId) -> bool {
        self.user_id == user_id && self.catalog_item_id == catalog_item_id
    }
}

/// Catalog entry, read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItemRecord {
    pub id: CatalogItemId,
    pub name: String,
    pub description: String,
    pub version: i64,
}

impl CatalogItemRecord {
    pub fn new(id: CatalogItemId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
            version: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_grant_starts_at_version_one_with_no_provenance() {
        let now = Utc::now();
        let req = GrantRequest {
            user_id: UserId::new(1),
            catalog_item_id: CatalogItemId::new(),
            quantity: 2,
        };

        let rec = InventoryRecord::first_grant(&req, now);
        assert_eq!(rec.version, 1);
        assert_eq!(rec.quantity, 2);
        assert_eq!(rec.acquired_date, now);
        assert!(rec.message_ids.is_empty());
        assert!(rec.belongs_to(req.user_id, req.catalog_item_id));
        assert!(!rec.belongs_to(UserId::new(2), req.catalog_item_id));
    }
}
