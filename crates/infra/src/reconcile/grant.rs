use chrono::Utc;
use tracing::{debug, instrument};

use holdings_core::{InventoryItemId, ValidationErrors};
use holdings_inventory::{GrantRequest, InventoryRecord};

use super::DEFAULT_MAX_ATTEMPTS;
use crate::error::{ReconcileError, StoreError};
use crate::store::{InventoryFilter, InventoryStore};

/// What a grant did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    Created(InventoryItemId),
    Incremented { id: InventoryItemId, quantity: i64 },
}

/// Create-or-accumulate for a user's holding of a catalog item.
#[derive(Debug)]
pub struct GrantReconciler<S> {
    store: S,
    max_attempts: u32,
}

impl<S> GrantReconciler<S>
where
    S: InventoryStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate, then add `quantity` to the pair's record, creating it first
    /// if this is the first grant.
    ///
    /// Accumulation is a store-side increment, so concurrent grants never
    /// lose updates. Two concurrent first grants race on the pair's
    /// uniqueness; the loser sees `Conflict` and retries as an increment.
    #[instrument(
        skip(self, request),
        fields(
            user_id = %request.user_id,
            catalog_item_id = %request.catalog_item_id,
            quantity = request.quantity
        ),
        err
    )]
    pub async fn grant(&self, request: &GrantRequest) -> Result<GrantOutcome, ReconcileError> {
        request.validate().map_err(ReconcileError::Validation)?;

        let filter = InventoryFilter::for_pair(request.user_id, request.catalog_item_id);

        for attempt in 1..=self.max_attempts {
            match self.store.find_one(&filter).await {
                Ok(existing) => {
                    let quantity = self
                        .store
                        .increment_quantity(existing.id, request.quantity)
                        .await
                        .map_err(|e| match e {
                            StoreError::Invalid(reason) => {
                                debug!(%reason, "increment rejected by store");
                                let mut fields = ValidationErrors::new();
                                fields.add("quantity", "total held quantity is out of range");
                                ReconcileError::Validation(fields)
                            }
                            other => other.into(),
                        })?;
                    return Ok(GrantOutcome::Incremented {
                        id: existing.id,
                        quantity,
                    });
                }
                Err(StoreError::NotFound) => {
                    let record = InventoryRecord::first_grant(request, Utc::now());
                    match self.store.create(record).await {
                        Ok(id) => return Ok(GrantOutcome::Created(id)),
                        Err(StoreError::Conflict(reason)) => {
                            debug!(attempt, %reason, "holding created concurrently; retrying as increment");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ReconcileError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}
