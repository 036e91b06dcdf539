//! Inventory domain module.
//!
//! Business rules for user holdings, the replicated user directory and the
//! listing query, implemented as deterministic domain logic (no IO, no HTTP,
//! no storage). Infra composes these with the stores.

pub mod grant;
pub mod listing;
pub mod records;
pub mod user;

pub use grant::GrantRequest;
pub use listing::{
    EnrichedInventoryItem, JoinOutcome, ListQuery, Page, PageMetadata, PageRequest, RawListParams,
    SortField, SortKey, distinct_catalog_ids, join_catalog,
};
pub use records::{CatalogItemRecord, InventoryRecord};
pub use user::UserRecord;
