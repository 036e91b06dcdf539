//! Inventory listing: query parsing, pagination metadata and the catalog join.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use holdings_core::{CatalogItemId, InventoryItemId, UserId, ValidationErrors};

use crate::records::{CatalogItemRecord, InventoryRecord};

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE: i64 = 10_000_000;
const MAX_PAGE_SIZE: i64 = 100;

/// Column a listing can be ordered by.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SortField {
    Id,
    Quantity,
    AcquiredDate,
}

/// Allow-listed sort key; a leading `-` means descending.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

impl SortKey {
    pub const ALLOWED: [&'static str; 6] = [
        "id",
        "-id",
        "quantity",
        "-quantity",
        "acquiredDate",
        "-acquiredDate",
    ];

    pub fn parse(value: &str) -> Option<Self> {
        let (descending, name) = match value.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, value),
        };
        let field = match name {
            // `_id` is the identity service's spelling.
            "id" | "_id" => SortField::Id,
            "quantity" => SortField::Quantity,
            "acquiredDate" => SortField::AcquiredDate,
            _ => return None,
        };
        Some(Self { field, descending })
    }

    /// Storage column backing this key.
    pub fn column(&self) -> &'static str {
        match self.field {
            SortField::Id => "id",
            SortField::Quantity => "quantity",
            SortField::AcquiredDate => "acquired_date",
        }
    }

    pub fn direction(&self) -> &'static str {
        if self.descending { "DESC" } else { "ASC" }
    }

    /// Order two records by this key, breaking ties by identity ascending.
    pub fn compare(&self, a: &InventoryRecord, b: &InventoryRecord) -> Ordering {
        let primary = match self.field {
            SortField::Id => a.id.cmp(&b.id),
            SortField::Quantity => a.quantity.cmp(&b.quantity),
            SortField::AcquiredDate => a.acquired_date.cmp(&b.acquired_date),
        };
        let primary = if self.descending { primary.reverse() } else { primary };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

impl Default for SortKey {
    fn default() -> Self {
        Self {
            field: SortField::Id,
            descending: false,
        }
    }
}

/// Validated page window.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
    pub sort: SortKey,
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            sort: SortKey::default(),
        }
    }
}

/// Query string as received. Values stay textual so type errors can be
/// reported per field instead of rejecting the whole request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawListParams {
    pub user_id: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub sort: Option<String>,
}

/// A validated listing query.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub user_id: UserId,
    pub page: PageRequest,
}

impl ListQuery {
    pub fn parse(raw: &RawListParams) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let user_id = read_int(raw.user_id.as_deref(), 0, "user_id", &mut errors);
        let page = read_int(raw.page.as_deref(), DEFAULT_PAGE, "page", &mut errors);
        let page_size = read_int(raw.page_size.as_deref(), DEFAULT_PAGE_SIZE, "page_size", &mut errors);
        let sort_value = present(raw.sort.as_deref()).unwrap_or("id");
        let sort = SortKey::parse(sort_value);

        errors.check(user_id > 0, "user_id", "must be greater than 0");
        errors.check(page > 0, "page", "must be greater than zero");
        errors.check(page <= MAX_PAGE, "page", "must be a maximum of 10 million");
        errors.check(page_size > 0, "page_size", "must be greater than zero");
        errors.check(page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");
        errors.check(sort.is_some(), "sort", "invalid sort value");

        errors.into_result()?;
        Ok(Self {
            user_id: UserId::new(user_id),
            page: PageRequest {
                page,
                page_size,
                sort: sort.unwrap_or_default(),
            },
        })
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn read_int(value: Option<&str>, default: i64, field: &str, errors: &mut ValidationErrors) -> i64 {
    match present(value) {
        None => default,
        Some(v) => v.parse().unwrap_or_else(|_| {
            errors.add(field, "must be an integer value");
            default
        }),
    }
}

/// Pagination metadata. Every field is zero when there are no records.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

impl PageMetadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records <= 0 || page_size <= 0 {
            return Self::default();
        }
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}

/// One page of results plus its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub metadata: PageMetadata,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            metadata: PageMetadata::default(),
        }
    }
}

/// An inventory record joined with its catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedInventoryItem {
    pub id: InventoryItemId,
    #[serde(rename = "userID")]
    pub user_id: UserId,
    #[serde(rename = "catalogItemID")]
    pub catalog_item_id: CatalogItemId,
    pub name: String,
    pub description: String,
    pub quantity: i64,
    #[serde(rename = "acquiredDate")]
    pub acquired_date: DateTime<Utc>,
}

impl EnrichedInventoryItem {
    fn join(record: &InventoryRecord, catalog: &CatalogItemRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            catalog_item_id: record.catalog_item_id,
            name: catalog.name.clone(),
            description: catalog.description.clone(),
            quantity: record.quantity,
            acquired_date: record.acquired_date,
        }
    }
}

/// Distinct catalog ids referenced by `records`, in first-seen order.
pub fn distinct_catalog_ids(records: &[InventoryRecord]) -> Vec<CatalogItemId> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .map(|r| r.catalog_item_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Result of joining a page against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub items: Vec<EnrichedInventoryItem>,
    /// Records dropped because their catalog entry was not found.
    pub unresolved: usize,
}

/// Join `records` against `catalog`, keeping page order.
///
/// Records whose catalog item is missing are omitted and counted.
pub fn join_catalog(records: &[InventoryRecord], catalog: &[CatalogItemRecord]) -> JoinOutcome {
    let by_id: HashMap<CatalogItemId, &CatalogItemRecord> =
        catalog.iter().map(|c| (c.id, c)).collect();

    let mut items = Vec::with_capacity(records.len());
    let mut unresolved = 0;
    for record in records {
        match by_id.get(&record.catalog_item_id) {
            Some(entry) => items.push(EnrichedInventoryItem::join(record, entry)),
            None => unresolved += 1,
        }
    }

    JoinOutcome { items, unresolved }
}
