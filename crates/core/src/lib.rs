//! `holdings-core`: shared primitives for the holdings service.
//!
//! This crate contains **pure** building blocks (no IO, no async): identifiers,
//! the domain error model, field validation and optimistic-concurrency helpers.

pub mod error;
pub mod id;
pub mod validation;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::{CatalogItemId, InventoryItemId, MessageId, UserId};
pub use validation::ValidationErrors;
pub use version::ExpectedVersion;
