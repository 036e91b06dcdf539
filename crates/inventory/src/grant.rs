//! Grant request and its validation rules.

use serde::{Deserialize, Serialize};

use holdings_core::{CatalogItemId, UserId, ValidationErrors};

/// Request to add `quantity` units of a catalog item to a user's holdings.
///
/// `userID` and `quantity` default to zero when absent so that a body missing
/// them fails validation (422) rather than decoding (400).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRequest {
    #[serde(rename = "userID", default)]
    pub user_id: UserId,
    #[serde(rename = "catalogItemID")]
    pub catalog_item_id: CatalogItemId,
    #[serde(default)]
    pub quantity: i64,
}

impl GrantRequest {
    /// Run every check and report all failing fields together.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check(self.user_id.is_valid(), "userID", "must be greater than 0");
        errors.check(self.quantity > 0, "quantity", "must be greater than 0");
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(user: i64, quantity: i64) -> GrantRequest {
        GrantRequest {
            user_id: UserId::new(user),
            catalog_item_id: CatalogItemId::new(),
            quantity,
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request(1, 3).validate().is_ok());
    }

    #[test]
    fn reports_both_fields_at_once() {
        let err = request(0, 0).validate().unwrap_err();
        assert_eq!(err.get("userID"), Some("must be greater than 0"));
        assert_eq!(err.get("quantity"), Some("must be greater than 0"));
        assert_eq!(err.fields().len(), 2);
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let err = request(5, -1).validate().unwrap_err();
        assert_eq!(err.get("quantity"), Some("must be greater than 0"));
        assert!(err.get("userID").is_none());
    }

    #[test]
    fn missing_numbers_decode_as_zero() {
        let body = serde_json::json!({ "catalogItemID": CatalogItemId::new() });
        let req: GrantRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.user_id, UserId::new(0));
        assert_eq!(req.quantity, 0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn missing_catalog_item_fails_to_decode() {
        let body = serde_json::json!({ "userID": 1, "quantity": 1 });
        assert!(serde_json::from_value::<GrantRequest>(body).is_err());
    }
}
