//! Response DTOs.

use serde::Serialize;

/// Fixed acknowledgement body.
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

pub const ITEM_GRANTED: MessageResponse = MessageResponse {
    message: "Item granted successfully",
};

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
