use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Query,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::info;

use holdings_inventory::{GrantRequest, ListQuery, RawListParams};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route(
        "/items",
        get(list_items)
            .post(grant_item)
            .fallback(super::system::method_not_allowed),
    )
}

/// `GET /items?user_id=&page=&page_size=&sort=`
pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    params: Result<Query<RawListParams>, QueryRejection>,
) -> axum::response::Response {
    let Query(raw) = match params {
        Ok(q) => q,
        Err(rejection) => return errors::bad_request(rejection.body_text()),
    };

    let query = match ListQuery::parse(&raw) {
        Ok(q) => q,
        Err(fields) => return errors::failed_validation(fields),
    };

    match services.listing.list(&query).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// `POST /items`: grant `quantity` of a catalog item to a user, creating the
/// holding or adding to it.
pub async fn grant_item(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<GrantRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(request) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::bad_request(rejection.body_text()),
    };

    match services.grants.grant(&request).await {
        Ok(outcome) => {
            info!(
                user_id = %request.user_id,
                catalog_item_id = %request.catalog_item_id,
                quantity = request.quantity,
                ?outcome,
                "items granted"
            );
            (StatusCode::OK, Json(dto::ITEM_GRANTED)).into_response()
        }
        Err(e) => errors::reconcile_error_to_response(e),
    }
}
