//! services/api/src/web/pages.rs
//!
//! Handlers for pages and the slots on them.

use crate::error::ApiError;
use crate::web::protocol::{
    AddPageRequest, FooterRequest, PlaceProductRequest, PlacePromoRequest, SwapRequest,
};
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use flyer_core::domain::{Page, Slot, User};
use std::sync::Arc;
use uuid::Uuid;

#[utoipa::path(
    post,
    path = "/flyers/{id}/pages",
    request_body = AddPageRequest,
    responses(
        (status = 201, description = "Page created with eight empty slots"),
        (status = 409, description = "Page number already taken or flyer not a draft"),
        (status = 422, description = "Page numbers start at 1")
    ),
    params(
        ("id" = Uuid, Path, description = "Flyer id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn add_page_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(flyer_id): Path<Uuid>,
    Json(req): Json<AddPageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .placement
        .add_page(&user, flyer_id, req.page_number)
        .await?;
    Ok((StatusCode::CREATED, Json(page)))
}

#[utoipa::path(
    delete,
    path = "/pages/{id}",
    responses(
        (status = 204, description = "Page and its slots removed"),
        (status = 404, description = "No such page")
    ),
    params(
        ("id" = Uuid, Path, description = "Page id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn remove_page_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(page_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.placement.remove_page(&user, page_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Set or clear the footer promo band of page 1.
#[utoipa::path(
    put,
    path = "/pages/{id}/footer",
    request_body = FooterRequest,
    responses(
        (status = 200, description = "Updated page"),
        (status = 422, description = "Only page 1 has a footer band")
    ),
    params(
        ("id" = Uuid, Path, description = "Page id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn set_footer_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(page_id): Path<Uuid>,
    Json(req): Json<FooterRequest>,
) -> Result<Json<Page>, ApiError> {
    let page = state
        .placement
        .set_footer_promo(&user, page_id, req.promo_image_id)
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    put,
    path = "/pages/{id}/slots/{position}/product",
    request_body = PlaceProductRequest,
    responses(
        (status = 200, description = "Slot now holds the product"),
        (status = 409, description = "Slot occupied, covered by a promo, or product already on the flyer"),
        (status = 422, description = "Position outside 0..7 or product lacks a required energy label")
    ),
    params(
        ("id" = Uuid, Path, description = "Page id"),
        ("position" = u8, Path, description = "Slot position, 0..7"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn place_product_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path((page_id, position)): Path<(Uuid, u8)>,
    Json(req): Json<PlaceProductRequest>,
) -> Result<Json<Slot>, ApiError> {
    let slot = state
        .placement
        .place_product(&user, page_id, position, req.product_id)
        .await?;
    Ok(Json(slot))
}

#[utoipa::path(
    put,
    path = "/pages/{id}/slots/{position}/promo",
    request_body = PlacePromoRequest,
    responses(
        (status = 200, description = "Slot now anchors the promo"),
        (status = 409, description = "Span leaves the grid or a covered cell is occupied"),
        (status = 422, description = "Position outside 0..7 or footer-sized promo")
    ),
    params(
        ("id" = Uuid, Path, description = "Page id"),
        ("position" = u8, Path, description = "Anchor position, 0..7"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn place_promo_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path((page_id, position)): Path<(Uuid, u8)>,
    Json(req): Json<PlacePromoRequest>,
) -> Result<Json<Slot>, ApiError> {
    let slot = state
        .placement
        .place_promo(&user, page_id, position, req.promo_image_id, req.promo_size)
        .await?;
    Ok(Json(slot))
}

#[utoipa::path(
    delete,
    path = "/slots/{id}",
    responses(
        (status = 200, description = "The emptied slot"),
        (status = 404, description = "No such slot")
    ),
    params(
        ("id" = Uuid, Path, description = "Slot id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn clear_slot_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<Slot>, ApiError> {
    Ok(Json(state.placement.remove_from_slot(&user, slot_id).await?))
}

/// Exchange a slot's content with another position on the same page.
#[utoipa::path(
    post,
    path = "/slots/{id}/swap",
    request_body = SwapRequest,
    responses(
        (status = 200, description = "Both slots after the swap, source first"),
        (status = 409, description = "The swap would break a promo span")
    ),
    params(
        ("id" = Uuid, Path, description = "Slot id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn swap_slot_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(slot_id): Path<Uuid>,
    Json(req): Json<SwapRequest>,
) -> Result<Json<Vec<Slot>>, ApiError> {
    let slots = state
        .placement
        .swap_slots(&user, slot_id, req.target_position)
        .await?;
    Ok(Json(slots))
}
