//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for flyer resources and the master definition for
//! the OpenAPI specification.

use crate::error::ApiError;
use crate::web::protocol::{
    AddPageRequest, CreateFlyerRequest, DecisionRequest, FooterRequest, PlaceProductRequest,
    PlacePromoRequest, SwapRequest, UpdateFlyerRequest,
};
use crate::web::state::AppState;
use crate::web::{pages, workflow};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use flyer_core::domain::{EditHistoryEntry, Flyer, User};
use flyer_core::view::FlyerView;
use std::sync::Arc;
use tracing::info;
use utoipa::OpenApi;
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_flyers_handler,
        create_flyer_handler,
        get_flyer_handler,
        update_flyer_handler,
        delete_flyer_handler,
        flyer_pdf_handler,
        flyer_history_handler,
        pages::add_page_handler,
        pages::remove_page_handler,
        pages::set_footer_handler,
        pages::place_product_handler,
        pages::place_promo_handler,
        pages::clear_slot_handler,
        pages::swap_slot_handler,
        workflow::submit_handler,
        workflow::pre_approve_handler,
        workflow::pre_reject_handler,
        workflow::approve_handler,
        workflow::reject_handler,
        workflow::expire_handler,
        workflow::workflow_status_handler,
    ),
    components(
        schemas(
            CreateFlyerRequest,
            UpdateFlyerRequest,
            AddPageRequest,
            PlaceProductRequest,
            PlacePromoRequest,
            FooterRequest,
            SwapRequest,
            DecisionRequest,
        )
    ),
    tags(
        (name = "Flyer API", description = "Authoring, placement and approval of promotional flyers.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Flyer Handlers
//=========================================================================================

/// List the flyers visible to the caller.
#[utoipa::path(
    get,
    path = "/flyers",
    responses(
        (status = 200, description = "Flyers with their pages and slots"),
        (status = 401, description = "Missing or unknown x-user-id")
    ),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn list_flyers_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<FlyerView>>, ApiError> {
    Ok(Json(state.flyers.list(&user).await?))
}

/// Create an empty draft flyer owned by the caller.
#[utoipa::path(
    post,
    path = "/flyers",
    request_body = CreateFlyerRequest,
    responses(
        (status = 201, description = "Draft created"),
        (status = 403, description = "Caller may not create flyers"),
        (status = 422, description = "Validity window is inverted")
    ),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn create_flyer_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateFlyerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let flyer = state.flyers.create(&user, req.into()).await?;
    info!(flyer_id = %flyer.id, owner = %user.id, "Flyer created");
    Ok((StatusCode::CREATED, Json(flyer)))
}

#[utoipa::path(
    get,
    path = "/flyers/{id}",
    responses(
        (status = 200, description = "The flyer with its pages and slots"),
        (status = 403, description = "Caller may not view this flyer"),
        (status = 404, description = "No such flyer")
    ),
    params(
        ("id" = Uuid, Path, description = "Flyer id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn get_flyer_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<FlyerView>, ApiError> {
    Ok(Json(state.flyers.get(&user, id).await?))
}

/// Update the metadata of a draft.
#[utoipa::path(
    patch,
    path = "/flyers/{id}",
    request_body = UpdateFlyerRequest,
    responses(
        (status = 200, description = "Updated flyer"),
        (status = 409, description = "Flyer is not a draft"),
        (status = 422, description = "Validity window is inverted")
    ),
    params(
        ("id" = Uuid, Path, description = "Flyer id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn update_flyer_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateFlyerRequest>,
) -> Result<Json<Flyer>, ApiError> {
    Ok(Json(state.flyers.update(&user, id, req.into()).await?))
}

#[utoipa::path(
    delete,
    path = "/flyers/{id}",
    responses(
        (status = 204, description = "Flyer deleted"),
        (status = 403, description = "Caller may not delete this flyer"),
        (status = 404, description = "No such flyer")
    ),
    params(
        ("id" = Uuid, Path, description = "Flyer id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn delete_flyer_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.flyers.delete(&user, id).await?;
    info!(flyer_id = %id, "Flyer deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Download the PDF generated at the last submission.
#[utoipa::path(
    get,
    path = "/flyers/{id}/pdf",
    responses(
        (status = 200, description = "PDF bytes", content_type = "application/pdf"),
        (status = 404, description = "Flyer not found or never submitted")
    ),
    params(
        ("id" = Uuid, Path, description = "Flyer id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn flyer_pdf_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let blob = state.flyers.pdf(&user, id).await?;
    let disposition = format!("inline; filename=\"flyer-{}.pdf\"", id);
    Ok((
        [
            (header::CONTENT_TYPE, blob.mime_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        blob.data,
    ))
}

/// The flyer's edit history, oldest first.
#[utoipa::path(
    get,
    path = "/flyers/{id}/history",
    responses(
        (status = 200, description = "Edit history entries"),
        (status = 404, description = "No such flyer")
    ),
    params(
        ("id" = Uuid, Path, description = "Flyer id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn flyer_history_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EditHistoryEntry>>, ApiError> {
    Ok(Json(state.flyers.history(&user, id).await?))
}
