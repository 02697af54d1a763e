//! services/api/src/web/workflow.rs
//!
//! Handlers for submission, review and expiry of flyers.

use crate::error::ApiError;
use crate::web::protocol::DecisionRequest;
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use flyer_core::domain::{ApprovalWorkflow, Flyer, User};
use flyer_core::{Verdict, WorkflowStatus};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// A missing body decides the caller's own approval without a comment.
fn verdict(body: Option<Json<DecisionRequest>>) -> Verdict {
    let Some(Json(req)) = body else {
        return Verdict::default();
    };
    Verdict {
        approval_id: req.approval_id,
        comment: req
            .comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
    }
}

/// Submit a draft for approval. Renders and stores the PDF.
#[utoipa::path(
    post,
    path = "/flyers/{id}/submit",
    responses(
        (status = 200, description = "Flyer is pending approval"),
        (status = 409, description = "Flyer is not a draft"),
        (status = 422, description = "Flyer is incomplete or prices do not match the ERP")
    ),
    params(
        ("id" = Uuid, Path, description = "Flyer id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Flyer>, ApiError> {
    let flyer = state.workflow.submit(&user, id).await?;
    info!(flyer_id = %id, "Flyer submitted for approval");
    Ok(Json(flyer))
}

#[utoipa::path(
    post,
    path = "/flyers/{id}/pre-approve",
    request_body(content = DecisionRequest, description = "Optional; the body may be omitted"),
    responses(
        (status = 200, description = "The workflow after the decision"),
        (status = 401, description = "Caller is not a reviewer of this flyer"),
        (status = 409, description = "Already decided or flyer not pending")
    ),
    params(
        ("id" = Uuid, Path, description = "Flyer id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn pre_approve_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionRequest>>,
) -> Result<Json<ApprovalWorkflow>, ApiError> {
    let workflow = state.workflow.pre_approve(&user, id, verdict(body)).await?;
    Ok(Json(workflow))
}

#[utoipa::path(
    post,
    path = "/flyers/{id}/pre-reject",
    request_body(content = DecisionRequest, description = "Optional; the body may be omitted"),
    responses(
        (status = 200, description = "Flyer returned to draft"),
        (status = 409, description = "Already decided or flyer not pending")
    ),
    params(
        ("id" = Uuid, Path, description = "Flyer id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn pre_reject_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionRequest>>,
) -> Result<Json<Flyer>, ApiError> {
    let flyer = state.workflow.pre_reject(&user, id, verdict(body)).await?;
    info!(flyer_id = %id, reviewer = %user.id, "Flyer rejected during pre-approval");
    Ok(Json(flyer))
}

#[utoipa::path(
    post,
    path = "/flyers/{id}/approve",
    request_body(content = DecisionRequest, description = "Optional; the body may be omitted"),
    responses(
        (status = 200, description = "The flyer, active once enough approvals are in"),
        (status = 401, description = "Caller is not an approver of this flyer"),
        (status = 409, description = "Already decided, pre-approval incomplete, or flyer not pending")
    ),
    params(
        ("id" = Uuid, Path, description = "Flyer id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn approve_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionRequest>>,
) -> Result<Json<Flyer>, ApiError> {
    let flyer = state.workflow.approve(&user, id, verdict(body)).await?;
    Ok(Json(flyer))
}

#[utoipa::path(
    post,
    path = "/flyers/{id}/reject",
    request_body(content = DecisionRequest, description = "Optional; the body may be omitted"),
    responses(
        (status = 200, description = "Flyer returned to draft"),
        (status = 409, description = "Already decided or flyer not pending")
    ),
    params(
        ("id" = Uuid, Path, description = "Flyer id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn reject_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionRequest>>,
) -> Result<Json<Flyer>, ApiError> {
    let flyer = state.workflow.reject(&user, id, verdict(body)).await?;
    info!(flyer_id = %id, reviewer = %user.id, "Flyer rejected");
    Ok(Json(flyer))
}

/// End an active flyer's validity as of yesterday.
#[utoipa::path(
    post,
    path = "/flyers/{id}/expire",
    responses(
        (status = 200, description = "Flyer expired"),
        (status = 409, description = "Flyer is not active")
    ),
    params(
        ("id" = Uuid, Path, description = "Flyer id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn expire_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Flyer>, ApiError> {
    let flyer = state.workflow.expire(&user, id).await?;
    info!(flyer_id = %id, "Flyer expired");
    Ok(Json(flyer))
}

#[utoipa::path(
    get,
    path = "/flyers/{id}/workflow",
    responses(
        (status = 200, description = "Workflow counters and every approval row"),
        (status = 404, description = "Flyer was never submitted")
    ),
    params(
        ("id" = Uuid, Path, description = "Flyer id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn workflow_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowStatus>, ApiError> {
    Ok(Json(state.workflow.status(&user, id).await?))
}
