pub mod middleware;
pub mod pages;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod workflow;

pub use middleware::require_user;
pub use rest::ApiDoc;
pub use state::AppState;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Builds every API route behind the user middleware, plus the Swagger UI.
/// CORS and body limits are layered on by the binary.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route(
            "/flyers",
            get(rest::list_flyers_handler).post(rest::create_flyer_handler),
        )
        .route(
            "/flyers/{id}",
            get(rest::get_flyer_handler)
                .patch(rest::update_flyer_handler)
                .delete(rest::delete_flyer_handler),
        )
        .route("/flyers/{id}/pdf", get(rest::flyer_pdf_handler))
        .route("/flyers/{id}/history", get(rest::flyer_history_handler))
        .route("/flyers/{id}/pages", post(pages::add_page_handler))
        .route("/pages/{id}", delete(pages::remove_page_handler))
        .route("/pages/{id}/footer", put(pages::set_footer_handler))
        .route(
            "/pages/{id}/slots/{position}/product",
            put(pages::place_product_handler),
        )
        .route(
            "/pages/{id}/slots/{position}/promo",
            put(pages::place_promo_handler),
        )
        .route("/slots/{id}", delete(pages::clear_slot_handler))
        .route("/slots/{id}/swap", post(pages::swap_slot_handler))
        .route("/flyers/{id}/submit", post(workflow::submit_handler))
        .route("/flyers/{id}/pre-approve", post(workflow::pre_approve_handler))
        .route("/flyers/{id}/pre-reject", post(workflow::pre_reject_handler))
        .route("/flyers/{id}/approve", post(workflow::approve_handler))
        .route("/flyers/{id}/reject", post(workflow::reject_handler))
        .route("/flyers/{id}/expire", post(workflow::expire_handler))
        .route("/flyers/{id}/workflow", get(workflow::workflow_status_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_user,
        ))
        .with_state(state);

    Router::new()
        .merge(protected_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
}
