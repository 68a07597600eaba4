//! Mounts the route table from spec §6.1. Grounded on
//! `gateway/src/api/mod.rs`'s public/protected split: a `public`
//! sub-router with no middleware merged with a `protected` one gated
//! behind `auth::require_api_token`, then a single `TraceLayer` over
//! the merged whole.

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::auth;
use crate::routes;
use crate::state::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/info", get(routes::info));

    let protected = Router::new()
        .route("/agent/:agentId/run", post(routes::run_agent))
        .route("/agent/:agentId/connect", post(routes::connect_thread))
        .route("/agent/:agentId/stop", post(routes::stop_run))
        .route("/threads", get(routes::list_threads))
        .route("/threads/:id", get(routes::get_thread))
        .route("/threads/:id", delete(routes::delete_thread))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public
        .merge(protected)
        .fallback(routes::not_found_handler)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
