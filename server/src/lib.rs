use std::sync::Arc;

use axum::{routing::post, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::{error::ApiError, server_state::ServerState};

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod server_state;

/// Builds the public API surface. Every route carries permissive CORS
/// headers; the layer also answers OPTIONS pre-flights itself.
pub fn build_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/session",
            post(api::session::authenticate).delete(api::session::end_session),
        )
        .route(
            "/location",
            post(api::location::update_location).get(api::location::nearby_drivers),
        )
        .route(
            "/trips",
            post(api::trips::record_trip).get(api::trips::list_trips),
        )
        .fallback(unknown_route)
        .layer(cors)
        .with_state(state)
}

async fn unknown_route() -> ApiError {
    ApiError::NotFound("Not found".to_string())
}
