use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::healthcheck))
        .route(
            "/signalement",
            post(handlers::create_signalement).put(handlers::replace_signalement),
        )
        .route(
            "/signalement/{localization}",
            get(handlers::list_signalements).delete(handlers::delete_signalement),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
