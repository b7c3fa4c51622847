use axum::{
    Router,
    http::{HeaderValue, Method, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;

use crate::{modules, web::AppState};

pub fn build_router(state: AppState, cors_origin: HeaderValue) -> Router {
    // Cookie-carrying requests cannot use a wildcard origin, so CORS pins
    // the one configured frontend.
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .merge(modules::users::router())
        .merge(modules::subjects::router())
        .merge(modules::files::router())
        .layer(cors)
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    "StudyShare API"
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
