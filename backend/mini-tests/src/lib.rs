use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod client;
pub mod config;
pub mod extractors;
pub mod grading;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod progress;
pub mod quiz;
pub mod script;
pub mod services;

pub use config::{Config, GraderConfig};
pub use services::AppState;

/// Collector router: the submissions API for the grading client, the admin
/// read API and the arithmetic API.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Browser clients post submissions cross-origin
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler).layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::admin_auth_middleware,
            )),
        )
        .nest("/api", api_routes(app_state.clone()).layer(cors))
        .fallback(handlers::not_found)
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(
                    middlewares::trace::trace_context_middleware,
                ))
                .layer(middleware::from_fn(
                    middlewares::metrics::metrics_middleware,
                )),
        )
}

fn api_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/submissions", post(handlers::submissions::create_submission))
        .route(
            "/submissions/{student_id}",
            get(handlers::submissions::get_student_submissions),
        )
        .route("/add", get(handlers::math::add))
        .route("/subtract", get(handlers::math::subtract))
        .nest("/admin", admin_routes(app_state))
}

fn admin_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/submissions", get(handlers::admin::list_submissions))
        .route("/stats", get(handlers::admin::submission_stats))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::admin_auth_middleware,
        ))
}
