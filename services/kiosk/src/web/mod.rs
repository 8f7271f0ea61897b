//! services/kiosk/src/web/mod.rs
//!
//! Assembles the kiosk's HTTP surface.

pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

use std::any::Any;
use std::sync::Arc;

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    middleware as axum_middleware,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer};
use tracing::error;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ConfigError;
use crate::error::KioskError;

pub use middleware::{require_admin, require_session, require_super_admin};
pub use state::AppState;

/// Where the browser goes to clear a broken session.
pub const RECOVERY_ROUTE: &str = "/auth/reset";

/// Builds the complete application: API routes, guards, CORS, panic boundary and Swagger UI.
pub fn router(state: Arc<AppState>) -> Result<Router, KioskError> {
    let origin = state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string()))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Public routes (no session required)
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/session", get(auth::session_handler))
        .route(RECOVERY_ROUTE, post(auth::reset_handler))
        .route("/health", get(rest::health_handler));

    let operator_routes = Router::new()
        .route("/checkin", post(rest::checkin_handler))
        .route("/customers/{id}/progress", get(rest::progress_handler))
        .route("/customers/{id}/qr-payload", get(rest::qr_payload_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    let admin_routes = Router::new()
        .route(
            "/customers/{id}/visits/last",
            delete(rest::undo_last_visit_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ));

    let super_admin_routes = Router::new()
        .route("/cp/businesses", get(rest::list_businesses_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_super_admin,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(operator_routes)
        .merge(admin_routes)
        .merge(super_admin_routes)
        .layer(cors)
        .with_state(state);

    Ok(Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", rest::ApiDoc::openapi()))
        .layer(CatchPanicLayer::custom(handle_panic)))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(%detail, "Handler panicked.");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "The kiosk hit an unexpected error",
            "recovery": RECOVERY_ROUTE,
        })),
    )
        .into_response()
}
