//! services/kiosk/src/web/middleware.rs
//!
//! Route guards. Each one asks the core guard whether the current session may
//! proceed and, if so, hands the session to the handler as a request extension.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Redirect, Response},
};
use loyalty_core::{authorize, Authorization, RoleSet};
use serde_json::json;
use tracing::debug;

use crate::web::state::AppState;

async fn guard(state: &AppState, required: RoleSet, mut req: Request, next: Next) -> Response {
    let session = state.sessions.current();
    match authorize(&session, required) {
        Authorization::Allowed => {
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        Authorization::Loading => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "loading" })),
        )
            .into_response(),
        denied => {
            debug!(path = %req.uri().path(), outcome = ?denied, "Request denied by guard.");
            match denied.redirect_target() {
                Some(target) => Redirect::to(target).into_response(),
                None => StatusCode::FORBIDDEN.into_response(),
            }
        }
    }
}

/// Any signed-in operator.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    guard(&state, RoleSet::ANY, req, next).await
}

pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    guard(&state, RoleSet::ADMIN_OR_ABOVE, req, next).await
}

/// Cross-tenant routes.
pub async fn require_super_admin(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    guard(&state, RoleSet::SUPER_ADMIN, req, next).await
}
