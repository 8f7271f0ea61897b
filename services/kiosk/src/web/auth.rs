//! services/kiosk/src/web/auth.rs
//!
//! Operator authentication: login against the remote API, logout, the current
//! session summary, and the crash-recovery reset.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Json,
};
use chrono::{DateTime, Utc};
use loyalty_core::ports::PortError;
use loyalty_core::{Credentials, Session, LOGIN_ROUTE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// What the browser may know about the session. The token never leaves the kiosk.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub ready: bool,
    pub authenticated: bool,
    pub role: Option<String>,
    pub business_id: Option<String>,
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        let authenticated = session.is_authenticated();
        Self {
            ready: session.ready,
            authenticated,
            role: authenticated.then(|| session.role.to_string()),
            business_id: session.business_id.clone(),
            user_id: session.user_id.clone(),
            name: session.name.clone(),
            expires_at: session.expires_at,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/login - Exchange operator credentials for a persisted session
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = SessionResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 502, description = "The loyalty API sent an unusable answer"),
        (status = 504, description = "The loyalty API is unreachable")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let credentials = Credentials {
        email: req.email.trim().to_string(),
        password: req.password,
    };

    let grant = state.backend.login(&credentials).await.map_err(|e| match e {
        PortError::Rejected {
            status: 400 | 401 | 403,
            ..
        }
        | PortError::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            "Invalid email or password".to_string(),
        ),
        PortError::Unreachable(reason) => {
            warn!(%reason, "Loyalty API unreachable during login.");
            (
                StatusCode::GATEWAY_TIMEOUT,
                "The loyalty service is unreachable".to_string(),
            )
        }
        other => {
            error!("Login failed: {:?}", other);
            (StatusCode::BAD_GATEWAY, "Login failed".to_string())
        }
    })?;

    let session = state.sessions.establish(grant).map_err(|e| {
        error!("Failed to establish session: {}", e);
        (StatusCode::BAD_GATEWAY, e.to_string())
    })?;

    Ok((StatusCode::OK, Json(SessionResponse::from(&session))))
}

/// POST /auth/logout - Forget the persisted session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Logout successful")
    )
)]
pub async fn logout_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    state.sessions.clear();
    info!("Operator logged out.");
    StatusCode::NO_CONTENT
}

/// GET /auth/session - The current session, without its token
#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Current session", body = SessionResponse)
    )
)]
pub async fn session_handler(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    Json(SessionResponse::from(&state.sessions.current()))
}

/// POST /auth/reset - Clear the session and send the operator back to login
///
/// Offered as the way out after an unexpected failure.
#[utoipa::path(
    post,
    path = "/auth/reset",
    responses(
        (status = 303, description = "Session cleared; redirect to the login view")
    )
)]
pub async fn reset_handler(State(state): State<Arc<AppState>>) -> Redirect {
    state.sessions.clear();
    warn!("Session reset requested.");
    Redirect::to(LOGIN_ROUTE)
}
