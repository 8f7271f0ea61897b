//! services/kiosk/src/web/rest.rs
//!
//! Contains the Axum handlers for the check-in API and the master definition
//! for the OpenAPI specification.

use crate::web::auth::{self, LoginRequest, SessionResponse};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Redirect, Response},
    Extension,
};
use loyalty_core::codec;
use loyalty_core::ports::PortError;
use loyalty_core::{
    Business, CheckinError, CheckinInput, ProgressView, Reward, Session, SessionPhase, LOGIN_ROUTE,
    UNAUTHORIZED_ROUTE,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_handler,
        auth::logout_handler,
        auth::session_handler,
        auth::reset_handler,
        checkin_handler,
        progress_handler,
        qr_payload_handler,
        undo_last_visit_handler,
        list_businesses_handler,
        health_handler,
    ),
    components(
        schemas(
            LoginRequest,
            SessionResponse,
            CheckinRequest,
            InputKind,
            CheckinResponse,
            OutcomeBody,
            QrPayloadResponse,
            ProgressSource,
        )
    ),
    tags(
        (name = "Loyalty Kiosk API", description = "Staff check-in endpoints backed by the loyalty REST API.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// How the `input` field of a check-in request should be read.
#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// QR payload, scanner wedge text or a pasted link.
    #[default]
    Scan,
    Phone,
    Email,
    CustomerId,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckinRequest {
    pub input: String,
    #[serde(default)]
    pub kind: InputKind,
    #[serde(default)]
    pub note: Option<String>,
}

impl CheckinRequest {
    fn into_parts(self) -> (CheckinInput, Option<String>) {
        let input = match self.kind {
            InputKind::Scan => CheckinInput::Scanned(self.input),
            InputKind::Phone => CheckinInput::Phone(self.input),
            InputKind::Email => CheckinInput::Email(self.input),
            InputKind::CustomerId => CheckinInput::CustomerId(self.input),
        };
        (input, self.note)
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckinResponse {
    pub outcome: String,
    pub customer_id: Option<String>,
    pub visit_id: Option<String>,
    pub note: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub new_reward: Option<Reward>,
    #[schema(value_type = Option<Object>)]
    pub progress: Option<ProgressView>,
}

/// Body of every classified failure.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OutcomeBody {
    pub outcome: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QrPayloadResponse {
    pub customer_id: String,
    pub business_id: Option<String>,
    /// The text to render as a QR bitmap.
    pub payload: String,
}

/// Where a punch card comes from.
#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProgressSource {
    /// Derived locally from the visit history.
    #[default]
    Computed,
    /// The backend's own snapshot.
    Server,
}

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    #[serde(default)]
    pub source: ProgressSource,
}

//=========================================================================================
// Error Mapping
//=========================================================================================

/// A check-in outcome other than success, rendered for the browser.
pub struct CheckinFailure(pub CheckinError);

impl From<CheckinError> for CheckinFailure {
    fn from(err: CheckinError) -> Self {
        Self(err)
    }
}

impl IntoResponse for CheckinFailure {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CheckinError::AuthRequired => return Redirect::to(LOGIN_ROUTE).into_response(),
            CheckinError::Forbidden(_) => {
                return Redirect::to(UNAUTHORIZED_ROUTE).into_response()
            }
            // Expected business result, not a failure of the request.
            CheckinError::DuplicateToday { .. } => StatusCode::OK,
            CheckinError::Busy => StatusCode::CONFLICT,
            CheckinError::CustomerNotFound | CheckinError::NothingToUndo => StatusCode::NOT_FOUND,
            CheckinError::UnrecognizedInput | CheckinError::ForeignBusiness => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CheckinError::ServerRejected { .. } => StatusCode::BAD_GATEWAY,
            CheckinError::Unreachable(_) => StatusCode::GATEWAY_TIMEOUT,
        };
        let body = OutcomeBody {
            outcome: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn port_failure(err: PortError) -> Response {
    let (status, outcome) = match &err {
        PortError::Unauthorized => return Redirect::to(LOGIN_ROUTE).into_response(),
        PortError::Rejected { status: 403, .. } => (StatusCode::FORBIDDEN, "forbidden"),
        PortError::Rejected { status: 404, .. } | PortError::NotFound(_) => {
            (StatusCode::NOT_FOUND, "not_found")
        }
        PortError::Unreachable(_) => (StatusCode::GATEWAY_TIMEOUT, "unreachable"),
        PortError::Rejected { .. } | PortError::Unexpected(_) => {
            (StatusCode::BAD_GATEWAY, "server_rejected")
        }
    };
    let body = OutcomeBody {
        outcome: outcome.to_string(),
        message: err.to_string(),
    };
    (status, Json(body)).into_response()
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Register a visit from a scan, a phone number, an email or a customer id.
///
/// A second visit on the same day is answered with `200` and the
/// `duplicate_today` outcome.
#[utoipa::path(
    post,
    path = "/checkin",
    request_body = CheckinRequest,
    responses(
        (status = 200, description = "Visit registered, or already registered today", body = CheckinResponse),
        (status = 303, description = "No session; redirect to the login view"),
        (status = 404, description = "Customer not found", body = OutcomeBody),
        (status = 409, description = "A check-in for this customer is in progress", body = OutcomeBody),
        (status = 422, description = "Unreadable input or a card from another business", body = OutcomeBody),
        (status = 502, description = "The loyalty API rejected the visit", body = OutcomeBody),
        (status = 504, description = "The loyalty API is unreachable", body = OutcomeBody)
    )
)]
pub async fn checkin_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<CheckinRequest>,
) -> Result<Json<CheckinResponse>, CheckinFailure> {
    let (input, note) = req.into_parts();
    let success = state.checkin.check_in(&session, input, note).await?;
    Ok(Json(CheckinResponse {
        outcome: "success".to_string(),
        customer_id: success.customer_id,
        visit_id: success.visit_id,
        note: success.note,
        new_reward: success.new_reward,
        progress: success.progress,
    }))
}

/// The customer's punch card.
#[utoipa::path(
    get,
    path = "/customers/{id}/progress",
    params(
        ("id" = String, Path, description = "Customer identifier"),
        ("source" = Option<ProgressSource>, Query, description = "computed (default) or server")
    ),
    responses(
        (status = 200, description = "Punch card"),
        (status = 502, description = "The loyalty API failed", body = OutcomeBody)
    )
)]
pub async fn progress_handler(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
    Query(query): Query<ProgressQuery>,
) -> Result<Json<ProgressView>, CheckinFailure> {
    let view = match query.source {
        ProgressSource::Computed => state.checkin.refresh_progress(&customer_id).await?,
        ProgressSource::Server => state.checkin.server_progress(&customer_id).await?,
    };
    Ok(Json(view))
}

/// The check-in payload to print on the customer's card.
#[utoipa::path(
    get,
    path = "/customers/{id}/qr-payload",
    params(("id" = String, Path, description = "Customer identifier")),
    responses(
        (status = 200, description = "Encoded payload", body = QrPayloadResponse)
    )
)]
pub async fn qr_payload_handler(
    Extension(session): Extension<Session>,
    Path(customer_id): Path<String>,
) -> Result<Json<QrPayloadResponse>, (StatusCode, String)> {
    let business_id = session.business_id;
    let payload = codec::encode(&customer_id, business_id.as_deref()).map_err(|e| {
        error!("Failed to encode QR payload: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(Json(QrPayloadResponse {
        customer_id,
        business_id,
        payload,
    }))
}

/// Delete the customer's most recent visit. Admins and above only.
#[utoipa::path(
    delete,
    path = "/customers/{id}/visits/last",
    params(("id" = String, Path, description = "Customer identifier")),
    responses(
        (status = 200, description = "Refreshed punch card"),
        (status = 303, description = "Not signed in, or not allowed"),
        (status = 404, description = "No visit to undo", body = OutcomeBody)
    )
)]
pub async fn undo_last_visit_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(customer_id): Path<String>,
) -> Result<Json<ProgressView>, CheckinFailure> {
    let view = state
        .checkin
        .undo_last_visit(&session, &customer_id)
        .await?;
    Ok(Json(view))
}

/// Every business on the platform. Super admins only.
#[utoipa::path(
    get,
    path = "/cp/businesses",
    responses(
        (status = 200, description = "Businesses"),
        (status = 303, description = "Not signed in, or not allowed"),
        (status = 403, description = "The loyalty API refused the listing", body = OutcomeBody)
    )
)]
pub async fn list_businesses_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Business>>, Response> {
    state
        .backend
        .list_businesses()
        .await
        .map(Json)
        .map_err(port_failure)
}

/// Liveness plus the session lifecycle phase.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let session = match state.sessions.phase() {
        SessionPhase::Uninitialized => "uninitialized",
        SessionPhase::Loading => "loading",
        SessionPhase::Ready(Some(_)) => "authenticated",
        SessionPhase::Ready(None) => "anonymous",
    };
    Json(serde_json::json!({ "status": "ok", "session": session }))
}
