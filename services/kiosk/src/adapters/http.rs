//! services/kiosk/src/adapters/http.rs
//!
//! This module contains the HTTP adapter, the concrete implementation of the
//! `LoyaltyBackend` port. It talks to the remote loyalty REST API with `reqwest`,
//! resolving every path through the configured `EndpointMap`.
//!
//! Authorization failures are reported to the `SessionStore`, which decides
//! whether the operator must be logged out.

use std::sync::Arc;

use async_trait::async_trait;
use loyalty_core::domain::{
    Business, ContactQuery, Credentials, Customer, LoginGrant, ProgressSnapshot, Reward, Visit,
    VisitReceipt,
};
use loyalty_core::ports::{LoyaltyBackend, PortError, PortResult};
use loyalty_core::{AuthFailure, Capability, EndpointMap, SessionStore};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A REST adapter that implements the `LoyaltyBackend` port.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    endpoints: EndpointMap,
    sessions: Arc<SessionStore>,
}

impl HttpBackend {
    /// Creates a new `HttpBackend` whose requests time out after the configured delay.
    pub fn new(config: &Config, sessions: Arc<SessionStore>) -> PortResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PortError::Unexpected(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
            endpoints: config.endpoints.clone(),
            sessions,
        })
    }

    fn url(&self, capability: Capability, id: Option<&str>) -> PortResult<String> {
        let path = self
            .endpoints
            .path(capability, id)
            .map_err(|_| PortError::NotFound(id.unwrap_or_default().to_string()))?;
        Ok(format!("{}{}", self.base_url, path))
    }

    /// Sends one request and returns the decoded JSON body (`Null` when empty).
    async fn send(
        &self,
        method: Method,
        capability: Capability,
        id: Option<&str>,
        body: Option<Value>,
    ) -> PortResult<Value> {
        let url = self.url(capability, id)?;
        let request_id = Uuid::new_v4();
        debug!(%method, %url, %request_id, "Calling loyalty API.");

        let mut request = self
            .client
            .request(method, &url)
            .header(REQUEST_ID_HEADER, request_id.to_string());
        if capability != Capability::Login {
            let session = self.sessions.current();
            if session.is_authenticated() {
                request = request.bearer_auth(&session.token);
            }
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text).map_err(|e| {
                PortError::Unexpected(format!("Malformed response from {url}: {e}"))
            });
        }

        let message = error_message(&text, status);
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            if let AuthFailure::ForcedLogout { .. } =
                self.sessions.handle_auth_failure(status.as_u16(), capability)
            {
                return Err(PortError::Unauthorized);
            }
        }
        warn!(status = status.as_u16(), %url, %request_id, %message, "Loyalty API rejected the request.");
        Err(PortError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn transport_error(err: reqwest::Error) -> PortError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        PortError::Unreachable(err.to_string())
    } else {
        PortError::Unexpected(err.to_string())
    }
}

/// Picks the most useful human-readable message out of an error response.
fn error_message(body: &str, status: StatusCode) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["message", "error"]
            .iter()
            .find_map(|key| v.get(key).and_then(Value::as_str).map(str::to_string))
    });
    from_json
        .or_else(|| Some(body.trim()).filter(|b| !b.is_empty()).map(str::to_string))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        })
}

fn decode<T: DeserializeOwned>(value: Value) -> PortResult<T> {
    serde_json::from_value(value)
        .map_err(|e| PortError::Unexpected(format!("Unexpected response shape: {e}")))
}

/// Collections arrive either as a bare array or wrapped as `{ "rows": [...] }`.
fn rows<T: DeserializeOwned>(value: Value) -> PortResult<Vec<T>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(mut object) => match object.remove("rows") {
            Some(rows) => decode(rows),
            None => Err(PortError::Unexpected(
                "Expected an array or an object with rows".to_string(),
            )),
        },
        other => decode(other),
    }
}

fn visit_body(extra: Option<(&str, &str)>, notes: Option<&str>) -> Value {
    let mut body = json!({});
    if let Some((key, value)) = extra {
        body[key] = json!(value);
    }
    if let Some(notes) = notes {
        body["notes"] = json!(notes);
    }
    body
}

//=========================================================================================
// LoyaltyBackend Trait Implementation
//=========================================================================================

#[async_trait]
impl LoyaltyBackend for HttpBackend {
    async fn login(&self, credentials: &Credentials) -> PortResult<LoginGrant> {
        let body = json!({ "email": credentials.email, "password": credentials.password });
        let value = self
            .send(Method::POST, Capability::Login, None, Some(body))
            .await?;
        decode(value)
    }

    async fn register_visit(
        &self,
        customer_id: &str,
        notes: Option<&str>,
    ) -> PortResult<VisitReceipt> {
        let value = self
            .send(
                Method::POST,
                Capability::RegisterVisit,
                Some(customer_id),
                Some(visit_body(None, notes)),
            )
            .await?;
        Ok(VisitReceipt::from_value(value))
    }

    async fn register_visit_by_phone(
        &self,
        phone: &str,
        notes: Option<&str>,
    ) -> PortResult<VisitReceipt> {
        let value = self
            .send(
                Method::POST,
                Capability::RegisterVisitByPhone,
                None,
                Some(visit_body(Some(("phone", phone)), notes)),
            )
            .await?;
        Ok(VisitReceipt::from_value(value))
    }

    async fn list_visits(&self, customer_id: &str) -> PortResult<Vec<Visit>> {
        let value = self
            .send(Method::GET, Capability::ListVisits, Some(customer_id), None)
            .await?;
        rows(value)
    }

    async fn delete_visit(&self, visit_id: &str) -> PortResult<()> {
        self.send(Method::DELETE, Capability::DeleteVisit, Some(visit_id), None)
            .await?;
        Ok(())
    }

    async fn list_rewards(&self, customer_id: &str) -> PortResult<Vec<Reward>> {
        let value = self
            .send(Method::GET, Capability::ListRewards, Some(customer_id), None)
            .await?;
        rows(value)
    }

    async fn get_progress(&self, customer_id: &str) -> PortResult<ProgressSnapshot> {
        let mut value = self
            .send(Method::GET, Capability::Progress, Some(customer_id), None)
            .await?;
        let inner = value.get_mut("progress").map(Value::take);
        decode(inner.unwrap_or(value))
    }

    async fn lookup_customer(&self, query: &ContactQuery) -> PortResult<Customer> {
        let body = serde_json::to_value(query)
            .map_err(|e| PortError::Unexpected(format!("Failed to encode lookup: {e}")))?;
        let result = self
            .send(Method::POST, Capability::LookupCustomer, None, Some(body))
            .await;
        let mut value = match result {
            Err(PortError::Rejected { status: 404, .. }) | Ok(Value::Null) => {
                let wanted = query.phone.as_deref().or(query.email.as_deref());
                return Err(PortError::NotFound(wanted.unwrap_or_default().to_string()));
            }
            other => other?,
        };
        let inner = value.get_mut("customer").map(Value::take);
        decode(inner.unwrap_or(value))
    }

    async fn list_customers(&self) -> PortResult<Vec<Customer>> {
        let value = self
            .send(Method::GET, Capability::ListCustomers, None, None)
            .await?;
        rows(value)
    }

    async fn list_businesses(&self) -> PortResult<Vec<Business>> {
        let value = self
            .send(Method::GET, Capability::CpBusinesses, None, None)
            .await?;
        rows(value)
    }
}
