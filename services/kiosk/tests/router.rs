//! The kiosk router driven end to end with an in-memory loyalty backend.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{config, session_store, BARBER_SESSION, OWNER_SESSION, SUPER_ADMIN_SESSION};
use kiosk_lib::web::{router, AppState};
use loyalty_core::codec;
use loyalty_core::{
    Business, ContactQuery, Credentials, Customer, LoginGrant, LoyaltyBackend, PortError,
    PortResult, ProgressSnapshot, Reward, SessionStore, Visit, VisitReceipt,
};

#[derive(Default)]
struct FakeBackend {
    visits: Mutex<HashMap<String, Vec<Visit>>>,
}

#[async_trait]
impl LoyaltyBackend for FakeBackend {
    async fn login(&self, credentials: &Credentials) -> PortResult<LoginGrant> {
        if credentials.password != "secret" {
            return Err(PortError::Rejected {
                status: 401,
                message: "Invalid credentials".to_string(),
            });
        }
        Ok(LoginGrant {
            token: "opaque-token".to_string(),
            role: Some("barber".to_string()),
            business_id: Some("biz1".to_string()),
            user: None,
        })
    }

    async fn register_visit(
        &self,
        customer_id: &str,
        notes: Option<&str>,
    ) -> PortResult<VisitReceipt> {
        let mut visits = self.visits.lock().unwrap();
        let history = visits.entry(customer_id.to_string()).or_default();
        let today = Utc::now().date_naive();
        if history.iter().any(|v| v.visited_at.date_naive() == today) {
            return Err(PortError::Rejected {
                status: 409,
                message: "Customer already checked in today".to_string(),
            });
        }
        let visit = Visit {
            id: format!("v{}", history.len() + 1),
            customer_id: Some(customer_id.to_string()),
            visited_at: Utc::now(),
            notes: notes.map(str::to_string),
        };
        history.push(visit.clone());
        Ok(VisitReceipt {
            customer_id: visit.customer_id.clone(),
            visit: Some(visit),
            ..VisitReceipt::default()
        })
    }

    async fn register_visit_by_phone(
        &self,
        phone: &str,
        _notes: Option<&str>,
    ) -> PortResult<VisitReceipt> {
        Err(PortError::NotFound(phone.to_string()))
    }

    async fn list_visits(&self, customer_id: &str) -> PortResult<Vec<Visit>> {
        Ok(self
            .visits
            .lock()
            .unwrap()
            .get(customer_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_visit(&self, visit_id: &str) -> PortResult<()> {
        for history in self.visits.lock().unwrap().values_mut() {
            history.retain(|v| v.id != visit_id);
        }
        Ok(())
    }

    async fn list_rewards(&self, _customer_id: &str) -> PortResult<Vec<Reward>> {
        Ok(Vec::new())
    }

    async fn get_progress(&self, customer_id: &str) -> PortResult<ProgressSnapshot> {
        Ok(ProgressSnapshot {
            count: self.list_visits(customer_id).await?.len() as u32,
            target: 10,
            to_next_reward: None,
            pending: None,
        })
    }

    async fn lookup_customer(&self, query: &ContactQuery) -> PortResult<Customer> {
        Err(PortError::NotFound(format!("{query:?}")))
    }

    async fn list_customers(&self) -> PortResult<Vec<Customer>> {
        Ok(Vec::new())
    }

    async fn list_businesses(&self) -> PortResult<Vec<Business>> {
        Ok(vec![
            Business {
                id: "biz1".to_string(),
                name: "North".to_string(),
            },
            Business {
                id: "biz2".to_string(),
                name: "South".to_string(),
            },
        ])
    }
}

struct Harness {
    app: Router,
    sessions: Arc<SessionStore>,
}

fn harness(stored: Option<&str>) -> Harness {
    let (sessions, _) = session_store(stored);
    let backend = Arc::new(FakeBackend::default());
    let state = AppState::new(
        Arc::new(config("http://loyalty.invalid")),
        sessions.clone(),
        backend,
    );
    let app = router(Arc::new(state)).unwrap();
    Harness { app, sessions }
}

impl Harness {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, location, body)
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_session_phase() {
    let kiosk = harness(None);
    let (status, _, body) = kiosk.send(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "session": "anonymous"}));
}

#[tokio::test]
async fn anonymous_checkin_redirects_to_login() {
    let kiosk = harness(None);
    let (status, location, _) = kiosk
        .send(post_json("/checkin", json!({"input": "ckx9a8b7c6"})))
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/login"));
}

#[tokio::test]
async fn unhydrated_session_answers_loading() {
    let backend = Arc::new(FakeBackend::default());
    let sessions = Arc::new(SessionStore::new(Arc::new(common::MemoryStorage::default())));
    let state = AppState::new(
        Arc::new(config("http://loyalty.invalid")),
        sessions,
        backend,
    );
    let app = router(Arc::new(state)).unwrap();
    let response = app.oneshot(get("/customers/c1/progress")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn login_persists_session_without_exposing_token() {
    let kiosk = harness(None);

    let (status, _, _) = kiosk
        .send(post_json(
            "/auth/login",
            json!({"email": "ana@example.com", "password": "nope"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = kiosk
        .send(post_json(
            "/auth/login",
            json!({"email": "ana@example.com", "password": "secret"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], json!(true));
    assert_eq!(body["role"], json!("BARBER"));
    assert_eq!(body["businessId"], json!("biz1"));
    assert!(body.get("token").is_none());

    let (_, _, body) = kiosk.send(get("/auth/session")).await;
    assert_eq!(body["role"], json!("BARBER"));
    assert_eq!(kiosk.sessions.current().token, "opaque-token");
}

#[tokio::test]
async fn checkin_then_same_day_duplicate() {
    let kiosk = harness(Some(BARBER_SESSION));
    let payload = codec::encode("abc123", Some("biz1")).unwrap();

    let (status, _, body) = kiosk
        .send(post_json("/checkin", json!({"input": payload})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], json!("success"));
    assert_eq!(body["customerId"], json!("abc123"));
    assert_eq!(body["note"], json!("QR check-in"));
    assert_eq!(body["progress"]["count"], json!(1));
    assert_eq!(body["progress"]["cyclePosition"], json!(1));

    let (status, _, body) = kiosk
        .send(post_json(
            "/checkin",
            json!({"input": "abc123", "kind": "customer_id"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], json!("duplicate_today"));
}

#[tokio::test]
async fn classified_failures_map_to_statuses() {
    let kiosk = harness(Some(BARBER_SESSION));

    let (status, _, body) = kiosk
        .send(post_json("/checkin", json!({"input": "hi"})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["outcome"], json!("unrecognized_input"));

    let foreign = codec::encode("abc123", Some("biz9")).unwrap();
    let (status, _, body) = kiosk
        .send(post_json("/checkin", json!({"input": foreign})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["outcome"], json!("foreign_business"));

    let (status, _, body) = kiosk
        .send(post_json(
            "/checkin",
            json!({"input": "+1 555 010 0199", "kind": "phone"}),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["outcome"], json!("customer_not_found"));
}

#[tokio::test]
async fn undo_requires_admin_or_above() {
    let barber = harness(Some(BARBER_SESSION));
    let request = Request::builder()
        .method("DELETE")
        .uri("/customers/abc123/visits/last")
        .body(Body::empty())
        .unwrap();
    let (status, location, _) = barber.send(request).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/unauthorized"));

    let owner = harness(Some(OWNER_SESSION));
    owner
        .send(post_json(
            "/checkin",
            json!({"input": "abc123", "kind": "customer_id"}),
        ))
        .await;
    let request = Request::builder()
        .method("DELETE")
        .uri("/customers/abc123/visits/last")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = owner.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(0));
}

#[tokio::test]
async fn businesses_are_for_super_admins_only() {
    let owner = harness(Some(OWNER_SESSION));
    let (status, location, _) = owner.send(get("/cp/businesses")).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/unauthorized"));

    let root = harness(Some(SUPER_ADMIN_SESSION));
    let (status, _, body) = root.send(get("/cp/businesses")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn qr_payload_decodes_back_to_customer() {
    let kiosk = harness(Some(OWNER_SESSION));
    let (status, _, body) = kiosk.send(get("/customers/c77x01/qr-payload")).await;
    assert_eq!(status, StatusCode::OK);
    let payload = body["payload"].as_str().unwrap();
    let decoded = codec::decode(payload).unwrap();
    assert_eq!(decoded.customer_id, "c77x01");
    assert_eq!(decoded.business_id.as_deref(), Some("biz1"));
}

#[tokio::test]
async fn server_progress_is_available_on_request() {
    let kiosk = harness(Some(OWNER_SESSION));
    let (status, _, body) = kiosk
        .send(get("/customers/abc123/progress?source=server"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(0));
    assert_eq!(body["target"], json!(10));
    assert_eq!(body["cells"].as_array().map(Vec::len), Some(10));
}

#[tokio::test]
async fn reset_clears_session_and_redirects() {
    let kiosk = harness(Some(OWNER_SESSION));
    let request = Request::builder()
        .method("POST")
        .uri("/auth/reset")
        .body(Body::empty())
        .unwrap();
    let (status, location, _) = kiosk.send(request).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/login"));
    assert!(!kiosk.sessions.current().is_authenticated());
}
