//! Check-in scenarios driven against an in-memory backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Notify;

use loyalty_core::codec::encode;
use loyalty_core::{
    Business, CheckinError, CheckinInput, CheckinOrchestrator, ContactQuery, Credentials,
    Customer, CustomerTag, LoginGrant, LoyaltyBackend, PortError, PortResult, ProgressSnapshot,
    ProgressTarget, Reward, RewardStatus, Role, Session, Visit, VisitReceipt,
};

#[derive(Default)]
struct FakeBackend {
    customers: Vec<Customer>,
    visits: Mutex<HashMap<String, Vec<Visit>>>,
    rewards: Mutex<HashMap<String, Vec<Reward>>>,
    register_calls: AtomicUsize,
    /// When set, `register_visit` waits here before answering.
    gate: Option<Arc<Notify>>,
    /// Answer by-phone registrations with a progress snapshot instead of a visit record.
    snapshot_replies: bool,
}

impl FakeBackend {
    fn with_customers(customers: Vec<Customer>) -> Self {
        Self {
            customers,
            ..Default::default()
        }
    }

    fn seed_visits(&self, customer_id: &str, days_ago: impl IntoIterator<Item = i64>) {
        let now = Utc::now();
        let visits = days_ago
            .into_iter()
            .map(|d| Visit {
                id: format!("{customer_id}-{d}"),
                customer_id: Some(customer_id.to_string()),
                visited_at: now - Duration::days(d),
                notes: None,
            })
            .collect();
        self.visits
            .lock()
            .unwrap()
            .insert(customer_id.to_string(), visits);
    }

    fn visit_count(&self, customer_id: &str) -> usize {
        self.visits
            .lock()
            .unwrap()
            .get(customer_id)
            .map_or(0, Vec::len)
    }

    fn record(&self, customer_id: &str, notes: Option<&str>) -> PortResult<VisitReceipt> {
        if !self.customers.iter().any(|c| c.id == customer_id) {
            return Err(PortError::Rejected {
                status: 404,
                message: "Customer not found".to_string(),
            });
        }

        let today = Utc::now().date_naive();
        let mut visits = self.visits.lock().unwrap();
        let history = visits.entry(customer_id.to_string()).or_default();
        if history.iter().any(|v| v.visited_at.date_naive() == today) {
            return Err(PortError::Rejected {
                status: 409,
                message: "Customer already checked in today".to_string(),
            });
        }

        let visit = Visit {
            id: format!("{customer_id}-new{}", history.len()),
            customer_id: Some(customer_id.to_string()),
            visited_at: Utc::now(),
            notes: notes.map(str::to_string),
        };
        history.push(visit.clone());

        let mut new_reward = None;
        if history.len() % 10 == 0 {
            let reward = Reward {
                id: format!("reward-{}", history.len()),
                customer_id: Some(customer_id.to_string()),
                status: RewardStatus::Pending,
                kind: None,
                note: None,
            };
            self.rewards
                .lock()
                .unwrap()
                .entry(customer_id.to_string())
                .or_default()
                .push(reward.clone());
            new_reward = Some(reward);
        }

        Ok(VisitReceipt {
            visit: Some(visit),
            customer_id: Some(customer_id.to_string()),
            progress: None,
            new_reward,
        })
    }
}

#[async_trait]
impl LoyaltyBackend for FakeBackend {
    async fn login(&self, _credentials: &Credentials) -> PortResult<LoginGrant> {
        Err(PortError::Unexpected("not used".to_string()))
    }

    async fn register_visit(
        &self,
        customer_id: &str,
        notes: Option<&str>,
    ) -> PortResult<VisitReceipt> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.record(customer_id, notes)
    }

    async fn register_visit_by_phone(
        &self,
        phone: &str,
        notes: Option<&str>,
    ) -> PortResult<VisitReceipt> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
        let customer = self
            .customers
            .iter()
            .find(|c| c.phone.as_deref() == Some(digits.as_str()))
            .ok_or_else(|| PortError::NotFound(phone.to_string()))?;
        let receipt = self.record(&customer.id, notes)?;
        if self.snapshot_replies {
            let count = self.visit_count(&customer.id) as u32;
            return Ok(VisitReceipt {
                visit: None,
                customer_id: None,
                progress: Some(ProgressSnapshot {
                    count,
                    target: 10,
                    to_next_reward: None,
                    pending: None,
                }),
                new_reward: receipt.new_reward,
            });
        }
        Ok(receipt)
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
        let mut visits = self.visits.lock().unwrap();
        for history in visits.values_mut() {
            history.retain(|v| v.id != visit_id);
        }
        Ok(())
    }

    async fn list_rewards(&self, customer_id: &str) -> PortResult<Vec<Reward>> {
        Ok(self
            .rewards
            .lock()
            .unwrap()
            .get(customer_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_progress(&self, customer_id: &str) -> PortResult<ProgressSnapshot> {
        Ok(ProgressSnapshot {
            count: self.visit_count(customer_id) as u32,
            target: 10,
            to_next_reward: None,
            pending: None,
        })
    }

    async fn lookup_customer(&self, _query: &ContactQuery) -> PortResult<Customer> {
        // Mimics a backend without the lookup route.
        Err(PortError::Rejected {
            status: 404,
            message: "Cannot POST /customers/lookup".to_string(),
        })
    }

    async fn list_customers(&self) -> PortResult<Vec<Customer>> {
        Ok(self.customers.clone())
    }

    async fn list_businesses(&self) -> PortResult<Vec<Business>> {
        Ok(Vec::new())
    }
}

fn customer(id: &str, phone: &str, email: &str) -> Customer {
    Customer {
        id: id.to_string(),
        name: id.to_uppercase(),
        phone: Some(phone.to_string()),
        email: Some(email.to_string()),
        tag: CustomerTag::New,
        business_id: Some("biz1".to_string()),
    }
}

fn barber() -> Session {
    Session {
        role: Role::Barber,
        token: "tok".to_string(),
        business_id: Some("biz1".to_string()),
        ..Session::anonymous(true)
    }
}

fn orchestrator(backend: Arc<FakeBackend>) -> CheckinOrchestrator {
    CheckinOrchestrator::new(backend, ProgressTarget::default())
}

#[tokio::test]
async fn tenth_visit_completes_the_card() {
    let backend = Arc::new(FakeBackend::with_customers(vec![customer(
        "abc123",
        "5511912345678",
        "ana@example.com",
    )]));
    backend.seed_visits("abc123", 1..=9);
    let checkin = orchestrator(backend.clone());

    let payload = encode("abc123", Some("biz1")).unwrap();
    let success = checkin
        .check_in(&barber(), CheckinInput::Scanned(payload), None)
        .await
        .unwrap();

    assert_eq!(success.customer_id.as_deref(), Some("abc123"));
    assert_eq!(success.note.as_deref(), Some("QR check-in"));
    assert!(success.new_reward.is_some());
    let progress = success.progress.unwrap();
    assert_eq!(progress.count, 10);
    assert_eq!(progress.cycle_position, 10);
    assert!(progress.full_cycle_just_completed);
    assert!(progress.pending);
    assert!(progress.badges.unwrap().full_reward);
}

#[tokio::test]
async fn second_visit_today_is_a_duplicate() {
    let backend = Arc::new(FakeBackend::with_customers(vec![customer(
        "abc123",
        "5511912345678",
        "ana@example.com",
    )]));
    backend.seed_visits("abc123", [0]);
    let checkin = orchestrator(backend.clone());

    let err = checkin
        .check_in(
            &barber(),
            CheckinInput::CustomerId("abc123".to_string()),
            Some("fade".to_string()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CheckinError::DuplicateToday { .. }));
    assert_eq!(backend.visit_count("abc123"), 1);
}

#[tokio::test]
async fn concurrent_attempt_for_same_customer_is_busy() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(FakeBackend {
        gate: Some(gate.clone()),
        ..FakeBackend::with_customers(vec![customer("abc123", "5511912345678", "a@x.io")])
    });
    let checkin = orchestrator(backend.clone());
    let session = barber();

    let first = checkin.check_in(&session, CheckinInput::CustomerId("abc123".into()), None);
    let second = async {
        tokio::task::yield_now().await;
        let outcome = checkin
            .check_in(
                &session,
                CheckinInput::Scanned("https://host/public/customers/abc123/qr.png".into()),
                None,
            )
            .await;
        gate.notify_one();
        outcome
    };

    let (first, second) = tokio::join!(first, second);
    assert!(first.is_ok());
    assert_eq!(second, Err(CheckinError::Busy));
    assert_eq!(backend.register_calls.load(Ordering::SeqCst), 1);

    // The slot is released once the first attempt is over.
    backend.seed_visits("abc123", [3]);
    gate.notify_one();
    assert!(checkin
        .check_in(&session, CheckinInput::CustomerId("abc123".into()), None)
        .await
        .is_ok());
}

#[tokio::test]
async fn phone_and_id_attempts_for_one_customer_settle_as_duplicate() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(FakeBackend {
        gate: Some(gate.clone()),
        ..FakeBackend::with_customers(vec![customer("abc123", "5511912345678", "a@x.io")])
    });
    let checkin = orchestrator(backend.clone());
    let session = barber();

    let by_id = checkin.check_in(&session, CheckinInput::CustomerId("abc123".into()), None);
    let by_phone = async {
        tokio::task::yield_now().await;
        let outcome = checkin
            .check_in(&session, CheckinInput::Phone("+55 11 91234-5678".into()), None)
            .await;
        gate.notify_one();
        outcome
    };

    let (by_id, by_phone) = tokio::join!(by_id, by_phone);
    assert_eq!(by_phone.unwrap().customer_id.as_deref(), Some("abc123"));
    assert!(matches!(by_id, Err(CheckinError::DuplicateToday { .. })));
    assert_eq!(backend.register_calls.load(Ordering::SeqCst), 2);
    assert_eq!(backend.visit_count("abc123"), 1);
}

#[tokio::test]
async fn path_unsafe_card_ids_never_reach_backend() {
    let backend = Arc::new(FakeBackend::with_customers(vec![customer(
        "abc123",
        "5511912345678",
        "a@x.io",
    )]));
    let checkin = orchestrator(backend.clone());

    for id in ["../../visits/v99?", "ana maria#1", "abc123/rewards", "abc123?x=1"] {
        let payload = serde_json::json!({
            "tag": "visit-marker",
            "customerId": id,
            "businessId": "biz1",
        })
        .to_string();
        let err = checkin
            .check_in(&barber(), CheckinInput::Scanned(payload), None)
            .await
            .unwrap_err();
        assert_eq!(err, CheckinError::UnrecognizedInput, "{id:?}");
    }

    assert_eq!(backend.register_calls.load(Ordering::SeqCst), 0);
    assert_eq!(backend.visit_count("abc123"), 0);
}

#[tokio::test]
async fn email_falls_back_to_customer_scan() {
    let backend = Arc::new(FakeBackend::with_customers(vec![
        customer("aaa111", "5511900000000", "bob@example.com"),
        customer("bbb222", "5511912345678", "Ana@Example.com"),
    ]));
    let checkin = orchestrator(backend.clone());

    let success = checkin
        .check_in(&barber(), CheckinInput::Email(" ana@example.com".into()), None)
        .await
        .unwrap();
    assert_eq!(success.customer_id.as_deref(), Some("bbb222"));
    assert_eq!(success.progress.unwrap().count, 1);

    let err = checkin
        .check_in(&barber(), CheckinInput::Email("nobody@example.com".into()), None)
        .await
        .unwrap_err();
    assert_eq!(err, CheckinError::CustomerNotFound);
}

#[tokio::test]
async fn phone_check_in_applies_server_snapshot() {
    let backend = Arc::new(FakeBackend {
        snapshot_replies: true,
        ..FakeBackend::with_customers(vec![customer("ccc333", "5511955554444", "c@x.io")])
    });
    backend.seed_visits("ccc333", 1..=4);
    let checkin = orchestrator(backend.clone());

    let success = checkin
        .check_in(&barber(), CheckinInput::Phone("+55 11 95555-4444".into()), None)
        .await
        .unwrap();
    let progress = success.progress.unwrap();
    assert_eq!(progress.count, 5);
    assert_eq!(progress.cycle_position, 5);
    assert!(progress.badges.unwrap().half_way);
}

#[tokio::test]
async fn unreadable_or_foreign_input_never_reaches_backend() {
    let backend = Arc::new(FakeBackend::with_customers(vec![customer(
        "abc123",
        "5511912345678",
        "a@x.io",
    )]));
    let checkin = orchestrator(backend.clone());

    let err = checkin
        .check_in(&barber(), CheckinInput::Scanned("hi".into()), None)
        .await
        .unwrap_err();
    assert_eq!(err, CheckinError::UnrecognizedInput);

    let foreign = encode("abc123", Some("biz2")).unwrap();
    let err = checkin
        .check_in(&barber(), CheckinInput::Scanned(foreign.clone()), None)
        .await
        .unwrap_err();
    assert_eq!(err, CheckinError::ForeignBusiness);

    let anonymous = Session::anonymous(true);
    let err = checkin
        .check_in(&anonymous, CheckinInput::CustomerId("abc123".into()), None)
        .await
        .unwrap_err();
    assert_eq!(err, CheckinError::AuthRequired);

    assert_eq!(backend.register_calls.load(Ordering::SeqCst), 0);

    // A super admin works across businesses.
    let root = Session {
        role: Role::SuperAdmin,
        business_id: None,
        ..barber()
    };
    assert!(checkin
        .check_in(&root, CheckinInput::Scanned(foreign), None)
        .await
        .is_ok());
}

#[tokio::test]
async fn undo_removes_the_latest_visit() {
    let backend = Arc::new(FakeBackend::with_customers(vec![customer(
        "abc123",
        "5511912345678",
        "a@x.io",
    )]));
    backend.seed_visits("abc123", [5, 1, 3]);
    let checkin = orchestrator(backend.clone());
    let admin = Session {
        role: Role::Admin,
        ..barber()
    };

    let err = checkin.undo_last_visit(&barber(), "abc123").await.unwrap_err();
    assert_eq!(err, CheckinError::Forbidden(Role::Barber));
    assert_eq!(backend.visit_count("abc123"), 3);

    let progress = checkin.undo_last_visit(&admin, "abc123").await.unwrap();
    assert_eq!(progress.count, 2);
    let remaining = backend.list_visits("abc123").await.unwrap();
    assert!(remaining.iter().all(|v| v.id != "abc123-1"));

    backend.seed_visits("abc123", std::iter::empty());
    let err = checkin.undo_last_visit(&admin, "abc123").await.unwrap_err();
    assert_eq!(err, CheckinError::NothingToUndo);
}

#[tokio::test]
async fn server_progress_reads_backend_snapshot() {
    let backend = Arc::new(FakeBackend::default());
    backend.seed_visits("abc123", 1..=12);
    let checkin = orchestrator(backend);

    let view = checkin.server_progress("abc123").await.unwrap();
    assert_eq!(view.count, 12);
    assert_eq!(view.cycle_position, 2);
}
