//! crates/loyalty_core/src/checkin.rs
//!
//! End-to-end check-in: resolve the customer, register the visit, classify
//! the outcome and refresh the punch card.
//!
//! Every attempt walks `Idle -> Resolving -> Submitting -> {Success |
//! DuplicateToday | Failed}`. Attempts for the same customer are serialized
//! locally: a second one while the first is still in flight is answered with
//! `Busy` without touching the network.
//!
//! Attempts are keyed by what is known before submitting: `customer:{id}`,
//! `email:{address}` or `phone:{digits}`. A by-phone attempt learns its
//! customer id only from the receipt, so it does not block a concurrent
//! by-id attempt for the same customer. That pair is left to the backend's
//! one-visit-per-day rule, which answers the loser with `DuplicateToday`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::try_join;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec;
use crate::domain::{ContactQuery, Customer, Reward, Role, Session};
use crate::guard::admin_or_above;
use crate::ports::{LoyaltyBackend, PortError};
use crate::progress::{ProgressTarget, ProgressView};

/// Fewer digits than this cannot identify a phone number.
const MIN_PHONE_DIGITS: usize = 7;

static SAME_DAY_DUPLICATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)already\b.*\btoday|same[ -]day|one visit per day|once (?:a|per) day|\bya\b.*\bhoy\b|duplicad",
    )
    .expect("valid regex")
});

/// What the operator typed, scanned or picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckinInput {
    /// QR scan, scanner wedge or pasted text.
    Scanned(String),
    Phone(String),
    Email(String),
    CustomerId(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckinPhase {
    Idle,
    Resolving,
    Submitting,
    Success,
    DuplicateToday,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckinError {
    #[error("Authentication required")]
    AuthRequired,
    #[error("Role {0} may not perform this action")]
    Forbidden(Role),
    /// Expected business rule: the customer already has a visit today.
    #[error("{message}")]
    DuplicateToday { message: String },
    #[error("Customer not found")]
    CustomerNotFound,
    #[error("Unrecognized check-in input")]
    UnrecognizedInput,
    #[error("This card was issued by another business")]
    ForeignBusiness,
    #[error("A check-in for this customer is already in progress")]
    Busy,
    #[error("The customer has no visit to undo")]
    NothingToUndo,
    #[error("Backend unreachable: {0}")]
    Unreachable(String),
    #[error("{message}")]
    ServerRejected { status: Option<u16>, message: String },
}

impl CheckinError {
    /// Stable machine-readable name of the outcome.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckinError::AuthRequired => "auth_required",
            CheckinError::Forbidden(_) => "forbidden",
            CheckinError::DuplicateToday { .. } => "duplicate_today",
            CheckinError::CustomerNotFound => "customer_not_found",
            CheckinError::UnrecognizedInput => "unrecognized_input",
            CheckinError::ForeignBusiness => "foreign_business",
            CheckinError::Busy => "busy",
            CheckinError::NothingToUndo => "nothing_to_undo",
            CheckinError::Unreachable(_) => "unreachable",
            CheckinError::ServerRejected { .. } => "server_rejected",
        }
    }
}

/// Whether a server message reports a second visit on the same day.
pub fn is_same_day_duplicate(message: &str) -> bool {
    SAME_DAY_DUPLICATE.is_match(message)
}

impl From<PortError> for CheckinError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Rejected {
                status: 409,
                message,
            } => CheckinError::DuplicateToday { message },
            PortError::Rejected { message, .. } if is_same_day_duplicate(&message) => {
                CheckinError::DuplicateToday { message }
            }
            PortError::Rejected { status: 404, .. } | PortError::NotFound(_) => {
                CheckinError::CustomerNotFound
            }
            PortError::Rejected { status, message } => CheckinError::ServerRejected {
                status: Some(status),
                message,
            },
            PortError::Unauthorized => CheckinError::AuthRequired,
            PortError::Unreachable(reason) => CheckinError::Unreachable(reason),
            PortError::Unexpected(message) => CheckinError::ServerRejected {
                status: None,
                message,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinSuccess {
    /// Unknown only when a by-phone check-in could not be traced back to a customer.
    pub customer_id: Option<String>,
    pub visit_id: Option<String>,
    pub note: Option<String>,
    pub new_reward: Option<Reward>,
    pub progress: Option<ProgressView>,
}

enum Resolved {
    Customer(String),
    Phone { raw: String, digits: String },
}

pub struct CheckinOrchestrator {
    backend: Arc<dyn LoyaltyBackend>,
    target: ProgressTarget,
    in_flight: Mutex<HashSet<String>>,
}

impl CheckinOrchestrator {
    pub fn new(backend: Arc<dyn LoyaltyBackend>, target: ProgressTarget) -> Self {
        Self {
            backend,
            target,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn target(&self) -> ProgressTarget {
        self.target
    }

    /// Runs one check-in attempt on behalf of `session`.
    pub async fn check_in(
        &self,
        session: &Session,
        input: CheckinInput,
        note: Option<String>,
    ) -> Result<CheckinSuccess, CheckinError> {
        if !session.is_authenticated() {
            return Err(CheckinError::AuthRequired);
        }

        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let mut flight = InFlight::new(&self.in_flight);
        let result = self.attempt(session, input, note, &mut flight).await;

        match &result {
            Ok(success) => info!(
                phase = ?CheckinPhase::Success,
                customer_id = ?success.customer_id,
                "Visit registered."
            ),
            Err(CheckinError::DuplicateToday { message }) => info!(
                phase = ?CheckinPhase::DuplicateToday,
                %message,
                "Customer already checked in today."
            ),
            Err(e) => warn!(phase = ?CheckinPhase::Failed, kind = e.kind(), error = %e, "Check-in failed."),
        }
        result
    }

    async fn attempt(
        &self,
        session: &Session,
        input: CheckinInput,
        note: Option<String>,
        flight: &mut InFlight<'_>,
    ) -> Result<CheckinSuccess, CheckinError> {
        debug!(phase = ?CheckinPhase::Resolving, "Resolving check-in input.");
        let (resolved, note) = match input {
            CheckinInput::Scanned(text) => {
                let decoded = codec::decode(&text).map_err(|_| CheckinError::UnrecognizedInput)?;
                if let (Some(card), Some(ours)) =
                    (decoded.business_id.as_deref(), session.business_id.as_deref())
                {
                    if card != ours && session.role != Role::SuperAdmin {
                        return Err(CheckinError::ForeignBusiness);
                    }
                }
                (Resolved::Customer(decoded.customer_id), note.or(decoded.note))
            }
            CheckinInput::CustomerId(id) => {
                let id = id.trim();
                if id.is_empty() {
                    return Err(CheckinError::UnrecognizedInput);
                }
                (Resolved::Customer(id.to_string()), note)
            }
            CheckinInput::Phone(phone) => {
                let digits = normalize_phone(&phone);
                if digits.len() < MIN_PHONE_DIGITS {
                    return Err(CheckinError::UnrecognizedInput);
                }
                let raw = phone.trim().to_string();
                (Resolved::Phone { raw, digits }, note)
            }
            CheckinInput::Email(email) => {
                let email = normalize_email(&email);
                if !email.contains('@') {
                    return Err(CheckinError::UnrecognizedInput);
                }
                flight.claim(format!("email:{email}"))?;
                let query = ContactQuery {
                    phone: None,
                    email: Some(email),
                };
                (Resolved::Customer(self.resolve_contact(&query).await?), note)
            }
        };

        let (receipt, customer_id) = match resolved {
            Resolved::Customer(id) => {
                flight.claim(format!("customer:{id}"))?;
                debug!(phase = ?CheckinPhase::Submitting, customer_id = %id, "Registering visit.");
                let receipt = self.backend.register_visit(&id, note.as_deref()).await?;
                (receipt, Some(id))
            }
            Resolved::Phone { raw, digits } => {
                flight.claim(format!("phone:{digits}"))?;
                debug!(phase = ?CheckinPhase::Submitting, "Registering visit by phone.");
                let receipt = self
                    .backend
                    .register_visit_by_phone(&raw, note.as_deref())
                    .await?;
                let customer_id = match receipt.customer_id.clone() {
                    Some(id) => Some(id),
                    None => {
                        let query = ContactQuery {
                            phone: Some(raw),
                            email: None,
                        };
                        self.resolve_contact(&query).await.ok()
                    }
                };
                (receipt, customer_id)
            }
        };

        let progress = match (&receipt.progress, customer_id.as_deref()) {
            (Some(snapshot), _) => {
                let mut view = ProgressView::from_snapshot(snapshot, self.target);
                view.pending |= receipt.new_reward.is_some();
                Some(view)
            }
            (None, Some(id)) => match self.refresh_progress(id).await {
                Ok(view) => Some(view),
                Err(e) => {
                    warn!(customer_id = %id, error = %e, "Visit registered but progress refresh failed.");
                    None
                }
            },
            (None, None) => None,
        };

        Ok(CheckinSuccess {
            customer_id,
            visit_id: receipt.visit.map(|v| v.id),
            note,
            new_reward: receipt.new_reward,
            progress,
        })
    }

    /// Re-derives the punch card from freshly fetched visits and rewards.
    pub async fn refresh_progress(&self, customer_id: &str) -> Result<ProgressView, CheckinError> {
        let (visits, rewards) = try_join(
            self.backend.list_visits(customer_id),
            self.backend.list_rewards(customer_id),
        )
        .await?;
        Ok(ProgressView::compute(&visits, self.target).with_rewards(&rewards))
    }

    /// The punch card as the backend computes it.
    pub async fn server_progress(&self, customer_id: &str) -> Result<ProgressView, CheckinError> {
        let snapshot = self.backend.get_progress(customer_id).await?;
        Ok(ProgressView::from_snapshot(&snapshot, self.target))
    }

    /// Deletes the customer's most recent visit and returns the refreshed card.
    /// Admins and above only.
    pub async fn undo_last_visit(
        &self,
        session: &Session,
        customer_id: &str,
    ) -> Result<ProgressView, CheckinError> {
        if !session.is_authenticated() {
            return Err(CheckinError::AuthRequired);
        }
        if !admin_or_above(session.role) {
            return Err(CheckinError::Forbidden(session.role));
        }
        let mut flight = InFlight::new(&self.in_flight);
        flight.claim(format!("customer:{customer_id}"))?;

        let visits = self.backend.list_visits(customer_id).await?;
        let last = visits
            .iter()
            .max_by_key(|v| v.visited_at)
            .ok_or(CheckinError::NothingToUndo)?;
        self.backend.delete_visit(&last.id).await?;
        info!(customer_id, visit_id = %last.id, "Last visit undone.");

        self.refresh_progress(customer_id).await
    }

    /// Finds the customer owning a phone number or email: the lookup endpoint
    /// first, then a linear scan of the full customer list.
    async fn resolve_contact(&self, query: &ContactQuery) -> Result<String, CheckinError> {
        match self.backend.lookup_customer(query).await {
            Ok(customer) => return Ok(customer.id),
            Err(PortError::NotFound(_))
            | Err(PortError::Rejected {
                status: 404 | 405, ..
            }) => debug!("Lookup found nothing; scanning the customer list."),
            Err(e) => return Err(e.into()),
        }

        let customers = self.backend.list_customers().await?;
        customers
            .into_iter()
            .find(|c| matches_contact(c, query))
            .map(|c| c.id)
            .ok_or(CheckinError::CustomerNotFound)
    }
}

fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn matches_contact(customer: &Customer, query: &ContactQuery) -> bool {
    if let (Some(wanted), Some(have)) = (query.email.as_deref(), customer.email.as_deref()) {
        if normalize_email(have) == normalize_email(wanted) {
            return true;
        }
    }
    if let (Some(wanted), Some(have)) = (query.phone.as_deref(), customer.phone.as_deref()) {
        let (wanted, have) = (normalize_phone(wanted), normalize_phone(have));
        if wanted.len() >= MIN_PHONE_DIGITS
            && have.len() >= MIN_PHONE_DIGITS
            && (have.ends_with(&wanted) || wanted.ends_with(&have))
        {
            return true;
        }
    }
    false
}

/// Keys claimed by one attempt, released when the attempt ends however it ends.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    keys: Vec<String>,
}

impl<'a> InFlight<'a> {
    fn new(set: &'a Mutex<HashSet<String>>) -> Self {
        Self {
            set,
            keys: Vec::new(),
        }
    }

    fn claim(&mut self, key: String) -> Result<(), CheckinError> {
        let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(key.clone()) {
            return Err(CheckinError::Busy);
        }
        self.keys.push(key);
        Ok(())
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        for key in &self.keys {
            set.remove(key);
        }
    }
}
