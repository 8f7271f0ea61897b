//! crates/loyalty_core/src/ports.rs
//!
//! Defines the service contracts (traits) the core requires from the outside
//! world: the remote loyalty REST API and the persistent session storage.
//! Adapters in the kiosk service implement them; tests use in-memory fakes.

use async_trait::async_trait;

use crate::domain::{
    Business, ContactQuery, Credentials, Customer, LoginGrant, ProgressSnapshot, Reward, Visit,
    VisitReceipt,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors of the transport or the storage medium.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The backend answered 401/403 on a scoped endpoint and the session was dropped.
    #[error("Unauthorized")]
    Unauthorized,
    /// Any other non-2xx answer, with the server's own message.
    #[error("Rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    /// The request never got an answer (connection refused, timeout).
    #[error("Backend unreachable: {0}")]
    Unreachable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The remote loyalty API. Every call is scoped by the bearer token the adapter
/// attaches; the core never passes the token explicitly.
#[async_trait]
pub trait LoyaltyBackend: Send + Sync {
    // --- Authentication ---
    async fn login(&self, credentials: &Credentials) -> PortResult<LoginGrant>;

    // --- Visits ---
    async fn register_visit(&self, customer_id: &str, notes: Option<&str>)
        -> PortResult<VisitReceipt>;

    /// Registers a visit for the customer owning `phone`; the server resolves the id.
    async fn register_visit_by_phone(
        &self,
        phone: &str,
        notes: Option<&str>,
    ) -> PortResult<VisitReceipt>;

    async fn list_visits(&self, customer_id: &str) -> PortResult<Vec<Visit>>;

    async fn delete_visit(&self, visit_id: &str) -> PortResult<()>;

    // --- Rewards and progress ---
    async fn list_rewards(&self, customer_id: &str) -> PortResult<Vec<Reward>>;

    async fn get_progress(&self, customer_id: &str) -> PortResult<ProgressSnapshot>;

    // --- Customers ---
    async fn lookup_customer(&self, query: &ContactQuery) -> PortResult<Customer>;

    async fn list_customers(&self) -> PortResult<Vec<Customer>>;

    // --- Cross-tenant control panel ---
    async fn list_businesses(&self) -> PortResult<Vec<Business>>;
}

/// Persistent storage for the serialized session record.
///
/// Implementations must make `write` a single overwrite so that a reader never
/// observes a half-written record.
pub trait SessionStorage: Send + Sync {
    fn read(&self) -> PortResult<Option<String>>;

    fn write(&self, raw: &str) -> PortResult<()>;

    /// Removing a record that does not exist is not an error.
    fn remove(&self) -> PortResult<()>;
}
