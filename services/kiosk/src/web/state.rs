//! services/kiosk/src/web/state.rs
//!
//! Defines the kiosk's shared state.

use std::sync::Arc;

use loyalty_core::ports::LoyaltyBackend;
use loyalty_core::{CheckinOrchestrator, SessionStore};

use crate::config::Config;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub backend: Arc<dyn LoyaltyBackend>,
    pub checkin: Arc<CheckinOrchestrator>,
}

impl AppState {
    /// Wires the orchestrator to the same backend the handlers use.
    pub fn new(
        config: Arc<Config>,
        sessions: Arc<SessionStore>,
        backend: Arc<dyn LoyaltyBackend>,
    ) -> Self {
        let checkin = Arc::new(CheckinOrchestrator::new(
            backend.clone(),
            config.reward_target,
        ));
        Self {
            config,
            sessions,
            backend,
            checkin,
        }
    }
}
