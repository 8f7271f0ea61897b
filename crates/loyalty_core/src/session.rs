//! crates/loyalty_core/src/session.rs
//!
//! The process-wide session store. It owns the hydration lifecycle
//! (`Uninitialized -> Loading -> Ready`), persists the principal through a
//! `SessionStorage` port, and decides when an authorization failure must
//! log the operator out.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::{LoginGrant, Role, Session};
use crate::endpoints::Capability;
use crate::ports::{PortError, SessionStorage};
use crate::token::decode_claims;

/// Where the operator is sent after a forced logout.
pub const LOGIN_ROUTE: &str = "/login";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session storage error: {0}")]
    Storage(#[from] PortError),
    #[error("Session could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Login response carried an empty token")]
    EmptyToken,
    #[error("Login response carried no usable role")]
    MissingRole,
    #[error("Role {0} requires a business scope")]
    MissingBusiness(Role),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Loading,
    /// `None` means hydration finished and nobody is signed in.
    Ready(Option<Session>),
}

/// What the caller must do after a 401/403.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    ForcedLogout { redirect_to: &'static str },
    Ignored,
}

pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    phase: RwLock<SessionPhase>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            storage,
            phase: RwLock::new(SessionPhase::Uninitialized),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.read_phase().clone()
    }

    /// Loads the persisted session exactly once. Later calls only return `current()`.
    pub fn hydrate(&self) -> Session {
        {
            let mut phase = self.write_phase();
            if *phase != SessionPhase::Uninitialized {
                drop(phase);
                return self.current();
            }
            *phase = SessionPhase::Loading;
        }

        let loaded = self.load();
        match &loaded {
            Some(session) => info!(role = %session.role, "Session restored from storage."),
            None => info!("No stored session; starting anonymous."),
        }
        *self.write_phase() = SessionPhase::Ready(loaded);
        self.current()
    }

    /// Reads the persisted session. Corrupt, out-of-scope or expired records are
    /// purged and reported as absent.
    pub fn load(&self) -> Option<Session> {
        self.load_at(Utc::now())
    }

    fn load_at(&self, now: DateTime<Utc>) -> Option<Session> {
        let raw = match self.storage.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read stored session; treating as absent.");
                return None;
            }
        };

        let session = match serde_json::from_str::<Session>(&raw) {
            Ok(session) if !session.is_authenticated() || !session.has_valid_scope() => {
                warn!("Stored session is incomplete; purging it.");
                self.purge();
                return None;
            }
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Stored session is malformed; purging it.");
                self.purge();
                return None;
            }
        };

        if session.is_expired_at(now) {
            info!("Stored session has expired; purging it.");
            self.purge();
            return None;
        }

        Some(Session {
            ready: true,
            ..session
        })
    }

    /// Persists `session` with a single write and makes it current.
    pub fn save(&self, session: &Session) -> Result<(), SessionError> {
        let raw = serde_json::to_string(session)?;
        self.storage.write(&raw)?;
        *self.write_phase() = SessionPhase::Ready(Some(Session {
            ready: true,
            ..session.clone()
        }));
        Ok(())
    }

    /// Drops the session from memory and storage. Safe to call repeatedly.
    pub fn clear(&self) {
        self.purge();
        *self.write_phase() = SessionPhase::Ready(None);
    }

    /// The signed-in principal, or the anonymous one. Never fails.
    pub fn current(&self) -> Session {
        match &*self.read_phase() {
            SessionPhase::Ready(Some(session)) => session.clone(),
            SessionPhase::Ready(None) => Session::anonymous(true),
            SessionPhase::Uninitialized | SessionPhase::Loading => Session::anonymous(false),
        }
    }

    /// Builds the principal from a login response and the token's own claims,
    /// then persists it. Claims win over response fields when both are present.
    pub fn establish(&self, grant: LoginGrant) -> Result<Session, SessionError> {
        if grant.token.trim().is_empty() {
            return Err(SessionError::EmptyToken);
        }

        let claims = match decode_claims(&grant.token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                debug!(error = %e, "Token claims unreadable; using login response fields.");
                None
            }
        };

        let role = claims
            .as_ref()
            .and_then(|c| c.role.as_deref())
            .and_then(|r| r.parse::<Role>().ok())
            .or_else(|| grant.role.as_deref().and_then(|r| r.parse::<Role>().ok()))
            .ok_or(SessionError::MissingRole)?;

        let business_id = claims
            .as_ref()
            .and_then(|c| c.business_id())
            .or(grant.business_id);

        let user_id = grant
            .user
            .as_ref()
            .and_then(|u| u.id.clone())
            .or_else(|| claims.as_ref().and_then(|c| c.subject()));

        let session = Session {
            role,
            token: grant.token,
            business_id,
            user_id,
            name: grant.user.and_then(|u| u.name),
            expires_at: claims.as_ref().and_then(|c| c.expires_at()),
            ready: true,
        };

        if !session.has_valid_scope() {
            return Err(SessionError::MissingBusiness(role));
        }

        self.save(&session)?;
        info!(role = %session.role, business_id = ?session.business_id, "Session established.");
        Ok(session)
    }

    /// Reacts to a 401/403 answered for `capability`. Clears the session unless
    /// the capability is exempt from forced logout.
    pub fn handle_auth_failure(&self, status: u16, capability: Capability) -> AuthFailure {
        if !matches!(status, 401 | 403) || capability.exempt_from_forced_logout() {
            return AuthFailure::Ignored;
        }
        warn!(status, ?capability, "Authorization rejected by backend; logging out.");
        self.clear();
        AuthFailure::ForcedLogout {
            redirect_to: LOGIN_ROUTE,
        }
    }

    fn purge(&self) {
        if let Err(e) = self.storage.remove() {
            warn!(error = %e, "Failed to remove stored session.");
        }
    }

    fn read_phase(&self) -> RwLockReadGuard<'_, SessionPhase> {
        self.phase.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_phase(&self) -> RwLockWriteGuard<'_, SessionPhase> {
        self.phase.write().unwrap_or_else(PoisonError::into_inner)
    }
}
