//! crates/loyalty_core/src/guard.rs
//!
//! Role-based authorization for guarded views and actions. Every rule lives
//! here as a named `RoleSet`; the decision is a pure function of an already
//! hydrated `Session` and never touches the network.

use crate::domain::{Role, Session, UnknownRole};
use crate::session::LOGIN_ROUTE;

/// Where an authenticated but under-privileged operator is sent.
pub const UNAUTHORIZED_ROUTE: &str = "/unauthorized";

/// A fixed set of roles, stored as a bit mask over `Role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RoleSet(u8);

impl RoleSet {
    /// No role requirement: authentication alone is enough.
    pub const ANY: RoleSet = RoleSet(0);
    pub const SUPER_ADMIN: RoleSet = RoleSet::of(&[Role::SuperAdmin]);
    pub const OWNER_OR_ABOVE: RoleSet = RoleSet::of(&[Role::SuperAdmin, Role::Owner]);
    pub const ADMIN_OR_ABOVE: RoleSet = RoleSet::of(&[Role::SuperAdmin, Role::Owner, Role::Admin]);

    pub const fn of(roles: &[Role]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < roles.len() {
            bits |= roles[i].bit();
            i += 1;
        }
        RoleSet(bits)
    }

    /// Builds a set from role names, ignoring case.
    pub fn parse<'a, I>(names: I) -> Result<Self, UnknownRole>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .map(str::parse::<Role>)
            .try_fold(RoleSet::ANY, |set, role| Ok(set.with(role?)))
    }

    pub const fn with(self, role: Role) -> Self {
        RoleSet(self.0 | role.bit())
    }

    pub const fn contains(self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

pub fn is_super_admin(role: Role) -> bool {
    RoleSet::SUPER_ADMIN.contains(role)
}

pub fn owner_or_above(role: Role) -> bool {
    RoleSet::OWNER_OR_ABOVE.contains(role)
}

pub fn admin_or_above(role: Role) -> bool {
    RoleSet::ADMIN_OR_ABOVE.contains(role)
}

/// The outcome of guarding one view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// The session is not hydrated yet; render a placeholder and decide nothing.
    Loading,
    Allowed,
    DeniedNoAuth,
    DeniedForbidden,
}

impl Authorization {
    pub fn redirect_target(&self) -> Option<&'static str> {
        match self {
            Authorization::DeniedNoAuth => Some(LOGIN_ROUTE),
            Authorization::DeniedForbidden => Some(UNAUTHORIZED_ROUTE),
            Authorization::Loading | Authorization::Allowed => None,
        }
    }
}

/// Decides whether `session` may enter a view requiring `required`.
///
/// `SUPERADMIN` passes every role-restricted guard.
pub fn authorize(session: &Session, required: RoleSet) -> Authorization {
    if !session.ready {
        return Authorization::Loading;
    }
    if !session.is_authenticated() {
        return Authorization::DeniedNoAuth;
    }
    if required.is_empty() || session.role == Role::SuperAdmin || required.contains(session.role) {
        Authorization::Allowed
    } else {
        Authorization::DeniedForbidden
    }
}
