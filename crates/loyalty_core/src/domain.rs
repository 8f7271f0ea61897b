//! crates/loyalty_core/src/domain.rs
//!
//! Defines the core data structures shared by every component: the principal,
//! customers, visits, rewards and the progress snapshot the backend returns.
//!
//! Wire JSON uses camelCase keys. Identifiers are opaque: the backend may send
//! them as strings or numbers, and both are accepted and kept as strings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

//=========================================================================================
// Roles
//=========================================================================================

/// The four privilege levels, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Role {
    Barber,
    Admin,
    Owner,
    SuperAdmin,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown role: {0:?}")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ALL: [Role; 4] = [Role::Barber, Role::Admin, Role::Owner, Role::SuperAdmin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Barber => "BARBER",
            Role::Admin => "ADMIN",
            Role::Owner => "OWNER",
            Role::SuperAdmin => "SUPERADMIN",
        }
    }

    pub(crate) const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BARBER" => Ok(Role::Barber),
            "ADMIN" => Ok(Role::Admin),
            "OWNER" => Ok(Role::Owner),
            "SUPERADMIN" => Ok(Role::SuperAdmin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//=========================================================================================
// Session (the authenticated principal)
//=========================================================================================

/// The operator currently signed in to the kiosk.
///
/// `ready` is never persisted; the `SessionStore` sets it once hydration is done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub role: Role,
    pub token: String,
    #[serde(default)]
    pub business_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub ready: bool,
}

impl Session {
    /// The least-privileged value returned when nobody is signed in.
    pub fn anonymous(ready: bool) -> Self {
        Self {
            role: Role::Barber,
            token: String::new(),
            business_id: None,
            user_id: None,
            name: None,
            expires_at: None,
            ready,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !self.token.is_empty()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Every role except `SUPERADMIN` must be confined to one business.
    pub fn has_valid_scope(&self) -> bool {
        self.role == Role::SuperAdmin || self.business_id.is_some()
    }
}

//=========================================================================================
// Customers, Visits, Rewards
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CustomerTag {
    New,
    Friend,
    Vip,
    /// Also absorbs tags this kiosk does not know yet.
    #[default]
    #[serde(other)]
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "nullable_tag")]
    pub tag: CustomerTag,
    #[serde(default, deserialize_with = "optional_opaque_id")]
    pub business_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    #[serde(default, deserialize_with = "optional_opaque_id")]
    pub customer_id: Option<String>,
    #[serde(alias = "createdAt")]
    pub visited_at: DateTime<Utc>,
    #[serde(default, alias = "note")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RewardStatus {
    #[default]
    Pending,
    Redeemed,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    #[serde(default, deserialize_with = "optional_opaque_id")]
    pub customer_id: Option<String>,
    // A freshly issued reward often comes back without a status.
    #[serde(default)]
    pub status: RewardStatus,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl Reward {
    pub fn is_pending(&self) -> bool {
        self.status == RewardStatus::Pending
    }
}

/// Cross-tenant business record, only visible to `SUPERADMIN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

//=========================================================================================
// Progress and check-in receipts
//=========================================================================================

/// The progress snapshot as computed and returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub count: u32,
    pub target: u32,
    #[serde(default)]
    pub to_next_reward: Option<u32>,
    #[serde(default)]
    pub pending: Option<bool>,
}

/// What the backend answered to a successful "register visit" call.
///
/// The response is either `{ progress?, newReward? }` or a plain visit record,
/// so every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitReceipt {
    pub visit: Option<Visit>,
    pub customer_id: Option<String>,
    pub progress: Option<ProgressSnapshot>,
    pub new_reward: Option<Reward>,
}

impl VisitReceipt {
    /// Interprets a raw response body, tolerating both documented shapes.
    pub fn from_value(value: Value) -> Self {
        let progress = value
            .get("progress")
            .and_then(|p| ProgressSnapshot::deserialize(p).ok());
        let new_reward = value
            .get("newReward")
            .filter(|r| !r.is_null())
            .and_then(|r| Reward::deserialize(r).ok());
        let visit = value
            .get("visit")
            .and_then(|v| Visit::deserialize(v).ok())
            .or_else(|| Visit::deserialize(&value).ok());

        let customer_id = visit
            .as_ref()
            .and_then(|v| v.customer_id.clone())
            .or_else(|| id_field(&value, "customerId"))
            .or_else(|| value.get("customer").and_then(|c| id_field(c, "id")));

        Self {
            visit,
            customer_id,
            progress,
            new_reward,
        }
    }
}

//=========================================================================================
// Login and lookup payloads
//=========================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantUser {
    #[serde(default, deserialize_with = "optional_opaque_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// The login response: a bearer token plus whatever the server chose to echo.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginGrant {
    pub token: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "optional_opaque_id")]
    pub business_id: Option<String>,
    #[serde(default)]
    pub user: Option<GrantUser>,
}

/// Body of `POST /customers/lookup`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContactQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

//=========================================================================================
// Opaque identifier helpers
//=========================================================================================

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn id_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(id_from_value)
}

fn opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    id_from_value(&value)
        .ok_or_else(|| serde::de::Error::custom("expected a string or numeric identifier"))
}

fn optional_opaque_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(id_from_value(&value))
}

fn nullable_tag<'de, D>(deserializer: D) -> Result<CustomerTag, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<CustomerTag>::deserialize(deserializer)?.unwrap_or_default())
}
