//! crates/loyalty_core/src/endpoints.rs
//!
//! A single capability -> endpoint mapping, built once at startup from the
//! built-in defaults plus any overrides, and consulted by the HTTP adapter on
//! every call. Endpoints are never probed at call time.

use std::collections::HashMap;

/// Every remote operation the core knows how to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Login,
    RegisterVisit,
    RegisterVisitByPhone,
    ListVisits,
    DeleteVisit,
    ListRewards,
    Progress,
    LookupCustomer,
    ListCustomers,
    CpBusinesses,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::Login,
        Capability::RegisterVisit,
        Capability::RegisterVisitByPhone,
        Capability::ListVisits,
        Capability::DeleteVisit,
        Capability::ListRewards,
        Capability::Progress,
        Capability::LookupCustomer,
        Capability::ListCustomers,
        Capability::CpBusinesses,
    ];

    /// Suffix of the `ENDPOINT_*` environment variable that overrides this capability.
    pub fn env_key(&self) -> &'static str {
        match self {
            Capability::Login => "LOGIN",
            Capability::RegisterVisit => "REGISTER_VISIT",
            Capability::RegisterVisitByPhone => "REGISTER_VISIT_BY_PHONE",
            Capability::ListVisits => "LIST_VISITS",
            Capability::DeleteVisit => "DELETE_VISIT",
            Capability::ListRewards => "LIST_REWARDS",
            Capability::Progress => "PROGRESS",
            Capability::LookupCustomer => "LOOKUP_CUSTOMER",
            Capability::ListCustomers => "LIST_CUSTOMERS",
            Capability::CpBusinesses => "CP_BUSINESSES",
        }
    }

    fn default_template(&self) -> &'static str {
        match self {
            Capability::Login => "/auth/login",
            Capability::RegisterVisit => "/customers/{id}/visits",
            Capability::RegisterVisitByPhone => "/customers/visits/by-phone",
            Capability::ListVisits => "/customers/{id}/visits",
            Capability::DeleteVisit => "/visits/{id}",
            Capability::ListRewards => "/customers/{id}/rewards",
            Capability::Progress => "/customers/{id}/progress",
            Capability::LookupCustomer => "/customers/lookup",
            Capability::ListCustomers => "/customers",
            Capability::CpBusinesses => "/cp/businesses",
        }
    }

    /// Whether the template must carry an `{id}` placeholder.
    pub fn takes_id(&self) -> bool {
        matches!(
            self,
            Capability::RegisterVisit
                | Capability::ListVisits
                | Capability::DeleteVisit
                | Capability::ListRewards
                | Capability::Progress
        )
    }

    /// A 401/403 from these must not log the operator out: the login call itself,
    /// and cross-tenant endpoints where `SUPERADMIN` may legitimately get a 403.
    pub fn exempt_from_forced_logout(&self) -> bool {
        matches!(self, Capability::Login | Capability::CpBusinesses)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("Endpoint for {0:?} must start with '/': {1}")]
    NotAbsolute(Capability, String),
    #[error("Endpoint for {0:?} must contain an {{id}} placeholder: {1}")]
    MissingPlaceholder(Capability, String),
    #[error("Identifier cannot be used as a path segment: {0:?}")]
    InvalidId(String),
}

#[derive(Debug, Clone)]
pub struct EndpointMap {
    templates: HashMap<Capability, String>,
}

impl Default for EndpointMap {
    fn default() -> Self {
        let templates = Capability::ALL
            .iter()
            .map(|cap| (*cap, cap.default_template().to_string()))
            .collect();
        Self { templates }
    }
}

impl EndpointMap {
    /// Replaces the path template of one capability.
    pub fn set(&mut self, capability: Capability, template: &str) -> Result<(), EndpointError> {
        let template = template.trim();
        if !template.starts_with('/') {
            return Err(EndpointError::NotAbsolute(capability, template.to_string()));
        }
        if capability.takes_id() && !template.contains("{id}") {
            return Err(EndpointError::MissingPlaceholder(
                capability,
                template.to_string(),
            ));
        }
        self.templates.insert(capability, template.to_string());
        Ok(())
    }

    pub fn template(&self, capability: Capability) -> &str {
        self.templates
            .get(&capability)
            .map(String::as_str)
            .unwrap_or_else(|| capability.default_template())
    }

    /// Renders the path for `capability`. A given `id` is percent-encoded into
    /// exactly one path segment.
    pub fn path(
        &self,
        capability: Capability,
        id: Option<&str>,
    ) -> Result<String, EndpointError> {
        let template = self.template(capability);
        let Some(id) = id else {
            return Ok(template.to_string());
        };
        // Dot segments survive encoding and are collapsed by URL parsers.
        if id.is_empty() || id.chars().all(|c| c == '.') {
            return Err(EndpointError::InvalidId(id.to_string()));
        }
        Ok(template.replace("{id}", &urlencoding::encode(id)))
    }
}
