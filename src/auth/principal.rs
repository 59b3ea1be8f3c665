use serde::Serialize;

/// How an external principal proved its identity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Jwt,
    ApiKey,
}

/// Attributes attached by the authorization service on an allow decision
#[derive(Clone, Debug, Default, Serialize)]
pub struct AccessGrant {
    pub access_level: Option<String>,
    pub permission_source: Option<String>,
    pub subscription_tier: Option<String>,
}

/// The authenticated identity of a request. Constructed once by the
/// authentication middleware and never mutated afterwards.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    /// External caller authenticated through the identity service
    ExternalUser {
        user_id: String,
        email: Option<String>,
        provider: Option<String>,
        auth_method: AuthMethod,
        /// Permission list carried by API keys
        permissions: Vec<String>,
        organization_id: Option<String>,
        #[serde(flatten)]
        grant: AccessGrant,
    },
    /// Service-to-service caller
    InternalService {
        service_name: String,
        is_local_dev: bool,
    },
    /// Unauthenticated caller on an explicitly public path
    Anonymous,
}

impl Principal {
    pub fn is_internal(&self) -> bool {
        matches!(self, Principal::InternalService { .. })
    }

    /// Identifier used for logging and downstream attribution
    pub fn user_id(&self) -> String {
        match self {
            Principal::ExternalUser { user_id, .. } => user_id.clone(),
            Principal::InternalService { service_name, .. } => {
                format!("service-{}", service_name)
            }
            Principal::Anonymous => "anonymous".to_string(),
        }
    }

    pub fn auth_method(&self) -> Option<AuthMethod> {
        match self {
            Principal::ExternalUser { auth_method, .. } => Some(*auth_method),
            _ => None,
        }
    }
}
