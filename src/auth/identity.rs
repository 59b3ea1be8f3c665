// ============================================================================
// Identity Service Client
// ============================================================================
//
// Remote verification of external credentials. The gateway never inspects
// tokens itself: a JWT or API key is only as valid as the identity service
// says it is, under a 5 second deadline. A transport failure therefore
// yields no principal (fail-closed).
//
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use crate::error::{GatewayError, GatewayResult};

const VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct TokenVerification {
    pub valid: bool,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiKeyVerification {
    pub valid: bool,
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

pub struct IdentityClient {
    base_url: String,
    client: reqwest::Client,
}

impl IdentityClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .expect("identity HTTP client");

        Self { base_url, client }
    }

    /// POST /api/v1/auth/verify-token with `{token}`
    pub async fn verify_token(&self, token: &str) -> GatewayResult<TokenVerification> {
        let response = self
            .client
            .post(format!("{}/api/v1/auth/verify-token", self.base_url))
            .json(&json!({ "token": token }))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Identity service token verification failed");
                GatewayError::AuthInvalid("identity service unreachable".into())
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::AuthInvalid(format!(
                "identity service returned status {}",
                response.status()
            )));
        }

        let verification: TokenVerification = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse token verification response");
            GatewayError::AuthInvalid("invalid identity service response".into())
        })?;

        if !verification.valid {
            debug!(error = ?verification.error, "Token rejected by identity service");
        }

        Ok(verification)
    }

    /// POST /api/v1/auth/verify-api-key with `{api_key}`
    pub async fn verify_api_key(&self, api_key: &str) -> GatewayResult<ApiKeyVerification> {
        let response = self
            .client
            .post(format!("{}/api/v1/auth/verify-api-key", self.base_url))
            .json(&json!({ "api_key": api_key }))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Identity service API key verification failed");
                GatewayError::AuthInvalid("identity service unreachable".into())
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::AuthInvalid(format!(
                "identity service returned status {}",
                response.status()
            )));
        }

        let verification: ApiKeyVerification = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse API key verification response");
            GatewayError::AuthInvalid("invalid identity service response".into())
        })?;

        if !verification.valid {
            debug!(error = ?verification.error, "API key rejected by identity service");
        }

        Ok(verification)
    }

    /// Liveness probe used by the readiness endpoint
    pub async fn is_reachable(&self) -> bool {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
