// ============================================================================
// Resource Authorization Gate
// ============================================================================
//
// Invoked from the JWT flow only. The request path is mapped to a
// (resource_type, resource_name, required_access_level) selector; an empty
// selector skips the gate entirely. The remote check runs under a 3 second
// deadline. Transport failure follows the configured outage policy:
// fail-open mirrors the source deployment, fail-closed is one switch away.
//
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::auth::principal::AccessGrant;
use crate::error::{GatewayError, GatewayResult};

const CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// What the authorization service is asked about, derived from the path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceSelector {
    pub resource_type: &'static str,
    pub resource_name: String,
    pub required_level: &'static str,
}

impl ResourceSelector {
    /// Derive a selector from the request path. `None` means the path is
    /// not governed by resource permissions and the gate is skipped.
    pub fn from_path(path: &str) -> Option<Self> {
        if path.starts_with("/api/v1/blockchain/") {
            return Some(Self {
                resource_type: "api_endpoint",
                resource_name: format!("blockchain_{}", blockchain_resource(path)),
                required_level: "read_only",
            });
        }

        if path.starts_with("/api/v1/agents/") {
            return Some(Self {
                resource_type: "api_endpoint",
                resource_name: "agent_chat".to_string(),
                required_level: if path.contains("/api/chat") {
                    "read_write"
                } else {
                    "read_only"
                },
            });
        }

        if path.starts_with("/api/v1/mcp/") {
            return Some(Self {
                resource_type: "mcp_tool",
                resource_name: mcp_resource(path).to_string(),
                required_level: if path.contains("/tools/call") {
                    "read_write"
                } else {
                    "read_only"
                },
            });
        }

        if path.starts_with("/api/v1/gateway/") {
            return Some(Self {
                resource_type: "api_endpoint",
                resource_name: "gateway_management".to_string(),
                required_level: "read_only",
            });
        }

        None
    }
}

fn blockchain_resource(path: &str) -> &'static str {
    if path.contains("/balance/") {
        "balance_check"
    } else if path.contains("/transaction") {
        "transaction"
    } else if path.contains("/status") {
        "status"
    } else {
        "blockchain_general"
    }
}

fn mcp_resource(path: &str) -> &'static str {
    if path.contains("/search") {
        "search"
    } else if path.contains("/tools/call") {
        "tool_execution"
    } else if path.contains("/prompts/get") {
        "prompt_access"
    } else {
        "mcp_general"
    }
}

#[derive(Debug, Deserialize)]
pub struct AccessCheck {
    pub has_access: bool,
    #[serde(default)]
    pub user_access_level: Option<String>,
    #[serde(default)]
    pub permission_source: Option<String>,
    #[serde(default)]
    pub subscription_tier: Option<String>,
    #[serde(default)]
    pub organization_plan: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

pub struct AuthorizationClient {
    base_url: String,
    client: reqwest::Client,
    fail_open: bool,
}

impl AuthorizationClient {
    pub fn new(base_url: String, fail_open: bool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CHECK_TIMEOUT)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .expect("authorization HTTP client");

        Self {
            base_url,
            client,
            fail_open,
        }
    }

    /// Check a user's access to the selected resource. Returns the grant
    /// attributes to attach to the principal, or PermissionDenied.
    pub async fn check_access(
        &self,
        user_id: &str,
        selector: &ResourceSelector,
    ) -> GatewayResult<AccessGrant> {
        let payload = json!({
            "user_id": user_id,
            "resource_type": selector.resource_type,
            "resource_name": selector.resource_name,
            "required_access_level": selector.required_level,
        });

        let response = self
            .client
            .post(format!(
                "{}/api/v1/authorization/check-access",
                self.base_url
            ))
            .json(&payload)
            .send()
            .await;

        let check: AccessCheck = match response {
            Ok(resp) if resp.status().is_success() => match resp.json().await {
                Ok(check) => check,
                Err(e) => {
                    error!(error = %e, user_id = user_id, "Failed to parse access check response");
                    return self.outage_outcome(user_id, selector);
                }
            },
            Ok(resp) => {
                error!(
                    status = %resp.status(),
                    user_id = user_id,
                    "Authorization service returned error status"
                );
                return self.outage_outcome(user_id, selector);
            }
            Err(e) => {
                error!(error = %e, user_id = user_id, "Authorization service request failed");
                return self.outage_outcome(user_id, selector);
            }
        };

        if !check.has_access {
            debug!(
                user_id = user_id,
                resource_type = selector.resource_type,
                resource_name = %selector.resource_name,
                reason = ?check.reason,
                "Access denied by authorization service"
            );
            return Err(GatewayError::PermissionDenied(
                check
                    .reason
                    .unwrap_or_else(|| "user does not have permission to access this resource".into()),
            ));
        }

        debug!(
            user_id = user_id,
            resource_type = selector.resource_type,
            access_level = ?check.user_access_level,
            permission_source = ?check.permission_source,
            "Access granted by authorization service"
        );

        Ok(AccessGrant {
            access_level: check.user_access_level,
            permission_source: check.permission_source,
            subscription_tier: check.subscription_tier,
        })
    }

    fn outage_outcome(
        &self,
        user_id: &str,
        selector: &ResourceSelector,
    ) -> GatewayResult<AccessGrant> {
        if self.fail_open {
            warn!(
                user_id = user_id,
                resource_name = %selector.resource_name,
                "Authorization service unavailable, allowing request (fail-open)"
            );
            Ok(AccessGrant::default())
        } else {
            Err(GatewayError::PermissionDenied(
                "authorization service unavailable".into(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blockchain_paths_map_to_api_endpoint_resources() {
        let selector = ResourceSelector::from_path("/api/v1/blockchain/balance/0xabc").unwrap();
        assert_eq!(selector.resource_type, "api_endpoint");
        assert_eq!(selector.resource_name, "blockchain_balance_check");
        assert_eq!(selector.required_level, "read_only");

        let tx = ResourceSelector::from_path("/api/v1/blockchain/transaction").unwrap();
        assert_eq!(tx.resource_name, "blockchain_transaction");

        let status = ResourceSelector::from_path("/api/v1/blockchain/status").unwrap();
        assert_eq!(status.resource_name, "blockchain_status");

        let other = ResourceSelector::from_path("/api/v1/blockchain/block/latest").unwrap();
        assert_eq!(other.resource_name, "blockchain_blockchain_general");
    }

    #[test]
    fn agent_chat_requires_read_write() {
        let chat = ResourceSelector::from_path("/api/v1/agents/api/chat").unwrap();
        assert_eq!(chat.resource_name, "agent_chat");
        assert_eq!(chat.required_level, "read_write");

        let listing = ResourceSelector::from_path("/api/v1/agents/list").unwrap();
        assert_eq!(listing.required_level, "read_only");
    }

    #[test]
    fn mcp_tool_execution_requires_read_write() {
        let call = ResourceSelector::from_path("/api/v1/mcp/tools/call").unwrap();
        assert_eq!(call.resource_type, "mcp_tool");
        assert_eq!(call.resource_name, "tool_execution");
        assert_eq!(call.required_level, "read_write");

        let search = ResourceSelector::from_path("/api/v1/mcp/search").unwrap();
        assert_eq!(search.resource_name, "search");
        assert_eq!(search.required_level, "read_only");

        let prompts = ResourceSelector::from_path("/api/v1/mcp/prompts/get").unwrap();
        assert_eq!(prompts.resource_name, "prompt_access");

        let other = ResourceSelector::from_path("/api/v1/mcp/resources").unwrap();
        assert_eq!(other.resource_name, "mcp_general");
    }

    #[test]
    fn gateway_management_is_read_only() {
        let selector = ResourceSelector::from_path("/api/v1/gateway/metrics").unwrap();
        assert_eq!(selector.resource_name, "gateway_management");
        assert_eq!(selector.required_level, "read_only");
    }

    #[test]
    fn unmapped_paths_skip_the_gate() {
        assert!(ResourceSelector::from_path("/api/v1/users/42").is_none());
        assert!(ResourceSelector::from_path("/api/v1/models/infer").is_none());
        assert!(ResourceSelector::from_path("/health").is_none());
    }
}
