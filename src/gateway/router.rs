// ============================================================================
// Dynamic Router
// ============================================================================
//
// Maps inbound /api/v1/{service}/... paths to a RouteDecision:
// - the first path segment after /api/v1/ is the logical service name
// - /api/v1/users/{id}/sessions/... is owned by the sessions service
// - agents and models receive the full path (they route on the prefix
//   themselves); every other service gets the /api/v1/{service} prefix
//   stripped
// - the registry is consulted first; instance tags sse/streaming select the
//   SSE proxy; the static services map is the fallback; a miss on both is
//   404 {"error":"Service not found"}
//
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, extract::Request, response::Response};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{proxy, sse};
use crate::registry::RegistryClient;

/// Which forwarding loop serves the request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProxyStrategy {
    Standard,
    Sse,
}

/// Everything the proxies need to forward one request
#[derive(Clone, Debug)]
pub struct RouteDecision {
    pub service: String,
    pub target_base_url: String,
    pub rewritten_path: String,
    pub strategy: ProxyStrategy,
}

/// How a path is classified before target selection
#[derive(Debug, PartialEq, Eq)]
enum PathClass {
    /// Not under /api/v1/ - belongs to other handlers
    NotApi,
    /// Gateway management, never proxied
    Gateway,
    /// Dynamic service route
    Service(String),
}

fn classify(path: &str) -> PathClass {
    if !path.starts_with("/api/v1/") {
        return PathClass::NotApi;
    }
    if path.starts_with("/api/v1/gateway/") {
        return PathClass::Gateway;
    }

    let rest = path.trim_start_matches("/api/v1/");
    let parts: Vec<&str> = rest.split('/').collect();
    let service = parts.first().copied().unwrap_or("");
    if service.is_empty() {
        return PathClass::NotApi;
    }

    // /api/v1/users/{id}/sessions/... belongs to the sessions service even
    // though the first segment says users; the path itself is kept intact.
    if service == "users" && parts.len() >= 3 && parts[2] == "sessions" {
        return PathClass::Service("sessions".to_string());
    }

    PathClass::Service(service.to_string())
}

/// Rewrite the forwarded path for a logical service. agents and models
/// expect the full /api/v1/{service} prefix; everyone else mounts their
/// routes at the root.
pub fn rewrite_path(service: &str, path: &str) -> String {
    if service == "agents" || service == "models" || service == "sessions" {
        return path.to_string();
    }
    if let Some(rest) = path.strip_prefix("/api/v1/") {
        match rest.split_once('/') {
            Some((_, tail)) => format!("/{}", tail),
            None => "/".to_string(),
        }
    } else {
        path.to_string()
    }
}

pub struct DynamicProxy {
    config: Arc<Config>,
    registry: Option<Arc<RegistryClient>>,
    /// Pooled client for standard forwarding (30 s)
    http_client: reqwest::Client,
    /// Long-lived client for SSE streams (30 min)
    sse_client: reqwest::Client,
}

impl DynamicProxy {
    pub fn new(config: Arc<Config>, registry: Option<Arc<RegistryClient>>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .expect("proxy HTTP client");

        let sse_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30 * 60))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .expect("proxy SSE client");

        Self {
            config,
            registry,
            http_client,
            sse_client,
        }
    }

    /// Build a RouteDecision for a service path, registry first
    pub async fn resolve(&self, service: &str, path: &str) -> GatewayResult<RouteDecision> {
        if let Some(registry) = &self.registry {
            match registry.pick_one(service).await {
                Ok(Some(instance)) => {
                    let strategy = if instance.supports_sse() {
                        ProxyStrategy::Sse
                    } else {
                        ProxyStrategy::Standard
                    };
                    info!(
                        service = service,
                        instance = %instance.id,
                        target = %instance.base_url(),
                        sse = strategy == ProxyStrategy::Sse,
                        "Routing to discovered service"
                    );
                    return Ok(RouteDecision {
                        service: service.to_string(),
                        target_base_url: instance.base_url(),
                        rewritten_path: rewrite_path(service, path),
                        strategy,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(service = service, error = %e, "Registry lookup failed, using static configuration");
                }
            }
        }

        match self.config.static_endpoint(service) {
            Some(endpoint) => {
                info!(service = service, target = %endpoint.base_url(), "Routing via static configuration");
                Ok(RouteDecision {
                    service: service.to_string(),
                    target_base_url: endpoint.base_url(),
                    rewritten_path: rewrite_path(service, path),
                    strategy: ProxyStrategy::Standard,
                })
            }
            None => {
                warn!(service = service, path = path, "No route for service");
                Err(GatewayError::ServiceNotFound)
            }
        }
    }

    /// Fallback handler for every request no explicit route claimed
    pub async fn dispatch(&self, req: Request<Body>) -> Response {
        let path = req.uri().path().to_string();

        let service = match classify(&path) {
            PathClass::Service(service) => service,
            // Management and non-API paths that reach the fallback have no
            // handler: same 404 surface as an unknown service.
            PathClass::Gateway | PathClass::NotApi => {
                return GatewayError::ServiceNotFound.into();
            }
        };

        let decision = match self.resolve(&service, &path).await {
            Ok(decision) => decision,
            Err(e) => return e.into(),
        };

        let result = match decision.strategy {
            ProxyStrategy::Sse => {
                sse::forward(&self.sse_client, &self.http_client, &decision, req).await
            }
            ProxyStrategy::Standard => proxy::forward(&self.http_client, &decision, req).await,
        };

        result.unwrap_or_else(Into::into)
    }

    /// Probe each static backend's /health endpoint
    pub async fn health_check(&self) -> std::collections::HashMap<String, bool> {
        let mut health = std::collections::HashMap::new();
        for (name, endpoint) in self.config.static_services() {
            let url = format!("{}/health", endpoint.base_url());
            let healthy = match self
                .http_client
                .get(&url)
                .timeout(Duration::from_secs(5))
                .send()
                .await
            {
                Ok(response) => response.status().is_success(),
                Err(e) => {
                    warn!(service = name, error = %e, "Backend health check failed");
                    false
                }
            };
            health.insert(name.to_string(), healthy);
        }
        health
    }
}

impl From<GatewayError> for Response {
    fn from(err: GatewayError) -> Self {
        use axum::response::IntoResponse;
        err.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_api_paths_are_out_of_scope() {
        assert_eq!(classify("/health"), PathClass::NotApi);
        assert_eq!(classify("/metrics"), PathClass::NotApi);
        assert_eq!(classify("/api/v2/users"), PathClass::NotApi);
        assert_eq!(classify("/api/v1/"), PathClass::NotApi);
    }

    #[test]
    fn gateway_paths_are_not_proxied() {
        assert_eq!(classify("/api/v1/gateway/services"), PathClass::Gateway);
        assert_eq!(classify("/api/v1/gateway/metrics"), PathClass::Gateway);
    }

    #[test]
    fn first_segment_names_the_service() {
        assert_eq!(
            classify("/api/v1/agents/chat"),
            PathClass::Service("agents".into())
        );
        assert_eq!(
            classify("/api/v1/mcp/tools/call"),
            PathClass::Service("mcp".into())
        );
        assert_eq!(classify("/api/v1/users"), PathClass::Service("users".into()));
    }

    #[test]
    fn user_sessions_paths_belong_to_the_sessions_service() {
        assert_eq!(
            classify("/api/v1/users/42/sessions"),
            PathClass::Service("sessions".into())
        );
        assert_eq!(
            classify("/api/v1/users/42/sessions/7/messages"),
            PathClass::Service("sessions".into())
        );
        // Plain user paths stay with the users service
        assert_eq!(
            classify("/api/v1/users/42/profile"),
            PathClass::Service("users".into())
        );
    }

    #[test]
    fn agents_and_models_keep_the_full_path() {
        assert_eq!(
            rewrite_path("agents", "/api/v1/agents/chat"),
            "/api/v1/agents/chat"
        );
        assert_eq!(
            rewrite_path("models", "/api/v1/models/infer"),
            "/api/v1/models/infer"
        );
        // The sessions rewrite keeps the original users path intact too
        assert_eq!(
            rewrite_path("sessions", "/api/v1/users/42/sessions"),
            "/api/v1/users/42/sessions"
        );
    }

    #[test]
    fn other_services_lose_their_prefix() {
        assert_eq!(rewrite_path("users", "/api/v1/users/42"), "/42");
        assert_eq!(
            rewrite_path("mcp", "/api/v1/mcp/tools/call"),
            "/tools/call"
        );
        assert_eq!(rewrite_path("auth", "/api/v1/auth"), "/");
    }
}
