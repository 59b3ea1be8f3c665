// ============================================================================
// Service Registry Client
// ============================================================================
//
// Thin client over a Consul-style HTTP catalog:
// - register/deregister the gateway itself (HTTP health check at /health)
// - discover healthy instances by logical service name
// - list registered services for internal-service authentication
//
// The registry is optional. Callers hold an Option<Arc<RegistryClient>> and
// must fall back to the static services map when it is absent or empty.
//
// ============================================================================

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GatewayError, GatewayResult};

/// A healthy instance of a registered service
#[derive(Clone, Debug, Serialize)]
pub struct ServiceInstance {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub tags: Vec<String>,
}

impl ServiceInstance {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Whether this instance advertises SSE/streaming support
    pub fn supports_sse(&self) -> bool {
        self.tags.iter().any(|t| t == "sse" || t == "streaming")
    }
}

pub struct RegistryClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: String,
    name: &'a str,
    address: &'a str,
    port: u16,
    tags: &'a [String],
    check: AgentServiceCheck,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceCheck {
    #[serde(rename = "HTTP")]
    http: String,
    interval: &'static str,
    timeout: &'static str,
    deregister_critical_service_after: &'static str,
}

#[derive(Deserialize)]
struct HealthServiceEntry {
    #[serde(rename = "Service")]
    service: CatalogService,
}

#[derive(Deserialize)]
struct CatalogService {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Service")]
    service: String,
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Tags", default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct AgentService {
    #[serde(rename = "Service")]
    service: String,
    #[serde(rename = "Tags", default)]
    tags: Vec<String>,
}

impl RegistryClient {
    /// Create a client against the catalog at `address` (host:port) and
    /// verify it is reachable.
    pub async fn connect(address: &str) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| GatewayError::Registry(e.to_string()))?;

        let registry = Self {
            base_url: format!("http://{}", address),
            client,
        };

        // A cheap liveness probe so startup can decide to continue without us
        registry
            .client
            .get(format!("{}/v1/agent/services", registry.base_url))
            .send()
            .await
            .map_err(|e| GatewayError::Registry(format!("registry unreachable: {}", e)))?;

        Ok(registry)
    }

    /// Register a service with an HTTP health check at /health.
    /// Interval 10s, timeout 5s, deregistration after 60s critical.
    pub async fn register_service(
        &self,
        name: &str,
        host: &str,
        port: u16,
        tags: &[String],
    ) -> GatewayResult<String> {
        let service_id = format!("{}-{}-{}", name, host, port);
        let registration = AgentServiceRegistration {
            id: service_id.clone(),
            name,
            address: host,
            port,
            tags,
            check: AgentServiceCheck {
                http: format!("http://{}:{}/health", host, port),
                interval: "10s",
                timeout: "5s",
                deregister_critical_service_after: "60s",
            },
        };

        let response = self
            .client
            .put(format!("{}/v1/agent/service/register", self.base_url))
            .json(&registration)
            .send()
            .await
            .map_err(|e| GatewayError::Registry(format!("failed to register service: {}", e)))?;

        if !response.status().is_success() {
            return Err(GatewayError::Registry(format!(
                "registry rejected registration: status {}",
                response.status()
            )));
        }

        info!(
            name = name,
            id = %service_id,
            address = %format!("{}:{}", host, port),
            ?tags,
            "Service registered with registry"
        );

        Ok(service_id)
    }

    /// Remove a service registration
    pub async fn deregister_service(&self, service_id: &str) -> GatewayResult<()> {
        let response = self
            .client
            .put(format!(
                "{}/v1/agent/service/deregister/{}",
                self.base_url, service_id
            ))
            .send()
            .await
            .map_err(|e| GatewayError::Registry(format!("failed to deregister service: {}", e)))?;

        if !response.status().is_success() {
            return Err(GatewayError::Registry(format!(
                "registry rejected deregistration: status {}",
                response.status()
            )));
        }

        info!(id = %service_id, "Service deregistered from registry");
        Ok(())
    }

    /// All currently healthy instances of a service. An empty list is a
    /// valid outcome, not an error.
    pub async fn list_instances(&self, name: &str) -> GatewayResult<Vec<ServiceInstance>> {
        let entries: Vec<HealthServiceEntry> = self
            .client
            .get(format!("{}/v1/health/service/{}", self.base_url, name))
            .query(&[("passing", "true")])
            .send()
            .await
            .map_err(|e| GatewayError::Registry(format!("failed to discover service: {}", e)))?
            .json()
            .await
            .map_err(|e| GatewayError::Registry(format!("invalid discovery response: {}", e)))?;

        let instances = entries
            .into_iter()
            .map(|entry| ServiceInstance {
                id: entry.service.id,
                name: entry.service.service,
                host: entry.service.address,
                port: entry.service.port,
                tags: entry.service.tags,
            })
            .collect();

        Ok(instances)
    }

    /// First healthy instance of a service. The registry is expected to
    /// rotate entries; load balancing stays trivial on purpose.
    pub async fn pick_one(&self, name: &str) -> GatewayResult<Option<ServiceInstance>> {
        let mut instances = self.list_instances(name).await?;
        if instances.is_empty() {
            debug!(service = name, "No healthy instances in registry");
            return Ok(None);
        }
        Ok(Some(instances.remove(0)))
    }

    /// Map of registered service names to their tag sets
    pub async fn list_services(&self) -> GatewayResult<HashMap<String, Vec<String>>> {
        let services: HashMap<String, AgentService> = self
            .client
            .get(format!("{}/v1/agent/services", self.base_url))
            .send()
            .await
            .map_err(|e| GatewayError::Registry(format!("failed to list services: {}", e)))?
            .json()
            .await
            .map_err(|e| GatewayError::Registry(format!("invalid services response: {}", e)))?;

        Ok(services
            .into_values()
            .map(|svc| (svc.service, svc.tags))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_url_and_sse_tag_detection() {
        let instance = ServiceInstance {
            id: "mcp-1".into(),
            name: "mcp".into(),
            host: "10.0.0.5".into(),
            port: 8081,
            tags: vec!["sse".into(), "mcp".into()],
        };
        assert_eq!(instance.base_url(), "http://10.0.0.5:8081");
        assert!(instance.supports_sse());

        let plain = ServiceInstance {
            id: "users-1".into(),
            name: "users".into(),
            host: "10.0.0.6".into(),
            port: 8100,
            tags: vec!["api".into()],
        };
        assert!(!plain.supports_sse());

        let streaming = ServiceInstance {
            tags: vec!["streaming".into()],
            ..plain
        };
        assert!(streaming.supports_sse());
    }

    #[test]
    fn discovery_response_parses_catalog_shape() {
        let raw = r#"[
            {"Service": {"ID": "agents-1", "Service": "agents",
                         "Address": "127.0.0.1", "Port": 8080,
                         "Tags": ["sse", "agent"]}}
        ]"#;
        let entries: Vec<HealthServiceEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].service.service, "agents");
        assert_eq!(entries[0].service.port, 8080);
        assert_eq!(entries[0].service.tags, vec!["sse", "agent"]);
    }

    #[test]
    fn registration_serializes_consul_field_names() {
        let tags = vec!["api".to_string(), "gateway".to_string()];
        let registration = AgentServiceRegistration {
            id: "gateway-localhost-8000".into(),
            name: "gateway",
            address: "localhost",
            port: 8000,
            tags: &tags,
            check: AgentServiceCheck {
                http: "http://localhost:8000/health".into(),
                interval: "10s",
                timeout: "5s",
                deregister_critical_service_after: "60s",
            },
        };
        let value = serde_json::to_value(&registration).unwrap();
        assert_eq!(value["ID"], "gateway-localhost-8000");
        assert_eq!(value["Check"]["HTTP"], "http://localhost:8000/health");
        assert_eq!(value["Check"]["Interval"], "10s");
        assert_eq!(value["Check"]["DeregisterCriticalServiceAfter"], "60s");
    }
}
