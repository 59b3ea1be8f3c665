// ============================================================================
// Application Context
// ============================================================================
//
// Shared singletons owned by the supervisor and cloned into every request
// handler and middleware. Optional subsystems (registry, blockchain, MQTT)
// are None when disabled or unreachable at startup; everything downstream
// must tolerate their absence.
//
// ============================================================================

use std::sync::Arc;

use crate::auth::{AuthorizationClient, IdentityClient};
use crate::blockchain::BlockchainGateway;
use crate::config::Config;
use crate::gateway::DynamicProxy;
use crate::metrics::GatewayMetrics;
use crate::middleware::RateLimiter;
use crate::mqtt::MqttBridge;
use crate::registry::RegistryClient;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub registry: Option<Arc<RegistryClient>>,
    pub identity: Arc<IdentityClient>,
    pub authorization: Arc<AuthorizationClient>,
    pub proxy: Arc<DynamicProxy>,
    pub blockchain: Option<Arc<BlockchainGateway>>,
    pub mqtt: Option<Arc<MqttBridge>>,
    pub metrics: Arc<GatewayMetrics>,
    pub rate_limiter: Option<RateLimiter>,
}

impl AppContext {
    pub fn new(
        config: Arc<Config>,
        registry: Option<Arc<RegistryClient>>,
        blockchain: Option<Arc<BlockchainGateway>>,
        mqtt: Option<Arc<MqttBridge>>,
    ) -> Self {
        let identity = Arc::new(IdentityClient::new(config.services.auth_service.base_url()));
        let authorization = Arc::new(AuthorizationClient::new(
            config.services.authorization_service.base_url(),
            config.security.authz_fail_open,
        ));
        let proxy = Arc::new(DynamicProxy::new(config.clone(), registry.clone()));
        let rate_limiter = if config.security.rate_limit.enabled {
            Some(RateLimiter::new(
                config.security.rate_limit.rps,
                config.security.rate_limit.burst,
            ))
        } else {
            None
        };

        Self {
            config,
            registry,
            identity,
            authorization,
            proxy,
            blockchain,
            mqtt,
            metrics: Arc::new(GatewayMetrics::new()),
            rate_limiter,
        }
    }
}
