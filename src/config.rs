// ============================================================================
// Gateway Configuration
// ============================================================================
//
// Configuration is layered: built-in defaults, then an optional YAML file
// (configs/gateway.yaml, or the path in GATEWAY_CONFIG), then environment
// variables with the ISA_CLOUD prefix. Nested keys use a double underscore
// in the environment (ISA_CLOUD_SERVER__HTTP_PORT) because a single
// underscore is ambiguous with snake_case key names.
//
// ============================================================================

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level gateway configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default = "defaults::environment")]
    pub environment: String,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub blockchain: BlockchainConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub device_management: DeviceManagementConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "defaults::app_name")]
    pub name: String,
    #[serde(default = "defaults::app_version")]
    pub version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: defaults::app_name(),
            version: defaults::app_version(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "defaults::server_host")]
    pub host: String,
    #[serde(default = "defaults::http_port")]
    pub http_port: u16,
    #[serde(default = "defaults::grpc_port")]
    pub grpc_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::server_host(),
            http_port: defaults::http_port(),
            grpc_port: defaults::grpc_port(),
        }
    }
}

/// Static fallback endpoints for the backend services. The dynamic router
/// consults the service registry first and falls back to these entries when
/// the registry has no healthy instance (or is not reachable at all).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServicesConfig {
    #[serde(default = "defaults::user_service")]
    pub user_service: ServiceEndpoint,
    #[serde(default = "defaults::auth_service")]
    pub auth_service: ServiceEndpoint,
    #[serde(default = "defaults::authorization_service")]
    pub authorization_service: ServiceEndpoint,
    #[serde(default = "defaults::agent_service")]
    pub agent_service: ServiceEndpoint,
    #[serde(default = "defaults::model_service")]
    pub model_service: ServiceEndpoint,
    #[serde(default = "defaults::mcp_service")]
    pub mcp_service: ServiceEndpoint,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            user_service: defaults::user_service(),
            auth_service: defaults::auth_service(),
            authorization_service: defaults::authorization_service(),
            agent_service: defaults::agent_service(),
            model_service: defaults::model_service(),
            mcp_service: defaults::mcp_service(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServiceEndpoint {
    pub host: String,
    pub http_port: u16,
    #[serde(default)]
    pub grpc_port: u16,
    /// Request timeout in seconds
    #[serde(default = "defaults::service_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl ServiceEndpoint {
    /// Base URL for HTTP calls to this endpoint
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.http_port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "defaults::retry_max_attempts")]
    pub max_attempts: u32,
    /// Backoff between attempts in seconds
    #[serde(default = "defaults::retry_backoff")]
    pub backoff: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::retry_max_attempts(),
            backoff: defaults::retry_backoff(),
        }
    }
}

/// Service registry (Consul-style catalog) settings. The registry is
/// optional: when it cannot be reached at startup the gateway logs a warning
/// and serves from the static services map.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RegistryConfig {
    #[serde(default = "defaults::enabled_true")]
    pub enabled: bool,
    #[serde(default = "defaults::registry_address")]
    pub address: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: defaults::registry_address(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
    #[serde(default = "defaults::log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            format: defaults::log_format(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Authorization-service outage policy: allow (true, the source
    /// deployment's posture) or deny (false, recommended for production).
    #[serde(default = "defaults::enabled_true")]
    pub authz_fail_open: bool,
    /// Loopback + known service user-agent auto-authentication. Development
    /// convenience only; the loopback peer check applies even when enabled.
    #[serde(default)]
    pub allow_local_dev_auth: bool,
    /// Shared secret expected in X-Service-Secret for internal callers.
    /// A bare shared secret is a stopgap; rotate it per deployment or swap
    /// this seam for mTLS client certificates.
    #[serde(default)]
    pub service_shared_secret: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cors: CorsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            authz_fail_open: true,
            allow_local_dev_auth: false,
            service_shared_secret: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default = "defaults::enabled_true")]
    pub enabled: bool,
    #[serde(default = "defaults::cors_origins")]
    pub allow_origins: Vec<String>,
    #[serde(default = "defaults::cors_methods")]
    pub allow_methods: Vec<String>,
    #[serde(default = "defaults::cors_headers")]
    pub allow_headers: Vec<String>,
    #[serde(default = "defaults::enabled_true")]
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_origins: defaults::cors_origins(),
            allow_methods: defaults::cors_methods(),
            allow_headers: defaults::cors_headers(),
            allow_credentials: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "defaults::enabled_true")]
    pub enabled: bool,
    /// Sustained requests per second for the single global bucket
    #[serde(default = "defaults::rate_limit_rps")]
    pub rps: u32,
    /// Burst capacity of the bucket
    #[serde(default = "defaults::rate_limit_burst")]
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rps: defaults::rate_limit_rps(),
            burst: defaults::rate_limit_burst(),
        }
    }
}

// ============================================================================
// Blockchain configuration (chain-agnostic)
// ============================================================================

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BlockchainConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "defaults::default_chain")]
    pub default_chain: String,
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub bridge_enabled: bool,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_chain: defaults::default_chain(),
            chains: HashMap::new(),
            bridge_enabled: false,
        }
    }
}

impl BlockchainConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.chains.is_empty() {
            anyhow::bail!("blockchain enabled but no chains configured");
        }
        if !self.chains.contains_key(&self.default_chain) {
            anyhow::bail!(
                "default chain {} not found in configured chains",
                self.default_chain
            );
        }
        for (name, chain) in &self.chains {
            if chain.rpc_endpoint.is_empty() {
                anyhow::bail!("chain {}: rpc_endpoint is required", name);
            }
            if chain.chain_id <= 0 {
                anyhow::bail!("chain {}: chain_id must be positive", name);
            }
        }
        Ok(())
    }

    pub fn default_chain(&self) -> Option<&ChainConfig> {
        self.chains.get(&self.default_chain)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChainConfig {
    /// Chain kind: "isa_chain", "ethereum", "solana", "polygon", "bsc", ...
    #[serde(default = "defaults::chain_type")]
    pub r#type: String,
    pub rpc_endpoint: String,
    #[serde(default)]
    pub chain_id: i64,
    #[serde(default)]
    pub network_name: String,
    /// Never logged or serialized back out
    #[serde(default, skip_serializing)]
    pub private_key: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub contracts: ContractAddresses,
    #[serde(default = "defaults::gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "defaults::gas_price")]
    pub gas_price: String,
    #[serde(default = "defaults::confirmations")]
    pub confirmations: u32,
    /// Chain-native decimal places for rendering balances
    #[serde(default = "defaults::decimals")]
    pub decimals: u8,
    #[serde(default)]
    pub custom: HashMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ContractAddresses {
    #[serde(default)]
    pub isa_token: String,
    #[serde(default)]
    pub isa_nft: String,
    #[serde(default)]
    pub nft_marketplace: String,
    #[serde(default)]
    pub simple_dex: String,
    #[serde(default)]
    pub service_registry: String,
    #[serde(default)]
    pub usage_billing: String,
}

// ============================================================================
// MQTT bridge configuration
// ============================================================================

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MqttConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "defaults::broker_url")]
    pub broker_url: String,
    #[serde(default = "defaults::mqtt_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Keep-alive interval in seconds
    #[serde(default = "defaults::keep_alive")]
    pub keep_alive: u64,
    /// Ping timeout in seconds
    #[serde(default = "defaults::ping_timeout")]
    pub ping_timeout: u64,
    #[serde(default = "defaults::enabled_true")]
    pub clean_session: bool,
    #[serde(default = "defaults::enabled_true")]
    pub auto_reconnect: bool,
    /// QoS level 0..=2 for subscriptions and publishes
    #[serde(default = "defaults::qos")]
    pub qos: u8,
    #[serde(default)]
    pub topics: MqttTopics,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker_url: defaults::broker_url(),
            client_id: defaults::mqtt_client_id(),
            username: String::new(),
            password: String::new(),
            keep_alive: defaults::keep_alive(),
            ping_timeout: defaults::ping_timeout(),
            clean_session: true,
            auto_reconnect: true,
            qos: defaults::qos(),
            topics: MqttTopics::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MqttTopics {
    #[serde(default = "defaults::topic_telemetry")]
    pub device_telemetry: String,
    #[serde(default = "defaults::topic_status")]
    pub device_status: String,
    #[serde(default = "defaults::topic_commands_response")]
    pub device_commands_response: String,
    #[serde(default = "defaults::topic_auth")]
    pub device_auth: String,
    #[serde(default = "defaults::topic_registration")]
    pub device_registration: String,
}

impl Default for MqttTopics {
    fn default() -> Self {
        Self {
            device_telemetry: defaults::topic_telemetry(),
            device_status: defaults::topic_status(),
            device_commands_response: defaults::topic_commands_response(),
            device_auth: defaults::topic_auth(),
            device_registration: defaults::topic_registration(),
        }
    }
}

/// Backend services the MQTT bridge forwards device traffic to
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeviceManagementConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "defaults::device_service")]
    pub device_service: ServiceEndpoint,
    #[serde(default = "defaults::telemetry_service")]
    pub telemetry_service: ServiceEndpoint,
    #[serde(default = "defaults::ota_service")]
    pub ota_service: ServiceEndpoint,
}

impl Default for DeviceManagementConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            device_service: defaults::device_service(),
            telemetry_service: defaults::telemetry_service(),
            ota_service: defaults::ota_service(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional YAML file, and
    /// ISA_CLOUD_* environment variables (highest precedence).
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let path = config_file
            .map(str::to_string)
            .or_else(|| std::env::var("GATEWAY_CONFIG").ok())
            .unwrap_or_else(|| "configs/gateway.yaml".to_string());

        let mut builder = config::Config::builder();
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::from(Path::new(&path)));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("ISA_CLOUD")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: Config = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        cfg.blockchain.validate()?;

        Ok(cfg)
    }

    /// Resolve a logical service name from the static fallback map
    pub fn static_endpoint(&self, service: &str) -> Option<&ServiceEndpoint> {
        match service {
            "users" | "accounts" => Some(&self.services.user_service),
            "auth" => Some(&self.services.auth_service),
            "agents" => Some(&self.services.agent_service),
            "models" => Some(&self.services.model_service),
            "mcp" => Some(&self.services.mcp_service),
            _ => None,
        }
    }

    /// Names and endpoints of the static services, for the management surface
    pub fn static_services(&self) -> Vec<(&'static str, &ServiceEndpoint)> {
        vec![
            ("user_service", &self.services.user_service),
            ("auth_service", &self.services.auth_service),
            ("agent_service", &self.services.agent_service),
            ("model_service", &self.services.model_service),
            ("mcp_service", &self.services.mcp_service),
        ]
    }
}

impl Default for Config {
    fn default() -> Self {
        // serde defaults are the single source of truth
        serde_json::from_value(serde_json::json!({})).expect("default config is valid")
    }
}

mod defaults {
    use super::{RetryConfig, ServiceEndpoint};

    pub fn app_name() -> String {
        "IsA Cloud Gateway".to_string()
    }
    pub fn app_version() -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }
    pub fn environment() -> String {
        "development".to_string()
    }
    pub fn server_host() -> String {
        "0.0.0.0".to_string()
    }
    pub fn http_port() -> u16 {
        8000
    }
    pub fn grpc_port() -> u16 {
        9000
    }
    pub fn enabled_true() -> bool {
        true
    }
    pub fn registry_address() -> String {
        "127.0.0.1:8500".to_string()
    }
    pub fn log_level() -> String {
        "info".to_string()
    }
    pub fn log_format() -> String {
        "json".to_string()
    }
    pub fn service_timeout() -> u64 {
        30
    }
    pub fn retry_max_attempts() -> u32 {
        3
    }
    pub fn retry_backoff() -> u64 {
        1
    }
    pub fn cors_origins() -> Vec<String> {
        vec!["*".to_string()]
    }
    pub fn cors_methods() -> Vec<String> {
        ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
    pub fn cors_headers() -> Vec<String> {
        vec!["*".to_string()]
    }
    pub fn rate_limit_rps() -> u32 {
        100
    }
    pub fn rate_limit_burst() -> u32 {
        200
    }
    pub fn default_chain() -> String {
        "isa_chain".to_string()
    }
    pub fn chain_type() -> String {
        "isa_chain".to_string()
    }
    pub fn gas_limit() -> u64 {
        300_000
    }
    pub fn gas_price() -> String {
        "20000000000".to_string()
    }
    pub fn confirmations() -> u32 {
        1
    }
    pub fn decimals() -> u8 {
        18
    }
    pub fn broker_url() -> String {
        "mqtt://127.0.0.1:1883".to_string()
    }
    pub fn mqtt_client_id() -> String {
        "isa-cloud-gateway".to_string()
    }
    pub fn keep_alive() -> u64 {
        60
    }
    pub fn ping_timeout() -> u64 {
        10
    }
    pub fn qos() -> u8 {
        1
    }
    pub fn topic_telemetry() -> String {
        "devices/+/telemetry".to_string()
    }
    pub fn topic_status() -> String {
        "devices/+/status".to_string()
    }
    pub fn topic_commands_response() -> String {
        "devices/+/commands/response".to_string()
    }
    pub fn topic_auth() -> String {
        "devices/+/auth".to_string()
    }
    pub fn topic_registration() -> String {
        "devices/register".to_string()
    }

    fn endpoint(host: &str, http_port: u16, grpc_port: u16, timeout: u64) -> ServiceEndpoint {
        ServiceEndpoint {
            host: host.to_string(),
            http_port,
            grpc_port,
            timeout,
            retry: RetryConfig::default(),
        }
    }

    pub fn user_service() -> ServiceEndpoint {
        endpoint("localhost", 8100, 9100, 30)
    }
    pub fn auth_service() -> ServiceEndpoint {
        endpoint("localhost", 8101, 9101, 10)
    }
    pub fn authorization_service() -> ServiceEndpoint {
        endpoint("localhost", 8203, 9203, 10)
    }
    pub fn agent_service() -> ServiceEndpoint {
        endpoint("localhost", 8080, 9080, 60)
    }
    pub fn model_service() -> ServiceEndpoint {
        endpoint("localhost", 8082, 9082, 120)
    }
    pub fn mcp_service() -> ServiceEndpoint {
        endpoint("localhost", 8081, 9081, 30)
    }
    pub fn device_service() -> ServiceEndpoint {
        endpoint("localhost", 8110, 9110, 30)
    }
    pub fn telemetry_service() -> ServiceEndpoint {
        endpoint("localhost", 8111, 9111, 30)
    }
    pub fn ota_service() -> ServiceEndpoint {
        endpoint("localhost", 8112, 9112, 30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_static_fallbacks() {
        let cfg = Config::default();
        assert_eq!(cfg.server.http_port, 8000);
        assert_eq!(cfg.server.grpc_port, 9000);
        assert_eq!(cfg.static_endpoint("users").unwrap().http_port, 8100);
        assert_eq!(cfg.static_endpoint("accounts").unwrap().http_port, 8100);
        assert_eq!(cfg.static_endpoint("mcp").unwrap().http_port, 8081);
        assert!(cfg.static_endpoint("sessions").is_none());
    }

    #[test]
    fn blockchain_validation_rejects_missing_default_chain() {
        let cfg = BlockchainConfig {
            enabled: true,
            default_chain: "isa_chain".to_string(),
            chains: HashMap::new(),
            bridge_enabled: false,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn blockchain_validation_accepts_complete_chain() {
        let mut chains = HashMap::new();
        chains.insert(
            "isa_chain".to_string(),
            ChainConfig {
                r#type: "isa_chain".to_string(),
                rpc_endpoint: "http://localhost:8545".to_string(),
                chain_id: 1337,
                network_name: "local".to_string(),
                private_key: String::new(),
                public_key: String::new(),
                contracts: ContractAddresses::default(),
                gas_limit: 300_000,
                gas_price: "20000000000".to_string(),
                confirmations: 1,
                decimals: 18,
                custom: HashMap::new(),
            },
        );
        let cfg = BlockchainConfig {
            enabled: true,
            default_chain: "isa_chain".to_string(),
            chains,
            bridge_enabled: false,
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rate_limit_defaults_match_deployment_profile() {
        let cfg = Config::default();
        assert!(cfg.security.rate_limit.enabled);
        assert_eq!(cfg.security.rate_limit.rps, 100);
        assert_eq!(cfg.security.rate_limit.burst, 200);
        // Fail-open is the documented default posture; production flips it.
        assert!(cfg.security.authz_fail_open);
        assert!(!cfg.security.allow_local_dev_auth);
    }
}
