// ============================================================================
// Test Utilities
// ============================================================================
//
// Spawns the gateway and mock upstream services (identity, authorization,
// backends, a Consul-style registry, a chain RPC node) on ephemeral
// listeners, so integration tests exercise the real router end to end.
//
// ============================================================================

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use isa_cloud_gateway::blockchain::BlockchainGateway;
use isa_cloud_gateway::config::{Config, ServiceEndpoint};
use isa_cloud_gateway::context::AppContext;
use isa_cloud_gateway::registry::RegistryClient;

/// Serve a router on an ephemeral port and return its address
pub async fn spawn(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

pub fn endpoint_for(addr: SocketAddr) -> ServiceEndpoint {
    ServiceEndpoint {
        host: addr.ip().to_string(),
        http_port: addr.port(),
        grpc_port: 0,
        timeout: 5,
        retry: Default::default(),
    }
}

/// Dead endpoint: a port nothing listens on
pub async fn dead_endpoint() -> ServiceEndpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    endpoint_for(addr)
}

// ============================================================================
// Mock identity + authorization services
// ============================================================================

#[derive(Clone, Default)]
pub struct AuthMocks {
    pub token_calls: Arc<AtomicUsize>,
    pub api_key_calls: Arc<AtomicUsize>,
    pub access_calls: Arc<AtomicUsize>,
    pub last_access_payload: Arc<Mutex<Option<Value>>>,
}

impl AuthMocks {
    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }
    pub fn api_key_calls(&self) -> usize {
        self.api_key_calls.load(Ordering::SeqCst)
    }
    pub fn access_calls(&self) -> usize {
        self.access_calls.load(Ordering::SeqCst)
    }
    pub async fn last_access_payload(&self) -> Option<Value> {
        self.last_access_payload.lock().await.clone()
    }
}

/// Identity service: `valid-jwt-<user>` tokens verify, `good-key` is the
/// one valid API key.
pub fn identity_router(mocks: AuthMocks) -> Router {
    async fn verify_token(
        State(mocks): State<AuthMocks>,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        mocks.token_calls.fetch_add(1, Ordering::SeqCst);
        let token = body["token"].as_str().unwrap_or("");
        match token.strip_prefix("valid-jwt-") {
            Some(user) => Json(json!({
                "valid": true,
                "provider": "google",
                "user_id": user,
                "email": format!("{user}@example.com"),
                "expires_at": "2030-01-01T00:00:00Z",
            })),
            None => Json(json!({ "valid": false, "error": "invalid token" })),
        }
    }

    async fn verify_api_key(
        State(mocks): State<AuthMocks>,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        mocks.api_key_calls.fetch_add(1, Ordering::SeqCst);
        if body["api_key"].as_str() == Some("good-key") {
            Json(json!({
                "valid": true,
                "key_id": "k1",
                "organization_id": "org-1",
                "name": "integration",
                "permissions": ["read", "write"],
            }))
        } else {
            Json(json!({ "valid": false, "error": "unknown key" }))
        }
    }

    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/api/v1/auth/verify-token", post(verify_token))
        .route("/api/v1/auth/verify-api-key", post(verify_api_key))
        .with_state(mocks)
}

/// Authorization service: user `u2` is denied, everyone else allowed
pub fn authorization_router(mocks: AuthMocks) -> Router {
    async fn check_access(
        State(mocks): State<AuthMocks>,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        mocks.access_calls.fetch_add(1, Ordering::SeqCst);
        *mocks.last_access_payload.lock().await = Some(body.clone());

        if body["user_id"].as_str() == Some("u2") {
            Json(json!({
                "has_access": false,
                "reason": "Insufficient permissions",
            }))
        } else {
            Json(json!({
                "has_access": true,
                "user_access_level": "read_only",
                "permission_source": "role",
                "subscription_tier": "pro",
            }))
        }
    }

    Router::new()
        .route("/api/v1/authorization/check-access", post(check_access))
        .with_state(mocks)
}

// ============================================================================
// Mock backend service
// ============================================================================

#[derive(Clone, Default)]
pub struct BackendMock {
    pub hits: Arc<AtomicUsize>,
}

impl BackendMock {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Echoes method/path/query as JSON. Always emits its own CORS header so
/// tests can verify the gateway strips it.
pub fn echo_router(name: &'static str, mock: BackendMock) -> Router {
    Router::new()
        .fallback(move |State(mock): State<BackendMock>, req: Request<Body>| async move {
            mock.hits.fetch_add(1, Ordering::SeqCst);
            let body = json!({
                "service": name,
                "method": req.method().as_str(),
                "path": req.uri().path(),
                "query": req.uri().query(),
            });
            (
                [
                    ("access-control-allow-origin", "*"),
                    ("x-upstream", name),
                ],
                Json(body),
            )
        })
        .with_state(mock)
}

// ============================================================================
// Mock Consul-style registry
// ============================================================================

type RegistryState = Arc<Mutex<HashMap<String, Value>>>;

/// Minimal agent API: register/deregister/list plus passing-only health
/// discovery, backed by an in-memory map keyed by service id.
pub fn consul_router() -> Router {
    let state: RegistryState = Arc::new(Mutex::new(HashMap::new()));

    async fn register(State(state): State<RegistryState>, Json(body): Json<Value>) -> StatusCode {
        let id = body["ID"].as_str().unwrap_or_default().to_string();
        state.lock().await.insert(id, body);
        StatusCode::OK
    }

    async fn deregister(State(state): State<RegistryState>, Path(id): Path<String>) -> StatusCode {
        state.lock().await.remove(&id);
        StatusCode::OK
    }

    async fn services(State(state): State<RegistryState>) -> Json<Value> {
        let map: serde_json::Map<String, Value> = state
            .lock()
            .await
            .iter()
            .map(|(id, reg)| {
                (
                    id.clone(),
                    json!({
                        "Service": reg["Name"],
                        "Tags": reg["Tags"],
                    }),
                )
            })
            .collect();
        Json(Value::Object(map))
    }

    async fn health(State(state): State<RegistryState>, Path(name): Path<String>) -> Json<Value> {
        let entries: Vec<Value> = state
            .lock()
            .await
            .values()
            .filter(|reg| reg["Name"].as_str() == Some(name.as_str()))
            .map(|reg| {
                json!({
                    "Service": {
                        "ID": reg["ID"],
                        "Service": reg["Name"],
                        "Address": reg["Address"],
                        "Port": reg["Port"],
                        "Tags": reg["Tags"],
                    }
                })
            })
            .collect();
        Json(Value::Array(entries))
    }

    Router::new()
        .route("/v1/agent/service/register", put(register))
        .route("/v1/agent/service/deregister/:id", put(deregister))
        .route("/v1/agent/services", get(services))
        .route("/v1/health/service/:name", get(health))
        .with_state(state)
}

/// Register a backend instance directly with the mock registry
pub async fn register_instance(
    registry: &RegistryClient,
    name: &str,
    addr: SocketAddr,
    tags: &[&str],
) {
    let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
    registry
        .register_service(name, &addr.ip().to_string(), addr.port(), &tags)
        .await
        .unwrap();
}

// ============================================================================
// Gateway assembly
// ============================================================================

/// Base config wired to the mock identity/authorization services; registry
/// and rate limiting start disabled so tests opt in explicitly.
pub fn test_config(identity: SocketAddr, authorization: SocketAddr) -> Config {
    let mut config = Config::default();
    config.registry.enabled = false;
    config.security.rate_limit.enabled = false;
    config.security.allow_local_dev_auth = false;
    config.services.auth_service = endpoint_for(identity);
    config.services.authorization_service = endpoint_for(authorization);
    config
}

pub async fn spawn_gateway(
    config: Config,
    registry: Option<Arc<RegistryClient>>,
    blockchain: Option<Arc<BlockchainGateway>>,
) -> SocketAddr {
    let ctx = AppContext::new(Arc::new(config), registry, blockchain, None);
    spawn(isa_cloud_gateway::app(ctx)).await
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().build().unwrap()
}

// ============================================================================
// Mock chain RPC node
// ============================================================================

/// JSON-RPC node answering the chain_* methods with canned data
pub fn chain_rpc_router() -> Router {
    async fn rpc(Json(body): Json<Value>) -> Json<Value> {
        let id = body["id"].clone();
        let result = match body["method"].as_str().unwrap_or("") {
            "chain_chainId" => json!(1337),
            "chain_blockNumber" => json!(1_000_000),
            "chain_getBalance" => json!("123456789000000000000"),
            "chain_getNonce" => json!(7),
            "chain_sendTransaction" => json!("0xdeadbeef"),
            "chain_estimateGas" => json!(21_000),
            "chain_getTransaction" => {
                let hash = body["params"][0].as_str().unwrap_or("");
                if hash == "0xdeadbeef" {
                    json!({
                        "hash": "0xdeadbeef",
                        "from": "0xa",
                        "to": "0xb",
                        "value": "1000",
                        "gas_limit": 21000,
                        "gas_price": "20000000000",
                        "nonce": 7,
                        "block_number": 999999,
                        "status": "confirmed",
                        "timestamp": 1700000000,
                    })
                } else {
                    Value::Null
                }
            }
            other => {
                return Json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32601, "message": format!("unknown method {other}") },
                }))
            }
        };
        Json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
    }

    Router::new().route("/", post(rpc))
}
