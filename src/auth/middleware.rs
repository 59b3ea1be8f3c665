// ============================================================================
// Unified Authentication Middleware
// ============================================================================
//
// Sequenced per request, short-circuiting on the first success:
// public bypass -> internal service -> JWT (+ authorization gate) -> API key.
// The resulting Principal is inserted into request extensions for the
// router, proxies, and handlers.
//
// ============================================================================

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use tracing::{debug, error};

use crate::auth::authorization::ResourceSelector;
use crate::auth::principal::{AccessGrant, AuthMethod, Principal};
use crate::context::AppContext;
use crate::error::GatewayError;

/// User agents of known in-house service clients, accepted from loopback in
/// development mode only.
const SERVICE_USER_AGENTS: &[&str] = &["python-httpx", "axios", "node-fetch", "go-resty", "curl"];

/// Paths that bypass authentication entirely
fn is_public_endpoint(path: &str) -> bool {
    path == "/health" || path == "/ready" || path.starts_with("/api/v1/gateway/services")
}

pub async fn unified_authentication(
    State(ctx): State<AppContext>,
    mut req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let path = req.uri().path().to_string();

    // 1. Public endpoints carry an anonymous principal
    if is_public_endpoint(&path) {
        req.extensions_mut().insert(Principal::Anonymous);
        return Ok(next.run(req).await);
    }

    // 2. Internal service-to-service callers
    if let Some(principal) = authenticate_internal(&ctx, &req).await {
        debug!(
            service = %principal.user_id(),
            path = %path,
            "Internal service authenticated"
        );
        req.extensions_mut().insert(principal);
        return Ok(next.run(req).await);
    }

    // 3. Bearer token via the identity service, then the authorization gate
    if let Some(token) = bearer_token(&req) {
        if let Some(principal) = authenticate_jwt(&ctx, &path, &token).await? {
            debug!(user_id = %principal.user_id(), path = %path, "JWT authentication successful");
            req.extensions_mut().insert(principal);
            return Ok(next.run(req).await);
        }
    }

    // 4. API key from header, query, or cookie; carries its own permissions
    if let Some(api_key) = api_key_credential(&req) {
        if let Some(principal) = authenticate_api_key(&ctx, &api_key).await {
            debug!(user_id = %principal.user_id(), path = %path, "API key authentication successful");
            req.extensions_mut().insert(principal);
            return Ok(next.run(req).await);
        }
    }

    Err(GatewayError::AuthMissing)
}

/// Registry-validated service headers, or the loopback development
/// heuristic. Both paths yield an InternalService principal.
async fn authenticate_internal(ctx: &AppContext, req: &Request) -> Option<Principal> {
    let headers = req.headers();

    let service_name = headers
        .get("x-service-name")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let service_secret = headers
        .get("x-service-secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !service_name.is_empty() && !service_secret.is_empty() {
        if let Some(registry) = &ctx.registry {
            if secret_matches(ctx, service_secret) {
                match registry.list_services().await {
                    Ok(services) if services.contains_key(service_name) => {
                        return Some(Principal::InternalService {
                            service_name: service_name.to_string(),
                            is_local_dev: false,
                        });
                    }
                    Ok(_) => {
                        debug!(service = service_name, "Service not present in registry");
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to list registry services");
                    }
                }
            }
        }
    }

    // Loopback development heuristic, gated on both the peer socket address
    // and an explicit configuration flag.
    if ctx.config.security.allow_local_dev_auth && is_loopback_peer(req) {
        let user_agent = headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if SERVICE_USER_AGENTS.iter().any(|ua| user_agent.contains(ua)) {
            return Some(Principal::InternalService {
                service_name: "local-dev-service".to_string(),
                is_local_dev: true,
            });
        }
    }

    None
}

fn secret_matches(ctx: &AppContext, provided: &str) -> bool {
    match &ctx.config.security.service_shared_secret {
        Some(expected) => bool::from(provided.as_bytes().ct_eq(expected.as_bytes())),
        // No secret configured: registry membership alone identifies the caller
        None => true,
    }
}

fn is_loopback_peer(req: &Request) -> bool {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().is_loopback())
        .unwrap_or(false)
}

fn bearer_token(req: &Request) -> Option<String> {
    let header = req.headers().get("authorization")?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?;
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// API key lookup order: X-API-Key header, api_key query parameter,
/// api_key cookie.
fn api_key_credential(req: &Request) -> Option<String> {
    if let Some(key) = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Some(key.to_string());
    }

    if let Some(query) = req.uri().query() {
        for pair in query.split('&') {
            if let Some((name, value)) = pair.split_once('=') {
                if name == "api_key" && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    let cookies = req.headers().get("cookie")?.to_str().ok()?;
    for cookie in cookies.split(';') {
        if let Some((name, value)) = cookie.trim().split_once('=') {
            if name == "api_key" && !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    None
}

/// JWT flow: remote verification, then the resource authorization gate.
/// Returns Ok(None) when the token is invalid or the identity service is
/// unreachable so the API-key flow can still run; a gate denial aborts.
async fn authenticate_jwt(
    ctx: &AppContext,
    path: &str,
    token: &str,
) -> Result<Option<Principal>, GatewayError> {
    let verification = match ctx.identity.verify_token(token).await {
        Ok(v) => v,
        // No principal is derivable without the identity service
        Err(_) => return Ok(None),
    };

    if !verification.valid {
        return Ok(None);
    }

    let user_id = verification.user_id.unwrap_or_default();
    if user_id.is_empty() {
        return Ok(None);
    }

    // The gate only governs paths with a non-empty resource selector
    let grant = match ResourceSelector::from_path(path) {
        Some(selector) => ctx.authorization.check_access(&user_id, &selector).await?,
        None => AccessGrant::default(),
    };

    Ok(Some(Principal::ExternalUser {
        user_id,
        email: verification.email,
        provider: verification.provider,
        auth_method: AuthMethod::Jwt,
        permissions: Vec::new(),
        organization_id: None,
        grant,
    }))
}

/// API key flow. The key's own permission list stands in for the
/// authorization gate.
async fn authenticate_api_key(ctx: &AppContext, api_key: &str) -> Option<Principal> {
    let verification = ctx.identity.verify_api_key(api_key).await.ok()?;
    if !verification.valid {
        return None;
    }

    let key_id = verification.key_id?;
    Some(Principal::ExternalUser {
        user_id: format!("api-key-{}", key_id),
        email: None,
        provider: None,
        auth_method: AuthMethod::ApiKey,
        permissions: verification.permissions,
        organization_id: verification.organization_id,
        grant: AccessGrant::default(),
    })
}
