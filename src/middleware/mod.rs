// ============================================================================
// Cross-cutting Middleware
// ============================================================================
//
// Filters that apply before routing:
// - request_id: honor an inbound X-Request-ID or mint a fresh UUID
// - request_logging: method/path/status/latency/ip/user-agent per request
// - cors_layer: the gateway-owned CORS policy as a tower-http layer
// - rate_limit (submodule): single global token bucket
//
// ============================================================================

pub mod rate_limit;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, Any, CorsLayer};
use uuid::Uuid;

use crate::config::CorsConfig;
use crate::context::AppContext;

pub use rate_limit::{rate_limit, RateLimiter};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id attached to extensions and echoed in the response
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// Logs every request on completion and feeds the per-service counters
pub async fn request_logging(
    State(ctx): State<AppContext>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = match req.uri().query() {
        Some(query) => format!("{}?{}", req.uri().path(), query),
        None => req.uri().path().to_string(),
    };
    let service = crate::metrics::service_label(req.uri().path());
    let client_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let response = next.run(req).await;

    let status = response.status();
    let latency = start.elapsed();

    ctx.metrics.record(&service, status, latency);

    tracing::info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        latency_ms = latency.as_millis() as u64,
        ip = %client_ip,
        user_agent = %user_agent,
        request_id = %request_id,
        "HTTP request"
    );

    response
}

/// Build the gateway-owned CORS layer from configuration. The layer also
/// answers preflight requests itself, before authentication runs. The
/// proxies strip any Access-Control-* headers coming back from upstream
/// services, so this layer is the single writer of those headers.
pub fn cors_layer(cfg: &CorsConfig) -> CorsLayer {
    let wildcard_origin = cfg.allow_origins.iter().any(|o| o == "*");

    let mut layer = CorsLayer::new().max_age(Duration::from_secs(12 * 3600));

    layer = if wildcard_origin {
        if cfg.allow_credentials {
            // `*` cannot be combined with credentials; reflect the caller's
            // origin instead
            layer.allow_origin(AllowOrigin::mirror_request())
        } else {
            layer.allow_origin(Any)
        }
    } else {
        let origins: Vec<HeaderValue> = cfg
            .allow_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer.allow_origin(origins)
    };

    let wildcard_headers = cfg.allow_headers.iter().any(|h| h == "*");
    layer = if wildcard_headers && !cfg.allow_credentials {
        layer.allow_headers(Any)
    } else if wildcard_headers {
        layer.allow_headers(AllowHeaders::mirror_request())
    } else {
        let headers: Vec<HeaderName> = cfg
            .allow_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        layer.allow_headers(headers)
    };

    let methods: Vec<Method> = cfg
        .allow_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    layer = layer.allow_methods(methods);

    if cfg.allow_credentials {
        layer = layer.allow_credentials(true);
    }

    layer
}
