// ============================================================================
// Standard Reverse Proxy
// ============================================================================
//
// Forwards one HTTP request to a resolved target and streams the upstream
// response back. Header hygiene:
// - hop-by-hop headers are stripped in both directions
// - Access-Control-* response headers from upstream are dropped; the
//   gateway's CORS layer is the single source of those
//
// Dial failures map to 502 {"error":"Service unavailable: <cause>"},
// timeouts to 504.
//
// ============================================================================

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use tracing::{debug, error};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::router::RouteDecision;

/// Headers whose semantics end at a single transport hop
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// CORS headers are owned by the gateway; upstream copies are dropped so
/// clients never see duplicates
const UPSTREAM_CORS_HEADERS: &[&str] = &[
    "access-control-allow-origin",
    "access-control-allow-methods",
    "access-control-allow-headers",
    "access-control-allow-credentials",
    "access-control-max-age",
    "access-control-expose-headers",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    HOP_BY_HOP_HEADERS.contains(&lower.as_str())
}

pub fn is_upstream_cors(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    UPSTREAM_CORS_HEADERS.contains(&lower.as_str())
}

/// Full target URL for a decision, preserving the inbound query string
pub fn target_url(decision: &RouteDecision, query: Option<&str>) -> String {
    match query {
        Some(query) if !query.is_empty() => {
            format!("{}{}?{}", decision.target_base_url, decision.rewritten_path, query)
        }
        _ => format!("{}{}", decision.target_base_url, decision.rewritten_path),
    }
}

/// Copy request headers onto the outgoing builder, minus hop-by-hop and
/// host (the client sets its own)
pub fn copy_request_headers(
    mut outgoing: reqwest::RequestBuilder,
    headers: &HeaderMap,
) -> reqwest::RequestBuilder {
    for (name, value) in headers {
        if name == axum::http::header::HOST || is_hop_by_hop(name.as_str()) {
            continue;
        }
        outgoing = outgoing.header(name.as_str(), value.as_bytes());
    }
    outgoing
}

/// Forward a request through the pooled client and stream the response back
pub async fn forward(
    client: &reqwest::Client,
    decision: &RouteDecision,
    req: Request<Body>,
) -> GatewayResult<Response> {
    let method = req.method().clone();
    let query = req.uri().query().map(str::to_string);
    let url = target_url(decision, query.as_deref());

    debug!(
        service = %decision.service,
        method = %method,
        target = %url,
        "Proxying request"
    );

    let (parts, body) = req.into_parts();
    let body_bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| GatewayError::bad_request(format!("failed to read request body: {}", e)))?;

    let reqwest_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|e| GatewayError::bad_request(format!("invalid method: {}", e)))?;

    let mut outgoing = client.request(reqwest_method, &url);
    outgoing = copy_request_headers(outgoing, &parts.headers);
    if !body_bytes.is_empty() {
        outgoing = outgoing.body(body_bytes);
    }

    let upstream = outgoing.send().await.map_err(|e| {
        error!(service = %decision.service, target = %url, error = %e, "Proxy request failed");
        GatewayError::from(e)
    })?;

    copy_response(upstream)
}

/// Convert an upstream reqwest response into a downstream axum response,
/// applying the header hygiene rules. The body is streamed, not buffered.
pub fn copy_response(upstream: reqwest::Response) -> GatewayResult<Response> {
    let status = StatusCode::from_u16(upstream.status().as_u16())
        .map_err(|e| GatewayError::internal(format!("invalid upstream status: {}", e)))?;

    let mut builder = Response::builder().status(status);
    for (name, value) in upstream.headers() {
        if is_hop_by_hop(name.as_str()) || is_upstream_cors(name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            builder = builder.header(name, value);
        }
    }

    let body = Body::from_stream(upstream.bytes_stream());
    builder
        .body(body)
        .map_err(|e| GatewayError::internal(format!("failed to build response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::router::ProxyStrategy;

    fn decision(path: &str) -> RouteDecision {
        RouteDecision {
            service: "users".into(),
            target_base_url: "http://127.0.0.1:8100".into(),
            rewritten_path: path.into(),
            strategy: ProxyStrategy::Standard,
        }
    }

    #[test]
    fn hop_by_hop_headers_are_case_insensitive() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("keep-alive"));
        assert!(is_hop_by_hop("Transfer-Encoding"));
        assert!(is_hop_by_hop("TE"));
        assert!(is_hop_by_hop("Upgrade"));
        assert!(!is_hop_by_hop("content-type"));
        assert!(!is_hop_by_hop("authorization"));
    }

    #[test]
    fn upstream_cors_headers_are_recognized() {
        assert!(is_upstream_cors("Access-Control-Allow-Origin"));
        assert!(is_upstream_cors("access-control-expose-headers"));
        assert!(is_upstream_cors("Access-Control-Max-Age"));
        assert!(!is_upstream_cors("content-type"));
        assert!(!is_upstream_cors("x-request-id"));
    }

    #[test]
    fn target_url_preserves_query() {
        let d = decision("/42");
        assert_eq!(target_url(&d, None), "http://127.0.0.1:8100/42");
        assert_eq!(target_url(&d, Some("")), "http://127.0.0.1:8100/42");
        assert_eq!(
            target_url(&d, Some("page=2&limit=10")),
            "http://127.0.0.1:8100/42?page=2&limit=10"
        );
    }
}
