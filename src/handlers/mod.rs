// ============================================================================
// Gateway HTTP Surface
// ============================================================================
//
// Router assembly plus the endpoints the gateway answers itself:
// - GET /health, GET /ready
// - GET /api/v1/gateway/services|metrics|health
// - /api/v1/blockchain/* (handlers in blockchain.rs)
// Everything else falls through to the dynamic proxy.
//
// Middleware executes in the documented order: rate limit, request id,
// logging, CORS, unified authentication.
//
// ============================================================================

pub mod blockchain;

use std::collections::HashMap;

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::auth::unified_authentication;
use crate::context::AppContext;
use crate::middleware::{cors_layer, rate_limit, request_id, request_logging};

/// Assemble the full HTTP router for the gateway
pub fn app(ctx: AppContext) -> Router {
    let cors = ctx
        .config
        .security
        .cors
        .enabled
        .then(|| cors_layer(&ctx.config.security.cors));

    let router = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/api/v1/gateway/services", get(list_services))
        .route("/api/v1/gateway/metrics", get(gateway_metrics))
        .route("/api/v1/gateway/health", get(services_health))
        .route("/api/v1/blockchain/status", get(blockchain::status))
        .route("/api/v1/blockchain/balance/:address", get(blockchain::balance))
        .route("/api/v1/blockchain/transaction", post(blockchain::send_transaction))
        .route("/api/v1/blockchain/transaction/:hash", get(blockchain::get_transaction))
        .route("/api/v1/blockchain/block/:number", get(blockchain::get_block))
        .fallback(dynamic_dispatch)
        // Middleware in the documented order: rate limit, request id,
        // logging, CORS, authentication (first layer is outermost)
        .layer(from_fn_with_state(ctx.clone(), unified_authentication));

    let router = match cors {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router
        .layer(from_fn_with_state(ctx.clone(), request_logging))
        .layer(from_fn(request_id))
        .layer(from_fn_with_state(ctx.clone(), rate_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Fallback: everything unclaimed goes through the dynamic proxy
async fn dynamic_dispatch(State(ctx): State<AppContext>, req: Request<Body>) -> Response {
    ctx.proxy.dispatch(req).await
}

/// GET /health - always 200 while the process is alive
async fn health(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "isa-cloud-gateway",
        "version": ctx.config.app.version,
        "timestamp": Utc::now(),
    }))
}

/// GET /ready - 200 iff every configured subsystem is reachable
async fn ready(State(ctx): State<AppContext>) -> impl IntoResponse {
    let mut services = HashMap::new();

    services.insert("auth_service", ctx.identity.is_reachable().await);

    if let Some(registry) = &ctx.registry {
        services.insert("registry", registry.list_services().await.is_ok());
    }
    if let Some(blockchain) = &ctx.blockchain {
        let connected = match blockchain.default_chain().await {
            Ok(chain) => chain.is_connected(),
            Err(_) => false,
        };
        services.insert("blockchain", connected);
    }
    if let Some(mqtt) = &ctx.mqtt {
        services.insert("mqtt", mqtt.is_connected());
    }

    let ready = services.values().all(|ok| *ok);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "ready": ready,
            "services": services,
            "timestamp": Utc::now(),
        })),
    )
}

/// GET /api/v1/gateway/services - the static services map
async fn list_services(State(ctx): State<AppContext>) -> impl IntoResponse {
    let services: Vec<_> = ctx
        .config
        .static_services()
        .into_iter()
        .map(|(name, endpoint)| {
            json!({
                "name": name,
                "host": endpoint.host,
                "http_port": endpoint.http_port,
                "grpc_port": endpoint.grpc_port,
                "status": "connected",
            })
        })
        .collect();

    Json(json!({
        "total": services.len(),
        "services": services,
    }))
}

/// GET /api/v1/gateway/metrics - gateway and per-service counters
async fn gateway_metrics(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(ctx.metrics.snapshot())
}

/// GET /api/v1/gateway/health - live probes of the static backends
async fn services_health(State(ctx): State<AppContext>) -> impl IntoResponse {
    let health = ctx.proxy.health_check().await;
    let all_healthy = health.values().all(|ok| *ok);

    let status = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "healthy": all_healthy,
            "services": health,
            "timestamp": Utc::now(),
        })),
    )
}
