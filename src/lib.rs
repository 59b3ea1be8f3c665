// ============================================================================
// IsA Cloud Gateway
// ============================================================================
//
// Multi-protocol API gateway: single ingress for external clients and the
// coordination point for service-to-service calls. The request plane is
// dynamic service discovery with health-gated routing, a unified
// authentication + resource-authorization pipeline, HTTP reverse proxying
// with a dedicated SSE streaming path, an MQTT bridge for device traffic,
// and a chain-agnostic blockchain facade.
//
// ============================================================================

pub mod auth;
pub mod blockchain;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod grpc;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod mqtt;
pub mod registry;

pub use config::Config;
pub use context::AppContext;
pub use error::{GatewayError, GatewayResult};
pub use handlers::app;
