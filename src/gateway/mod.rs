// ============================================================================
// Dynamic Routing & Proxying
// ============================================================================
//
// The request-plane core: path classification into a RouteDecision, target
// selection through the service registry with a static fallback, and the
// two forwarding paths (buffering standard proxy, flushing SSE proxy).
//
// ============================================================================

pub mod proxy;
pub mod router;
pub mod sse;

pub use router::{DynamicProxy, ProxyStrategy, RouteDecision};
