// ============================================================================
// Unified Authentication
// ============================================================================
//
// One pipeline for every inbound request:
// 1. Public-endpoint bypass (health, readiness, service listing)
// 2. Internal service recognition (registry-validated headers, or the
//    loopback dev heuristic when explicitly enabled)
// 3. JWT verification via the identity service, followed by the resource
//    authorization gate
// 4. API-key verification via the identity service (carries its own
//    permission list, so the gate is skipped)
//
// ============================================================================

pub mod authorization;
pub mod identity;
pub mod middleware;
pub mod principal;

pub use authorization::{AuthorizationClient, ResourceSelector};
pub use identity::IdentityClient;
pub use middleware::unified_authentication;
pub use principal::{AccessGrant, AuthMethod, Principal};
