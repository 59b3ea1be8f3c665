// ============================================================================
// Registry Client Contract Tests
// ============================================================================
//
// Register/discover/deregister round trips against the in-memory catalog
// mock, matching the health-gated discovery contract.
//
// ============================================================================

mod test_utils;

use test_utils::*;

use isa_cloud_gateway::registry::RegistryClient;

#[tokio::test]
async fn register_then_discover_then_deregister() {
    let consul = spawn(consul_router()).await;
    let registry = RegistryClient::connect(&consul.to_string()).await.unwrap();

    let service_id = registry
        .register_service(
            "payments",
            "10.1.2.3",
            8200,
            &["api".to_string(), "sse".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(service_id, "payments-10.1.2.3-8200");

    let instances = registry.list_instances("payments").await.unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].host, "10.1.2.3");
    assert_eq!(instances[0].port, 8200);
    assert!(instances[0].supports_sse());

    let picked = registry.pick_one("payments").await.unwrap().unwrap();
    assert_eq!(picked.id, service_id);

    let services = registry.list_services().await.unwrap();
    assert!(services.contains_key("payments"));

    registry.deregister_service(&service_id).await.unwrap();

    // Empty discovery is a valid outcome, not an error
    let instances = registry.list_instances("payments").await.unwrap();
    assert!(instances.is_empty());
    assert!(registry.pick_one("payments").await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_service_discovery_is_empty() {
    let consul = spawn(consul_router()).await;
    let registry = RegistryClient::connect(&consul.to_string()).await.unwrap();

    let instances = registry.list_instances("nothing-here").await.unwrap();
    assert!(instances.is_empty());
}

#[tokio::test]
async fn unreachable_registry_fails_fast() {
    let dead = dead_endpoint().await;
    let result = RegistryClient::connect(&format!("{}:{}", dead.host, dead.http_port)).await;
    assert!(result.is_err());
}
