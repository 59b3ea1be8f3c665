// ============================================================================
// Gateway Supervisor
// ============================================================================
//
// Wires the long-lived singletons, runs the HTTP and gRPC listeners in
// parallel, and drives graceful shutdown: SIGINT/SIGTERM (or either
// listener failing) stops both servers, active requests get a 10 second
// grace period, then the registry registration, MQTT session, and chain
// connections are torn down.
//
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use isa_cloud_gateway::blockchain::BlockchainGateway;
use isa_cloud_gateway::config::Config;
use isa_cloud_gateway::context::AppContext;
use isa_cloud_gateway::grpc::GatewayInfoService;
use isa_cloud_gateway::mqtt::MqttBridge;
use isa_cloud_gateway::registry::RegistryClient;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config_file = std::env::args().nth(1);
    let config = Arc::new(Config::load(config_file.as_deref())?);

    init_tracing(&config);

    info!(
        version = %config.app.version,
        environment = %config.environment,
        "Starting IsA Cloud Gateway"
    );

    // Registry is optional: without it the static services map serves alone
    let (registry, gateway_service_id) = init_registry(&config).await;

    // Blockchain facade is optional
    let blockchain = if config.blockchain.enabled {
        match BlockchainGateway::from_config(&config.blockchain).await {
            Ok(gateway) => {
                info!("Blockchain gateway initialized");
                Some(Arc::new(gateway))
            }
            Err(e) => {
                warn!(error = %e, "Failed to initialize blockchain gateway");
                None
            }
        }
    } else {
        None
    };

    // MQTT bridge is optional
    let mqtt = if config.mqtt.enabled {
        match MqttBridge::connect(
            &config.mqtt,
            &config.device_management,
            &config.services.auth_service,
        )
        .await
        {
            Ok(bridge) => Some(bridge),
            Err(e) => {
                warn!(error = %e, "Failed to start MQTT bridge");
                None
            }
        }
    } else {
        None
    };

    let ctx = AppContext::new(config.clone(), registry.clone(), blockchain.clone(), mqtt.clone());

    // HTTP listener
    let http_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.http_port)
        .parse()
        .context("invalid HTTP server address")?;
    let http_listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {http_addr}"))?;
    info!(%http_addr, "HTTP server listening");

    // gRPC listener
    let grpc_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.grpc_port)
        .parse()
        .context("invalid gRPC server address")?;
    info!(%grpc_addr, "gRPC server listening");

    // Either listener failing feeds the same shutdown channel a signal does
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(4);

    let app = isa_cloud_gateway::app(ctx.clone());
    let mut http_shutdown = shutdown_tx.subscribe();
    let http_failure = shutdown_tx.clone();
    let http_task = tokio::spawn(async move {
        let result = axum::serve(
            http_listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = http_shutdown.recv().await;
        })
        .await;
        if let Err(e) = result {
            error!(error = %e, "HTTP server failed");
            let _ = http_failure.send(());
        }
    });

    let grpc_service = GatewayInfoService::new(ctx.clone()).into_server();
    let mut grpc_shutdown = shutdown_tx.subscribe();
    let grpc_failure = shutdown_tx.clone();
    let grpc_task = tokio::spawn(async move {
        let result = tonic::transport::Server::builder()
            .add_service(grpc_service)
            .serve_with_shutdown(grpc_addr, async move {
                let _ = grpc_shutdown.recv().await;
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, "gRPC server failed");
            let _ = grpc_failure.send(());
        }
    });

    // Run until a signal arrives or either listener dies
    let mut failure_rx = shutdown_tx.subscribe();
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
        _ = failure_rx.recv() => {
            error!("A listener exited unexpectedly");
        }
    }

    info!("Shutting down gateway...");
    let _ = shutdown_tx.send(());

    if tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = http_task.await;
        let _ = grpc_task.await;
    })
    .await
    .is_err()
    {
        warn!("Graceful shutdown deadline exceeded, closing remaining connections");
    }

    // Tear down external attachments
    if let (Some(registry), Some(service_id)) = (&registry, &gateway_service_id) {
        if let Err(e) = registry.deregister_service(service_id).await {
            warn!(error = %e, "Failed to deregister gateway");
        }
    }
    if let Some(mqtt) = &mqtt {
        mqtt.disconnect().await;
    }
    if let Some(blockchain) = &blockchain {
        blockchain.close().await;
    }

    info!("Gateway shutdown completed");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Connect to the registry and register the gateway itself. Both steps are
/// non-fatal: without a registry the gateway serves from static config.
async fn init_registry(config: &Config) -> (Option<Arc<RegistryClient>>, Option<String>) {
    if !config.registry.enabled {
        return (None, None);
    }

    let registry = match RegistryClient::connect(&config.registry.address).await {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            warn!(error = %e, "Failed to connect to service registry, using static configuration");
            return (None, None);
        }
    };
    info!(address = %config.registry.address, "Connected to service registry");

    let service_id = match registry
        .register_service(
            "gateway",
            "localhost",
            config.server.http_port,
            &["api".to_string(), "gateway".to_string()],
        )
        .await
    {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(error = %e, "Failed to register gateway with registry");
            None
        }
    };

    (Some(registry), service_id)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
