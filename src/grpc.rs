// ============================================================================
// gRPC Surface
// ============================================================================
//
// Wraps the generated code from proto/gateway.proto and implements the
// GatewayInfo service: the health and service-listing endpoints mirrored
// for internal gRPC callers. Runs on its own listener next to HTTP.
//
// ============================================================================

use std::time::Instant;

use chrono::Utc;
use tonic::{Request, Response, Status};
use tracing::debug;

use crate::context::AppContext;

pub mod proto {
    tonic::include_proto!("isa.gateway.v1");
}

pub use proto::gateway_info_server::{GatewayInfo, GatewayInfoServer};
use proto::{
    HealthRequest, HealthResponse, ListServicesRequest, ListServicesResponse, ServiceInfo,
};

pub struct GatewayInfoService {
    ctx: AppContext,
}

impl GatewayInfoService {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub fn into_server(self) -> GatewayInfoServer<Self> {
        GatewayInfoServer::new(self)
    }
}

#[tonic::async_trait]
impl GatewayInfo for GatewayInfoService {
    async fn health(
        &self,
        _request: Request<HealthRequest>,
    ) -> Result<Response<HealthResponse>, Status> {
        let start = Instant::now();
        let response = HealthResponse {
            status: "healthy".to_string(),
            service: "isa-cloud-gateway".to_string(),
            version: self.ctx.config.app.version.clone(),
            timestamp: Utc::now().timestamp(),
        };
        debug!(
            method = "GatewayInfo/Health",
            duration_us = start.elapsed().as_micros() as u64,
            "gRPC request completed"
        );
        Ok(Response::new(response))
    }

    async fn list_services(
        &self,
        _request: Request<ListServicesRequest>,
    ) -> Result<Response<ListServicesResponse>, Status> {
        let start = Instant::now();
        let services: Vec<ServiceInfo> = self
            .ctx
            .config
            .static_services()
            .into_iter()
            .map(|(name, endpoint)| ServiceInfo {
                name: name.to_string(),
                host: endpoint.host.clone(),
                http_port: endpoint.http_port as u32,
                grpc_port: endpoint.grpc_port as u32,
                status: "connected".to_string(),
            })
            .collect();

        let total = services.len() as u32;
        debug!(
            method = "GatewayInfo/ListServices",
            duration_us = start.elapsed().as_micros() as u64,
            total = total,
            "gRPC request completed"
        );

        Ok(Response::new(ListServicesResponse { services, total }))
    }
}
