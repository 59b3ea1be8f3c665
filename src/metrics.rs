// ============================================================================
// Gateway Metrics
// ============================================================================
//
// Prometheus counters for the process plus a per-service snapshot map that
// backs the JSON management endpoint /api/v1/gateway/metrics.
//
// ============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus::{opts, register_int_counter, IntCounter};
use serde::Serialize;

pub static REQUESTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "isa_gateway_requests_total",
        "Total number of HTTP requests handled by the gateway"
    ))
    .unwrap()
});

pub static ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "isa_gateway_errors_total",
        "Total number of HTTP requests answered with 4xx/5xx"
    ))
    .unwrap()
});

/// Logical service label for a request path: the first segment after
/// /api/v1/, or "gateway" for everything the gateway answers itself.
pub fn service_label(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("/api/v1/") {
        let service = rest.split('/').next().unwrap_or("");
        if !service.is_empty() {
            return service.to_string();
        }
    }
    "gateway".to_string()
}

#[derive(Default)]
struct ServiceStats {
    requests: u64,
    errors: u64,
    total_latency_ms: u64,
}

pub struct GatewayMetrics {
    started_at: Instant,
    services: RwLock<HashMap<String, ServiceStats>>,
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub gateway: GatewaySnapshot,
    pub services: HashMap<String, ServiceSnapshot>,
}

#[derive(Serialize)]
pub struct GatewaySnapshot {
    pub uptime_secs: u64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate: f64,
}

#[derive(Serialize)]
pub struct ServiceSnapshot {
    pub requests: u64,
    pub errors: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_latency_ms: Option<f64>,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            services: RwLock::new(HashMap::new()),
        }
    }

    pub fn record(&self, service: &str, status: StatusCode, latency: Duration) {
        REQUESTS_TOTAL.inc();
        let failed = status.is_client_error() || status.is_server_error();
        if failed {
            ERRORS_TOTAL.inc();
        }

        let mut services = self.services.write();
        let stats = services.entry(service.to_string()).or_default();
        stats.requests += 1;
        if failed {
            stats.errors += 1;
        }
        stats.total_latency_ms += latency.as_millis() as u64;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let services = self.services.read();
        let mut total_requests = 0;
        let mut total_errors = 0;
        let mut per_service = HashMap::new();

        for (name, stats) in services.iter() {
            total_requests += stats.requests;
            total_errors += stats.errors;
            per_service.insert(
                name.clone(),
                ServiceSnapshot {
                    requests: stats.requests,
                    errors: stats.errors,
                    avg_latency_ms: if stats.requests > 0 {
                        Some(stats.total_latency_ms as f64 / stats.requests as f64)
                    } else {
                        None
                    },
                },
            );
        }

        MetricsSnapshot {
            gateway: GatewaySnapshot {
                uptime_secs: self.started_at.elapsed().as_secs(),
                total_requests,
                total_errors,
                error_rate: if total_requests > 0 {
                    total_errors as f64 / total_requests as f64
                } else {
                    0.0
                },
            },
            services: per_service,
        }
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
