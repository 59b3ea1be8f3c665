// ============================================================================
// Device Message Router
// ============================================================================
//
// Translates parsed device messages into the same backend HTTP calls the
// HTTP clients use. Forwarding runs synchronously inside the bridge's
// dispatch but is bounded by a 30 second request timeout.
//
// ============================================================================

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::config::{DeviceManagementConfig, ServiceEndpoint};
use crate::error::{GatewayError, GatewayResult};

const FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

/// Classification of an inbound device message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMessageKind {
    Telemetry,
    Status,
    CommandResponse,
    AuthRequest,
    Registration,
}

/// One parsed MQTT message on its way to a backend service
#[derive(Clone, Debug, Serialize)]
pub struct DeviceMessage {
    pub device_id: String,
    pub kind: DeviceMessageKind,
    pub payload: Map<String, Value>,
    pub received_at: DateTime<Utc>,
}

impl DeviceMessage {
    pub fn new(device_id: impl Into<String>, kind: DeviceMessageKind, payload: Map<String, Value>) -> Self {
        Self {
            device_id: device_id.into(),
            kind,
            payload,
            received_at: Utc::now(),
        }
    }

    /// Payload with the device_id field guaranteed present. Devices often
    /// omit it because the topic already carries the id.
    pub fn payload_with_device_id(&self) -> Map<String, Value> {
        let mut payload = self.payload.clone();
        payload
            .entry("device_id".to_string())
            .or_insert_with(|| json!(self.device_id));
        payload
    }
}

pub struct MessageRouter {
    client: reqwest::Client,
    device_base: String,
    telemetry_base: String,
    auth_base: String,
}

impl MessageRouter {
    pub fn new(device_config: &DeviceManagementConfig, auth_service: &ServiceEndpoint) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FORWARD_TIMEOUT)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .expect("MQTT forwarding HTTP client");

        Self {
            client,
            device_base: device_config.device_service.base_url(),
            telemetry_base: device_config.telemetry_service.base_url(),
            auth_base: auth_service.base_url(),
        }
    }

    async fn post(&self, url: &str, payload: &Map<String, Value>) -> GatewayResult<Value> {
        debug!(url = url, "Forwarding device message");
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(GatewayError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::UpstreamUnavailable(format!(
                "backend returned status {}",
                status
            )));
        }

        // Some backends answer 204 with no body
        Ok(response.json().await.unwrap_or(Value::Null))
    }

    /// POST telemetry to /api/v1/devices/{id}/telemetry
    pub async fn forward_telemetry(&self, message: &DeviceMessage) -> GatewayResult<()> {
        let url = format!(
            "{}/api/v1/devices/{}/telemetry",
            self.telemetry_base, message.device_id
        );
        self.post(&url, &message.payload_with_device_id()).await?;
        Ok(())
    }

    /// POST a status update to /api/v1/devices/{id}/status
    pub async fn forward_status(&self, message: &DeviceMessage) -> GatewayResult<()> {
        let url = format!(
            "{}/api/v1/devices/{}/status",
            self.device_base, message.device_id
        );
        self.post(&url, &message.payload_with_device_id()).await?;
        Ok(())
    }

    /// Forward a device authentication request to the identity flow
    pub async fn authenticate_device(&self, message: &DeviceMessage) -> GatewayResult<Value> {
        let url = format!(
            "{}/api/v1/devices/{}/auth",
            self.auth_base, message.device_id
        );
        let result = self.post(&url, &message.payload_with_device_id()).await?;
        info!(device_id = %message.device_id, "Device authenticated");
        Ok(result)
    }

    /// Forward a registration request to the device service
    pub async fn register_device(&self, payload: &Map<String, Value>) -> GatewayResult<Value> {
        let url = format!("{}/api/v1/devices/register", self.device_base);
        let result = self.post(&url, payload).await?;
        info!("Device registration forwarded");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_is_injected_when_absent() {
        let mut payload = Map::new();
        payload.insert("temperature".into(), json!(23.5));
        let message = DeviceMessage::new("sensor001", DeviceMessageKind::Telemetry, payload);

        let enriched = message.payload_with_device_id();
        assert_eq!(enriched["device_id"], "sensor001");
        assert_eq!(enriched["temperature"], 23.5);
    }

    #[test]
    fn device_id_is_not_overwritten_when_present() {
        let mut payload = Map::new();
        payload.insert("device_id".into(), json!("explicit-id"));
        let message = DeviceMessage::new("sensor001", DeviceMessageKind::Status, payload);

        let enriched = message.payload_with_device_id();
        assert_eq!(enriched["device_id"], "explicit-id");
    }
}
