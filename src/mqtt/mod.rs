// ============================================================================
// MQTT Bridge
// ============================================================================
//
// Adapts device MQTT traffic onto the backend HTTP call surface. The
// rumqttc event loop runs in a spawned task and doubles as the reconnect
// loop; on every ConnAck all registered topic patterns are (re)subscribed.
// Message dispatch picks the first pattern matching the delivered topic;
// unmatched messages are logged and dropped.
//
// ============================================================================

pub mod router;
pub mod topic;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{MqttConfig, ServiceEndpoint};
use crate::config::DeviceManagementConfig;

pub use router::{DeviceMessage, DeviceMessageKind, MessageRouter};
pub use topic::{device_id_from_topic, topic_matches};

/// Built-in handler kinds, routed by topic pattern
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeHandler {
    Telemetry,
    Status,
    CommandResponse,
    DeviceAuth,
    Registration,
}

struct TopicRoute {
    pattern: String,
    handler: BridgeHandler,
}

pub struct MqttBridge {
    client: AsyncClient,
    router: Arc<MessageRouter>,
    routes: Arc<RwLock<Vec<TopicRoute>>>,
    qos: QoS,
    auto_reconnect: bool,
    connected: Arc<AtomicBool>,
}

fn map_qos(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

/// Accepts mqtt://host:port, tcp://host:port, or bare host:port
fn parse_broker_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    match stripped.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid broker port in {url}"))?;
            Ok((host.to_string(), port))
        }
        None => Ok((stripped.to_string(), 1883)),
    }
}

impl MqttBridge {
    /// Connect to the broker, register the built-in handlers, and spawn the
    /// event loop task.
    pub async fn connect(
        config: &MqttConfig,
        device_config: &DeviceManagementConfig,
        auth_service: &ServiceEndpoint,
    ) -> Result<Arc<Self>> {
        let (host, port) = parse_broker_url(&config.broker_url)?;

        // Suffix the client id with the startup time so concurrent gateway
        // instances never collide on the broker.
        let client_id = format!("{}_{}", config.client_id, chrono::Utc::now().timestamp());

        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive));
        options.set_clean_session(config.clean_session);
        if !config.username.is_empty() {
            options.set_credentials(config.username.clone(), config.password.clone());
        }

        let (client, event_loop) = AsyncClient::new(options, 64);

        let bridge = Arc::new(Self {
            client,
            router: Arc::new(MessageRouter::new(device_config, auth_service)),
            routes: Arc::new(RwLock::new(Vec::new())),
            qos: map_qos(config.qos),
            auto_reconnect: config.auto_reconnect,
            connected: Arc::new(AtomicBool::new(false)),
        });

        bridge.register_default_handlers(config).await;

        let runner = bridge.clone();
        tokio::spawn(async move {
            runner.run(event_loop).await;
        });

        info!(broker = %config.broker_url, "MQTT bridge started");
        Ok(bridge)
    }

    async fn register_default_handlers(&self, config: &MqttConfig) {
        let mut routes = self.routes.write().await;
        routes.push(TopicRoute {
            pattern: config.topics.device_telemetry.clone(),
            handler: BridgeHandler::Telemetry,
        });
        routes.push(TopicRoute {
            pattern: config.topics.device_status.clone(),
            handler: BridgeHandler::Status,
        });
        routes.push(TopicRoute {
            pattern: config.topics.device_commands_response.clone(),
            handler: BridgeHandler::CommandResponse,
        });
        routes.push(TopicRoute {
            pattern: config.topics.device_auth.clone(),
            handler: BridgeHandler::DeviceAuth,
        });
        routes.push(TopicRoute {
            pattern: config.topics.device_registration.clone(),
            handler: BridgeHandler::Registration,
        });
    }

    /// Event loop: polls the broker, resubscribes on reconnect, and
    /// dispatches publishes. Poll errors feed the auto-reconnect policy.
    async fn run(&self, mut event_loop: EventLoop) {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("MQTT client connected");
                    self.connected.store(true, Ordering::Release);
                    self.resubscribe_all().await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.dispatch(&publish.topic, &publish.payload).await;
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("MQTT broker requested disconnect");
                    self.connected.store(false, Ordering::Release);
                    if !self.auto_reconnect {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    self.connected.store(false, Ordering::Release);
                    if !self.auto_reconnect {
                        error!(error = %e, "MQTT connection lost, bridge stopping");
                        break;
                    }
                    warn!(error = %e, "MQTT connection lost, reconnecting");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn resubscribe_all(&self) {
        let routes = self.routes.read().await;
        for route in routes.iter() {
            if let Err(e) = self.client.subscribe(route.pattern.as_str(), self.qos).await {
                error!(topic = %route.pattern, error = %e, "Failed to subscribe");
            } else {
                debug!(topic = %route.pattern, "Subscribed to MQTT topic");
            }
        }
    }

    /// Register an additional handler for a topic pattern
    pub async fn subscribe(&self, pattern: &str, handler: BridgeHandler) -> Result<()> {
        {
            let mut routes = self.routes.write().await;
            routes.push(TopicRoute {
                pattern: pattern.to_string(),
                handler,
            });
        }
        self.client
            .subscribe(pattern, self.qos)
            .await
            .with_context(|| format!("failed to subscribe to {pattern}"))?;
        Ok(())
    }

    /// Remove a handler and drop the broker subscription
    pub async fn unsubscribe(&self, pattern: &str) -> Result<()> {
        {
            let mut routes = self.routes.write().await;
            routes.retain(|route| route.pattern != pattern);
        }
        self.client
            .unsubscribe(pattern)
            .await
            .with_context(|| format!("failed to unsubscribe from {pattern}"))?;
        Ok(())
    }

    /// First matching pattern wins; unmatched messages are dropped
    async fn dispatch(&self, topic: &str, payload: &[u8]) {
        let handler = {
            let routes = self.routes.read().await;
            routes
                .iter()
                .find(|route| topic_matches(&route.pattern, topic))
                .map(|route| route.handler)
        };

        let Some(handler) = handler else {
            warn!(topic = topic, "No handler for MQTT topic, dropping message");
            return;
        };

        if let Err(e) = self.handle(handler, topic, payload).await {
            error!(topic = topic, error = %e, "Failed to handle MQTT message");
        }
    }

    fn parse_payload(payload: &[u8]) -> Result<Map<String, Value>> {
        let value: Value = serde_json::from_slice(payload).context("payload is not JSON")?;
        match value {
            Value::Object(map) => Ok(map),
            other => anyhow::bail!("expected JSON object, got {other}"),
        }
    }

    async fn handle(&self, handler: BridgeHandler, topic: &str, payload: &[u8]) -> Result<()> {
        match handler {
            BridgeHandler::Telemetry => {
                let device_id = device_id_from_topic(topic).context("missing device id")?;
                let message = DeviceMessage::new(
                    device_id,
                    DeviceMessageKind::Telemetry,
                    Self::parse_payload(payload)?,
                );
                self.router.forward_telemetry(&message).await?;
            }
            BridgeHandler::Status => {
                let device_id = device_id_from_topic(topic).context("missing device id")?;
                let message = DeviceMessage::new(
                    device_id,
                    DeviceMessageKind::Status,
                    Self::parse_payload(payload)?,
                );
                self.router.forward_status(&message).await?;
            }
            BridgeHandler::CommandResponse => {
                let device_id = device_id_from_topic(topic).unwrap_or("unknown");
                info!(
                    device_id = device_id,
                    payload = %String::from_utf8_lossy(payload),
                    "Command response from device"
                );
            }
            BridgeHandler::DeviceAuth => {
                let device_id = device_id_from_topic(topic)
                    .context("missing device id")?
                    .to_string();
                let message = DeviceMessage::new(
                    device_id.clone(),
                    DeviceMessageKind::AuthRequest,
                    Self::parse_payload(payload)?,
                );
                let response_topic = format!("devices/{}/auth/response", device_id);
                match self.router.authenticate_device(&message).await {
                    Ok(result) => self.publish(&response_topic, &result).await?,
                    Err(e) => {
                        let failure = json!({ "success": false, "error": e.to_string() });
                        self.publish(&response_topic, &failure).await?;
                        return Err(anyhow::anyhow!(e));
                    }
                }
            }
            BridgeHandler::Registration => {
                let payload = Self::parse_payload(payload)?;
                let result = self.router.register_device(&payload).await?;
                // The service assigns the id; fall back to the payload's
                let device_id = result
                    .get("device_id")
                    .and_then(|v| v.as_str())
                    .or_else(|| payload.get("device_id").and_then(|v| v.as_str()))
                    .context("registration result missing device_id")?
                    .to_string();
                self.publish(&format!("devices/{}/register/response", device_id), &result)
                    .await?;
            }
        }
        Ok(())
    }

    /// Publish a JSON payload at the configured QoS
    pub async fn publish(&self, topic: &str, payload: &Value) -> Result<()> {
        let data = serde_json::to_vec(payload)?;
        self.client
            .publish(topic, self.qos, false, data)
            .await
            .with_context(|| format!("failed to publish to {topic}"))?;
        Ok(())
    }

    /// Downlink: publish a command to devices/{id}/commands
    pub async fn send_command(&self, device_id: &str, command: &Value) -> Result<()> {
        let topic = format!("devices/{}/commands", device_id);
        self.publish(&topic, command).await
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub async fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        if let Err(e) = self.client.disconnect().await {
            warn!(error = %e, "MQTT disconnect failed");
        } else {
            info!("Disconnected from MQTT broker");
        }
    }
}
