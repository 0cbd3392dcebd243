use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;

use crate::domain::Device;
use crate::ports::{Notification, PathUpdate, SessionError, TelemetrySource, UpdateStream};

/// Connection settings for the gNMI HTTP gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway base URL (`http://host:port`)
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// gNMI port the gateway dials on each device
    pub device_port: u16,
}

/// Telemetry source backed by a gNMI HTTP gateway: one-shot state over
/// `POST /get`, on-change subscriptions over its `/subscribe` WebSocket.
pub struct GatewaySource {
    config: GatewayConfig,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GetRequest<'a> {
    target: String,
    username: &'a str,
    password: &'a str,
    path: Vec<String>,
    encoding: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct GetResponse {
    #[serde(default)]
    notification: Vec<WireNotification>,
}

#[derive(Debug, Default, Deserialize)]
struct WireNotification {
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    update: Vec<WireUpdate>,
}

#[derive(Debug, Deserialize)]
struct WireUpdate {
    path: String,
    #[serde(default)]
    val: Option<Value>,
}

impl WireNotification {
    fn into_notification(self) -> Notification {
        Notification {
            timestamp: self.timestamp,
            updates: self
                .update
                .into_iter()
                .map(|u| PathUpdate {
                    path: u.path,
                    value: u.val,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SubscribeRequest<'a> {
    target: String,
    username: &'a str,
    password: &'a str,
    subscription: Vec<SubscriptionSpec>,
    mode: &'static str,
    encoding: &'static str,
}

#[derive(Debug, Serialize)]
struct SubscriptionSpec {
    path: String,
    mode: &'static str,
}

/// One frame on the subscribe socket: either an update batch or the
/// initial-sync marker.
#[derive(Debug, Default, Deserialize)]
struct SubscribeFrame {
    #[serde(default)]
    update: Option<WireNotification>,
    #[serde(default)]
    sync_response: bool,
}

impl GatewaySource {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn target_for(&self, device: &Device) -> String {
        format!("{}:{}", device.address, self.config.device_port)
    }
}

#[async_trait]
impl TelemetrySource for GatewaySource {
    async fn get(&self, device: &Device) -> Result<Vec<Notification>, SessionError> {
        let target = self.target_for(device);
        let request = GetRequest {
            target: target.clone(),
            username: &self.config.username,
            password: &self.config.password,
            path: device.interface_paths(),
            encoding: "json_ietf",
        };

        let url = format!("{}/get", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SessionError::Connect {
                target: target.clone(),
                reason: e.to_string(),
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SessionError::Auth { target })
            }
            status if !status.is_success() => {
                return Err(SessionError::Protocol(format!(
                    "gateway returned {} for {}",
                    status, target
                )))
            }
            _ => {}
        }

        let body: GetResponse = response
            .json()
            .await
            .map_err(|e| SessionError::Decode(e.to_string()))?;

        Ok(body
            .notification
            .into_iter()
            .map(WireNotification::into_notification)
            .collect())
    }

    async fn subscribe_on_change(&self, device: &Device) -> Result<UpdateStream, SessionError> {
        let target = self.target_for(device);
        let url = format!("{}/subscribe", websocket_base(&self.config.base_url));
        debug!(%target, %url, "opening subscribe socket");

        let (mut socket, _response) =
            connect_async(&url)
                .await
                .map_err(|e| SessionError::Connect {
                    target: target.clone(),
                    reason: e.to_string(),
                })?;

        let request = SubscribeRequest {
            target: target.clone(),
            username: &self.config.username,
            password: &self.config.password,
            subscription: device
                .interface_paths()
                .into_iter()
                .map(|path| SubscriptionSpec {
                    path,
                    mode: "on_change",
                })
                .collect(),
            mode: "stream",
            encoding: "json",
        };
        let first = serde_json::to_string(&request)
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        socket
            .send(Message::Text(first.into()))
            .await
            .map_err(|e| SessionError::Connect {
                target,
                reason: e.to_string(),
            })?;

        Ok(Box::pin(
            socket.filter_map(|frame| async move { decode_frame(frame) }),
        ))
    }
}

/// Decode one socket frame. `None` means the frame carries nothing for the
/// consumer (sync marker, keepalive).
fn decode_frame(
    frame: Result<Message, tungstenite::Error>,
) -> Option<Result<Notification, SessionError>> {
    match frame {
        Ok(Message::Text(text)) => match serde_json::from_str::<SubscribeFrame>(text.as_str()) {
            Ok(frame) if frame.sync_response => None,
            Ok(frame) => frame
                .update
                .map(|notification| Ok(notification.into_notification())),
            Err(e) => Some(Err(SessionError::Decode(e.to_string()))),
        },
        Ok(Message::Close(_)) => Some(Err(SessionError::Closed)),
        Ok(_) => None,
        Err(e) => Some(Err(SessionError::Protocol(e.to_string()))),
    }
}

fn websocket_base(base_url: &str) -> String {
    if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        format!("ws://{}", base_url)
    }
}
