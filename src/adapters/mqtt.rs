use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tracing::{debug, warn};

use crate::ports::{BusError, BusPublisher};

/// Durable-bus publisher over MQTT.
///
/// The record key becomes a topic suffix (`<channel>/<key>`), so consumers
/// get per-device substreams the way a keyed partition would. The event
/// loop runs on its own task; rumqttc reconnects on the next poll after a
/// connection error.
pub struct MqttBus {
    client: AsyncClient,
}

impl MqttBus {
    /// Connect to the broker at `host:port` and start the driver task
    pub fn connect(broker: &str) -> Result<Self, BusError> {
        let (host, port) = split_host_port(broker)?;
        let mut options = MqttOptions::new("gnmon", host, port);
        options.set_keep_alive(Duration::from_secs(15));

        let (client, mut eventloop) = AsyncClient::new(options, 32);

        // Publishes only go out while the event loop is polled.
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt connection error");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });

        Ok(Self { client })
    }
}

fn split_host_port(broker: &str) -> Result<(String, u16), BusError> {
    let (host, port) = broker
        .rsplit_once(':')
        .ok_or_else(|| BusError::Connect(format!("invalid broker address: {}", broker)))?;
    let port = port
        .parse()
        .map_err(|_| BusError::Connect(format!("invalid broker port: {}", broker)))?;
    Ok((host.to_string(), port))
}

#[async_trait]
impl BusPublisher for MqttBus {
    async fn ensure_channel(&self, channel: &str) -> Result<(), BusError> {
        // MQTT topics exist implicitly; nothing to create up front.
        debug!(channel, "bus channel ready");
        Ok(())
    }

    async fn publish(&self, channel: &str, key: &str, payload: &[u8]) -> Result<(), BusError> {
        let topic = format!("{}/{}", channel, key);
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await
            .map_err(|e| BusError::Publish {
                channel: channel.to_string(),
                reason: e.to_string(),
            })
    }
}
