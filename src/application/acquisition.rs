use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::domain::{
    apply_update, epoch_now, CycleData, CycleSnapshot, Device, DeviceInterfaces, UpdatePath,
};
use crate::ports::{SessionError, TelemetrySource};

use super::subscription::SubscriptionManager;

/// How a collection cycle gathers device state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionMode {
    /// One device after another, registry order
    Serial,
    /// All devices at once through a bounded worker pool
    Parallel,
    /// Persistent on-change streams feeding a shared tree; each cycle is
    /// a deep copy of that tree
    SubscribeOnChange,
}

impl FromStr for CollectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serial" => Ok(Self::Serial),
            "parallel" => Ok(Self::Parallel),
            "subscribe" | "subscribe_on_change" | "on_change" => Ok(Self::SubscribeOnChange),
            other => Err(format!("unknown collection mode: {}", other)),
        }
    }
}

/// Executes collection cycles against the device fleet.
///
/// Device failures never fail a cycle: a device that cannot be fetched
/// appears as `None` in the cycle data and the others are unaffected.
pub struct AcquisitionEngine {
    devices: Arc<Vec<Device>>,
    source: Arc<dyn TelemetrySource>,
    subscriptions: SubscriptionManager,
    parallel_limit: usize,
}

impl AcquisitionEngine {
    pub fn new(
        devices: Arc<Vec<Device>>,
        source: Arc<dyn TelemetrySource>,
        parallel_limit: usize,
        resubscribe_delay: Duration,
    ) -> Self {
        let subscriptions = SubscriptionManager::new(
            Arc::clone(&devices),
            Arc::clone(&source),
            resubscribe_delay,
        );
        Self {
            devices,
            source,
            subscriptions,
            parallel_limit: parallel_limit.max(1),
        }
    }

    /// Run one collection cycle; the snapshot is sealed with the wall
    /// clock at completion.
    pub async fn collect(&self, mode: CollectionMode) -> CycleSnapshot {
        let data = match mode {
            CollectionMode::Serial => self.collect_serial().await,
            CollectionMode::Parallel => self.collect_parallel().await,
            CollectionMode::SubscribeOnChange => self.collect_subscribed().await,
        };
        CycleSnapshot::new(epoch_now(), data)
    }

    /// Stop subscription workers at their next boundary
    pub fn shutdown(&self) {
        self.subscriptions.shutdown();
    }

    async fn collect_serial(&self) -> CycleData {
        let mut data = CycleData::new();
        for device in self.devices.iter() {
            let (hostname, interfaces) = self.fetch_device(device).await;
            data.insert(hostname, interfaces);
        }
        data
    }

    async fn collect_parallel(&self) -> CycleData {
        let limit = self.parallel_limit.min(self.devices.len().max(1));
        // Owned devices keep the fan-out future spawnable.
        stream::iter(self.devices.iter().cloned())
            .map(|device| async move { self.fetch_device(&device).await })
            .buffer_unordered(limit)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect()
    }

    /// First activation seeds the shared tree with a full parallel sweep,
    /// then hands it to the stream workers. Every cycle afterwards is a
    /// deep copy of the tree as it stands.
    async fn collect_subscribed(&self) -> CycleData {
        if self.subscriptions.start() {
            let seed = self.collect_parallel().await;
            self.subscriptions.seed(seed);
            self.subscriptions.spawn_workers();
        }
        self.subscriptions.freeze()
    }

    async fn fetch_device(&self, device: &Device) -> (String, Option<DeviceInterfaces>) {
        match self.fetch_interfaces(device).await {
            Ok(interfaces) => (device.hostname.clone(), Some(interfaces)),
            Err(e) => {
                warn!(
                    hostname = %device.hostname,
                    address = %device.address,
                    error = %e,
                    "device fetch failed"
                );
                (device.hostname.clone(), None)
            }
        }
    }

    async fn fetch_interfaces(&self, device: &Device) -> Result<DeviceInterfaces, SessionError> {
        let notifications = self.source.get(device).await?;

        let mut interfaces = DeviceInterfaces::new();
        for notification in notifications {
            let timestamp = notification.timestamp;
            for update in notification.updates {
                let Some(value) = update.value else {
                    debug!(path = %update.path, "update without value");
                    continue;
                };
                let path = UpdatePath::parse(&update.path);
                apply_update(&mut interfaces, &path, value, timestamp);
            }
        }
        Ok(interfaces)
    }
}
