use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{apply_update, CycleData, Device, DeviceInterfaces, UpdatePath};
use crate::ports::{Notification, SessionError, TelemetrySource};

/// Owns the shared state tree fed by per-device on-change workers.
///
/// Workers are supervised tasks: each runs an endless connect-and-read
/// loop with a fixed resubscribe delay and stops at the next boundary
/// once the cancellation token fires. Tree writes are serialized by a
/// single mutex held only while one update is applied.
pub struct SubscriptionManager {
    devices: Arc<Vec<Device>>,
    source: Arc<dyn TelemetrySource>,
    tree: Arc<Mutex<CycleData>>,
    started: AtomicBool,
    cancel: CancellationToken,
    resubscribe_delay: Duration,
}

impl SubscriptionManager {
    pub fn new(
        devices: Arc<Vec<Device>>,
        source: Arc<dyn TelemetrySource>,
        resubscribe_delay: Duration,
    ) -> Self {
        Self {
            devices,
            source,
            tree: Arc::new(Mutex::new(CycleData::new())),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            resubscribe_delay,
        }
    }

    /// Mark the manager started. True on the first call only; the caller
    /// seeds the tree and spawns workers exactly once.
    pub fn start(&self) -> bool {
        !self.started.swap(true, Ordering::SeqCst)
    }

    /// Install the seed tree from an initial full collection
    pub fn seed(&self, data: CycleData) {
        *self.tree.lock().unwrap() = data;
    }

    /// Deep-copy the live tree; the copy is untouched by later updates.
    pub fn freeze(&self) -> CycleData {
        self.tree.lock().unwrap().clone()
    }

    /// Spawn one persistent worker per device
    pub fn spawn_workers(&self) {
        for device in self.devices.iter() {
            let worker = DeviceWorker {
                device: device.clone(),
                source: Arc::clone(&self.source),
                tree: Arc::clone(&self.tree),
                cancel: self.cancel.clone(),
                resubscribe_delay: self.resubscribe_delay,
            };
            tokio::spawn(worker.run());
        }
    }

    /// Stop all workers at their next loop or backoff boundary
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

struct DeviceWorker {
    device: Device,
    source: Arc<dyn TelemetrySource>,
    tree: Arc<Mutex<CycleData>>,
    cancel: CancellationToken,
    resubscribe_delay: Duration,
}

impl DeviceWorker {
    async fn run(self) {
        info!(hostname = %self.device.hostname, "subscription worker started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.run_stream().await {
                Ok(()) => info!(hostname = %self.device.hostname, "subscription stream ended"),
                Err(e) => {
                    warn!(hostname = %self.device.hostname, error = %e, "subscription stream failed")
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.resubscribe_delay) => {}
            }
        }

        debug!(hostname = %self.device.hostname, "subscription worker stopped");
    }

    async fn run_stream(&self) -> Result<(), SessionError> {
        let mut stream = self.source.subscribe_on_change(&self.device).await?;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                item = stream.next() => match item {
                    Some(Ok(notification)) => self.apply(notification),
                    Some(Err(e)) => return Err(e),
                    None => return Ok(()),
                },
            }
        }
    }

    /// Merge one notification into the shared tree. Updates without a
    /// device timestamp are stamped with the local receive time.
    fn apply(&self, notification: Notification) {
        let timestamp = notification.timestamp.unwrap_or_else(now_ns);

        for update in notification.updates {
            let Some(value) = update.value else {
                debug!(hostname = %self.device.hostname, path = %update.path, "update without value");
                continue;
            };
            let path = UpdatePath::parse(&update.path);

            let mut tree = self.tree.lock().unwrap();
            let interfaces = tree
                .entry(self.device.hostname.clone())
                .or_insert_with(|| Some(DeviceInterfaces::new()))
                .get_or_insert_with(DeviceInterfaces::new);
            apply_update(interfaces, &path, value, Some(timestamp));
        }
    }
}

fn now_ns() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{update, MockSource};
    use serde_json::json;

    fn fleet() -> Arc<Vec<Device>> {
        Arc::new(vec![
            Device::new("R1", "172.20.20.2", vec!["eth0".to_string()]),
            Device::new("R2", "172.20.20.3", vec!["eth0".to_string()]),
        ])
    }

    #[test]
    fn test_start_fires_once() {
        let source = Arc::new(MockSource::default());
        let manager = SubscriptionManager::new(fleet(), source, Duration::from_secs(5));

        assert!(manager.start());
        assert!(!manager.start());
        assert!(!manager.start());
    }

    #[test]
    fn test_freeze_is_a_deep_copy() {
        let source = Arc::new(MockSource::default());
        let manager = SubscriptionManager::new(fleet(), source, Duration::from_secs(5));

        let mut seed = CycleData::new();
        seed.insert("R1".to_string(), Some(DeviceInterfaces::new()));
        manager.seed(seed);

        let frozen = manager.freeze();
        manager.seed(CycleData::new());

        assert_eq!(frozen.len(), 1);
        assert!(manager.freeze().is_empty());
    }

    #[tokio::test]
    async fn test_workers_merge_stream_updates() {
        let source = Arc::new(
            MockSource::default()
                .with_stream(
                    "R1",
                    vec![Notification {
                        timestamp: Some(77),
                        updates: vec![update("interface[name=eth0]/oper-state", json!("up"))],
                    }],
                )
                .with_stream(
                    "R2",
                    vec![Notification {
                        timestamp: None,
                        updates: vec![update("interface[name=eth0]/mtu", json!("9232"))],
                    }],
                ),
        );
        let manager =
            SubscriptionManager::new(fleet(), source, Duration::from_secs(3600));

        assert!(manager.start());
        manager.seed(CycleData::new());
        manager.spawn_workers();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let tree = manager.freeze();
        let r1 = tree["R1"].as_ref().unwrap();
        assert_eq!(r1["eth0"].report_timestamp, Some(77));
        assert_eq!(r1["eth0"].attributes["oper-state"], json!("up"));

        // Missing device timestamp falls back to local receive time.
        let r2 = tree["R2"].as_ref().unwrap();
        assert!(r2["eth0"].report_timestamp.unwrap() > 0);
        assert_eq!(r2["eth0"].attributes["mtu"], json!(9232));

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_worker_resubscribes_after_failures() {
        let source = Arc::new(
            MockSource::default()
                .with_stream_refusal("R1")
                .with_stream_break("R1", vec![])
                .with_stream(
                    "R1",
                    vec![Notification {
                        timestamp: Some(42),
                        updates: vec![update("interface[name=eth0]/mtu", json!("9000"))],
                    }],
                ),
        );
        let devices = Arc::new(vec![Device::new(
            "R1",
            "172.20.20.2",
            vec!["eth0".to_string()],
        )]);
        let manager = SubscriptionManager::new(
            devices,
            Arc::clone(&source) as Arc<dyn TelemetrySource>,
            Duration::from_millis(25),
        );

        manager.start();
        manager.seed(CycleData::new());
        manager.spawn_workers();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // A refused subscribe and a mid-stream death each cost one backoff;
        // the third subscription delivers.
        assert!(source.subscribe_calls("R1") >= 3);
        let tree = manager.freeze();
        let r1 = tree["R1"].as_ref().unwrap();
        assert_eq!(r1["eth0"].report_timestamp, Some(42));
        assert_eq!(r1["eth0"].attributes["mtu"], json!(9000));

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_stream_updates_replace_failed_seed() {
        let source = Arc::new(MockSource::default().with_stream(
            "R1",
            vec![Notification {
                timestamp: Some(5),
                updates: vec![update("interface[name=eth0]/mtu", json!(1500))],
            }],
        ));
        let devices = Arc::new(vec![Device::new(
            "R1",
            "172.20.20.2",
            vec!["eth0".to_string()],
        )]);
        let manager =
            SubscriptionManager::new(devices, source, Duration::from_secs(3600));

        // Seed marks R1 failed; the first stream update revives it.
        let mut seed = CycleData::new();
        seed.insert("R1".to_string(), None);
        manager.start();
        manager.seed(seed);
        manager.spawn_workers();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let tree = manager.freeze();
        assert!(tree["R1"].is_some());

        manager.shutdown();
    }
}
