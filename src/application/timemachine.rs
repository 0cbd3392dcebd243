use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[cfg(test)]
use crate::domain::CycleSnapshot;
use crate::domain::{epoch_now, score};
use crate::ports::BusError;

use super::acquisition::{AcquisitionEngine, CollectionMode};
use super::history::{HistoryBuffer, HistoryView};
use super::sink::SinkDispatcher;

/// Client-controlled playback flags. Written by the command handlers,
/// read once per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackState {
    pub replay_active: bool,
    /// Seal time of the pinned cycle; `None` replays the newest buffered one
    pub selected_timestamp: Option<f64>,
}

impl PlaybackState {
    /// Replay is in effect when the flag is set or a timestamp is pinned
    pub fn is_replay(&self) -> bool {
        self.replay_active || self.selected_timestamp.is_some()
    }
}

/// Timing and sizing knobs for the tick loop
#[derive(Debug, Clone)]
pub struct TickSettings {
    pub mode: CollectionMode,
    pub history_size: usize,
    /// Target cadence of LIVE ticks; poll time counts against it
    pub live_interval: Duration,
    pub replay_interval: Duration,
    /// Extra pause after a failed tick
    pub error_pause: Duration,
}

impl Default for TickSettings {
    fn default() -> Self {
        Self {
            mode: CollectionMode::Parallel,
            history_size: 120,
            live_interval: Duration::from_millis(500),
            replay_interval: Duration::from_millis(1000),
            error_pause: Duration::from_millis(1000),
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A fresh cycle was collected, buffered and emitted
    Live { poll_duration: Duration },
    /// A buffered cycle was served again
    Replayed { timestamp: f64 },
    /// Replay target absent from the frozen view; nothing was emitted
    ReplayMiss { timestamp: Option<f64> },
    /// Collected cycle sealed at or before the newest buffered one
    /// (clock regression); nothing was emitted
    Discarded,
    /// Another tick still held the acquisition lock
    Busy,
}

#[derive(Debug, Error)]
pub enum TickError {
    #[error("cycle encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Bus(#[from] BusError),
}

struct TickState {
    history: HistoryBuffer,
    frozen: HistoryView,
}

/// Drives the LIVE/REPLAY loop: collect, buffer, score, emit.
///
/// LIVE ticks collect a fresh cycle, append it to the history and refresh
/// the frozen view. REPLAY ticks serve a buffered cycle from the frozen
/// view without touching the device fleet. Commands may arrive mid-tick;
/// they take effect at the next tick boundary.
pub struct TimeMachine {
    engine: AcquisitionEngine,
    sink: SinkDispatcher,
    settings: TickSettings,
    playback: RwLock<PlaybackState>,
    state: Mutex<TickState>,
    running: AtomicBool,
    cancel: CancellationToken,
}

impl TimeMachine {
    pub fn new(engine: AcquisitionEngine, sink: SinkDispatcher, settings: TickSettings) -> Self {
        let state = TickState {
            history: HistoryBuffer::new(settings.history_size),
            frozen: HistoryView::default(),
        };
        Self {
            engine,
            sink,
            settings,
            playback: RwLock::new(PlaybackState::default()),
            state: Mutex::new(state),
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Pin (or clear) the replayed cycle
    pub fn select_timestamp(&self, timestamp: Option<f64>) {
        self.playback.write().unwrap().selected_timestamp = timestamp;
    }

    /// Toggle replay mode; leaving it clears any pinned timestamp
    pub fn set_replay_active(&self, active: bool) {
        let mut playback = self.playback.write().unwrap();
        playback.replay_active = active;
        if !active {
            playback.selected_timestamp = None;
        }
    }

    pub fn playback(&self) -> PlaybackState {
        *self.playback.read().unwrap()
    }

    /// Start the tick worker. Idempotent; only the first call spawns.
    pub fn spawn(self: &Arc<Self>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        let machine = Arc::clone(self);
        tokio::spawn(async move { machine.run().await });
        true
    }

    /// Stop the tick worker and any subscription workers at their next
    /// boundary
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.engine.shutdown();
    }

    async fn run(&self) {
        info!(mode = ?self.settings.mode, "tick worker started");

        while !self.cancel.is_cancelled() {
            let pause = match self.tick().await {
                Ok(TickOutcome::Live { poll_duration }) => {
                    self.settings.live_interval.saturating_sub(poll_duration)
                }
                Ok(TickOutcome::Replayed { .. } | TickOutcome::ReplayMiss { .. }) => {
                    self.settings.replay_interval
                }
                Ok(TickOutcome::Busy | TickOutcome::Discarded) => self.settings.live_interval,
                Err(e) => {
                    error!(error = %e, "tick failed");
                    self.sink.emit_error(&e.to_string());
                    self.settings.error_pause
                }
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("tick worker stopped");
    }

    /// One LIVE or REPLAY tick, per the playback state at entry
    pub async fn tick(&self) -> Result<TickOutcome, TickError> {
        if self.playback().is_replay() {
            self.replay_tick().await
        } else {
            self.live_tick().await
        }
    }

    async fn live_tick(&self) -> Result<TickOutcome, TickError> {
        // One cycle at a time; a contended attempt is a no-op.
        let Ok(mut state) = self.state.try_lock() else {
            return Ok(TickOutcome::Busy);
        };

        let start = epoch_now();
        let snapshot = Arc::new(self.engine.collect(self.settings.mode).await);
        let poll_duration =
            Duration::from_secs_f64((snapshot.collected_at - start).max(0.0));

        // A rejected cycle must stay invisible to clients; replay could
        // never reach its timestamp.
        if !state.history.append(Arc::clone(&snapshot)) {
            return Ok(TickOutcome::Discarded);
        }
        state.frozen = state.history.freeze();
        let timestamps = state.history.timestamps();
        drop(state);

        let record = score(&snapshot, Some(start), Some(poll_duration));
        self.sink.broadcast_cycle(&snapshot, timestamps)?;
        self.sink.emit_stats(record);
        self.sink.publish_cycle(&snapshot).await?;

        Ok(TickOutcome::Live { poll_duration })
    }

    async fn replay_tick(&self) -> Result<TickOutcome, TickError> {
        let playback = self.playback();
        let Ok(state) = self.state.try_lock() else {
            return Ok(TickOutcome::Busy);
        };
        let frozen = state.frozen.clone();
        drop(state);

        let Some(target) = playback
            .selected_timestamp
            .or_else(|| frozen.latest_timestamp())
        else {
            // Nothing buffered yet.
            return Ok(TickOutcome::ReplayMiss { timestamp: None });
        };

        let Some(snapshot) = frozen.lookup(target) else {
            debug!(timestamp = target, "no buffered cycle matches replay target");
            return Ok(TickOutcome::ReplayMiss {
                timestamp: Some(target),
            });
        };

        let record = score(&snapshot, None, None);
        self.sink.broadcast_cycle(&snapshot, frozen.timestamps())?;
        self.sink.emit_stats(record);

        Ok(TickOutcome::Replayed { timestamp: target })
    }
}

// Test accessors.
#[cfg(test)]
impl TimeMachine {
    async fn history_len(&self) -> usize {
        self.state.lock().await.history.len()
    }

    /// Seal times of every buffered cycle, oldest first
    async fn available_timestamps(&self) -> Vec<f64> {
        self.state.lock().await.history.timestamps()
    }

    /// Pre-load one buffered cycle
    async fn seed_history(&self, snapshot: Arc<CycleSnapshot>) {
        let mut state = self.state.lock().await;
        state.history.append(snapshot);
        state.frozen = state.history.freeze();
    }
}
