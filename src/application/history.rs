use std::collections::VecDeque;
use std::sync::Arc;

use tracing::warn;

use crate::domain::CycleSnapshot;

/// Bounded, time-ordered buffer of sealed cycles.
///
/// Single writer (the tick worker). Once full, every append evicts the
/// oldest cycle, so the buffer always covers the most recent window.
/// Replay never reads this directly; it reads a [`HistoryView`] frozen at
/// a tick boundary.
#[derive(Debug)]
pub struct HistoryBuffer {
    entries: VecDeque<Arc<CycleSnapshot>>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append a sealed cycle, evicting the oldest entry on overflow.
    ///
    /// Seal times must be strictly increasing; an append that would break
    /// the order (wall-clock regression) is dropped and reported.
    pub fn append(&mut self, snapshot: Arc<CycleSnapshot>) -> bool {
        if let Some(newest) = self.entries.back() {
            if snapshot.collected_at <= newest.collected_at {
                warn!(
                    incoming = snapshot.collected_at,
                    newest = newest.collected_at,
                    "dropping out-of-order cycle"
                );
                return false;
            }
        }

        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
        true
    }

    /// Seal times of every buffered cycle, oldest first
    pub fn timestamps(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.collected_at).collect()
    }

    /// Freeze the current contents into an immutable view
    pub fn freeze(&self) -> HistoryView {
        HistoryView {
            entries: self.entries.iter().cloned().collect(),
        }
    }
}

// Test accessors.
#[cfg(test)]
impl HistoryBuffer {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn latest(&self) -> Option<&Arc<CycleSnapshot>> {
        self.entries.back()
    }
}

/// Immutable copy of the buffer taken at a tick boundary. Replay lookups
/// resolve against this, unaffected by later appends or evictions.
#[derive(Debug, Clone, Default)]
pub struct HistoryView {
    entries: Vec<Arc<CycleSnapshot>>,
}

impl HistoryView {
    /// Find the cycle sealed at exactly `timestamp`.
    ///
    /// Exact comparison is intentional: clients echo back timestamps we
    /// emitted, and f64 values round-trip unchanged through JSON.
    pub fn lookup(&self, timestamp: f64) -> Option<Arc<CycleSnapshot>> {
        self.entries
            .iter()
            .find(|e| e.collected_at == timestamp)
            .cloned()
    }

    pub fn latest_timestamp(&self) -> Option<f64> {
        self.entries.last().map(|e| e.collected_at)
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.collected_at).collect()
    }
}
