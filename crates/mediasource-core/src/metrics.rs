//! Per-source counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

use crate::buffer::Delivery;

/// Point-in-time copy of a source's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Chunks read from the device.
    pub chunks_read: u64,

    /// Bytes read from the device.
    pub bytes_read: u64,

    /// Chunk copies queued into track buffers.
    pub chunks_delivered: u64,

    /// Chunks evicted from buffers of slow tracks.
    pub chunks_evicted: u64,

    /// Times the device was started.
    pub device_starts: u64,

    /// Times the device was stopped.
    pub device_stops: u64,

    /// Device reads that ended a session with an error.
    pub read_failures: u64,

    /// Tracks currently open.
    pub live_tracks: u64,

    /// Time since the current streaming session began.
    pub session_uptime: Option<Duration>,
}

/// Collects counters for one media source.
#[derive(Default)]
pub struct SourceMetrics {
    chunks_read: AtomicU64,
    bytes_read: AtomicU64,
    chunks_delivered: AtomicU64,
    chunks_evicted: AtomicU64,
    device_starts: AtomicU64,
    device_stops: AtomicU64,
    read_failures: AtomicU64,
    tracks_opened: AtomicU64,
    tracks_closed: AtomicU64,
    session_start: RwLock<Option<Instant>>,
}

impl SourceMetrics {
    /// Create a zeroed collector.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_device_start(&self) {
        self.device_starts.fetch_add(1, Ordering::Relaxed);
        *self.session_start.write() = Some(Instant::now());
    }

    pub(crate) fn record_device_stop(&self) {
        self.device_stops.fetch_add(1, Ordering::Relaxed);
        if let Some(start) = self.session_start.write().take() {
            debug!(uptime_secs = start.elapsed().as_secs_f32(), "Session ended");
        }
    }

    pub(crate) fn record_chunk(&self, bytes: usize) {
        self.chunks_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery(&self, delivery: Delivery) {
        match delivery {
            Delivery::Queued => {
                self.chunks_delivered.fetch_add(1, Ordering::Relaxed);
            }
            Delivery::Evicted => {
                self.chunks_delivered.fetch_add(1, Ordering::Relaxed);
                self.chunks_evicted.fetch_add(1, Ordering::Relaxed);
            }
            Delivery::Dropped => {}
        }
    }

    pub(crate) fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_track_opened(&self) {
        self.tracks_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_track_closed(&self) {
        self.tracks_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let opened = self.tracks_opened.load(Ordering::Relaxed);
        let closed = self.tracks_closed.load(Ordering::Relaxed);

        MetricsSnapshot {
            chunks_read: self.chunks_read.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            chunks_delivered: self.chunks_delivered.load(Ordering::Relaxed),
            chunks_evicted: self.chunks_evicted.load(Ordering::Relaxed),
            device_starts: self.device_starts.load(Ordering::Relaxed),
            device_stops: self.device_stops.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            live_tracks: opened.saturating_sub(closed),
            session_uptime: self.session_start.read().map(|s| s.elapsed()),
        }
    }
}
