//! Capture-backed fan-out engine shared by the video and audio sources.
//!
//! The source owns the device and the set of live track buffers. The device
//! runs exactly while that set is non-empty: the first track starts it and
//! spawns the read loop, the last removal stops it. The read loop copies
//! every chunk into every live buffer and, on a device failure, closes all
//! tracks through the same removal path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, trace, warn};

use mediasource_device::CaptureDevice;

use crate::buffer::{broadcast_buffer, BufferWriter};
use crate::metrics::{MetricsSnapshot, SourceMetrics};
use crate::track::{Track, TrackId, TrackOwner};
use crate::{MediaError, MediaResult, READ_CHUNK_SIZE};

/// A fan-out media source over one capture device.
pub struct CaptureSource {
    inner: Arc<Inner>,
}

struct Inner {
    device: Arc<dyn CaptureDevice>,
    codec: &'static str,
    track_capacity: usize,
    state: Mutex<SourceState>,
    metrics: SourceMetrics,
}

#[derive(Default)]
struct SourceState {
    tracks: HashMap<TrackId, BufferWriter>,
    lifecycle: Lifecycle,
    /// Completion signal of a read loop whose device was stopped.
    draining: Option<Receiver<()>>,
    next_session: u64,
}

/// Where the source is in its lifecycle.
///
/// `Streaming` holds exactly while `tracks` is non-empty.
#[derive(Default)]
enum Lifecycle {
    /// Device stopped, ready for a new session.
    #[default]
    Idle,

    /// Device running with a read loop attached.
    Streaming(Session),

    /// A device read failed. Terminal until closed.
    Failed,

    /// Closed by the owner. Terminal.
    Closed,
}

struct Session {
    id: u64,
    cancel: Arc<AtomicBool>,
    done: Receiver<()>,
}

impl CaptureSource {
    /// Wrap an opened device. The device must be stopped.
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        codec: &'static str,
        track_capacity: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                device,
                codec,
                track_capacity,
                state: Mutex::new(SourceState::default()),
                metrics: SourceMetrics::new(),
            }),
        }
    }

    /// Codec label, fixed for the lifetime of the source.
    pub fn codec(&self) -> &'static str {
        self.inner.codec
    }

    /// The capture device driven by this source.
    pub fn device(&self) -> &Arc<dyn CaptureDevice> {
        &self.inner.device
    }

    /// Allocate a new track. The first outstanding track starts the device.
    #[instrument(name = "get_track", skip(self), fields(codec = self.inner.codec))]
    pub fn get_track(&self) -> MediaResult<Track> {
        let mut state = self.inner.state.lock();

        loop {
            match state.lifecycle {
                Lifecycle::Closed => return Err(MediaError::SourceClosed),
                Lifecycle::Failed => return Err(MediaError::DeviceFailed),
                Lifecycle::Streaming(_) => break,
                Lifecycle::Idle => {}
            }
            // Never restart the device while the previous loop may still read.
            match state.draining.clone() {
                Some(done) if !loop_finished(&done) => {
                    debug!("Waiting for previous read loop to exit");
                    MutexGuard::unlocked(&mut state, || {
                        let _ = done.recv();
                    });
                }
                Some(_) => state.draining = None,
                None => break,
            }
        }

        if matches!(state.lifecycle, Lifecycle::Idle) {
            start_session(&self.inner, &mut state)?;
        }

        let id = TrackId::next();
        let (writer, reader) = broadcast_buffer(self.inner.track_capacity);
        state.tracks.insert(id, writer);
        self.inner.metrics.record_track_opened();

        info!(track_id = %id, tracks = state.tracks.len(), "Track added");

        let owner: Arc<dyn TrackOwner> = self.inner.clone();
        Ok(Track::new(id, self.inner.codec, reader, owner))
    }

    /// Remove a track. Unknown or already-closed tracks are ignored.
    pub fn close_track(&self, track: &Track) {
        self.inner.remove_track(track.id());
    }

    /// Close every outstanding track, then the device.
    ///
    /// Subsequent calls to [`get_track`](Self::get_track) fail. Idempotent.
    #[instrument(name = "close_source", skip(self), fields(codec = self.inner.codec))]
    pub fn close(&self) -> MediaResult<()> {
        let draining = {
            let mut state = self.inner.state.lock();
            if matches!(state.lifecycle, Lifecycle::Closed) {
                return Ok(());
            }

            let outstanding = state.tracks.len();
            close_all_tracks(&self.inner, &mut state);
            state.lifecycle = Lifecycle::Closed;
            if outstanding > 0 {
                info!(tracks = outstanding, "Force-closed outstanding tracks");
            }
            state.draining.take()
        };

        if let Some(done) = draining {
            let _ = done.recv();
        }

        self.inner.device.close()?;
        info!("Media source closed");
        Ok(())
    }

    /// Number of tracks currently open.
    pub fn track_count(&self) -> usize {
        self.inner.state.lock().tracks.len()
    }

    /// Check if the device is streaming.
    pub fn is_running(&self) -> bool {
        self.control().is_running()
    }

    /// Check if a device read failure disabled this source.
    pub fn is_failed(&self) -> bool {
        matches!(self.inner.state.lock().lifecycle, Lifecycle::Failed)
    }

    /// Handle for changing device settings that are fixed while streaming.
    pub(crate) fn control(&self) -> SourceControl {
        SourceControl {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Snapshot of this source's counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing media source on drop: {}", e);
        }
    }
}

/// Applies configuration-time device settings on behalf of a source.
pub(crate) struct SourceControl {
    inner: Arc<Inner>,
}

impl SourceControl {
    /// Run `apply` against the device only while no session is running.
    ///
    /// The source lock is held throughout, so no track can start the device
    /// between the check and the change.
    pub(crate) fn while_idle<R>(
        &self,
        what: &'static str,
        apply: impl FnOnce(&dyn CaptureDevice) -> MediaResult<R>,
    ) -> MediaResult<R> {
        let state = self.inner.state.lock();
        match state.lifecycle {
            Lifecycle::Idle => apply(self.inner.device.as_ref()),
            Lifecycle::Streaming(_) => Err(MediaError::StreamingStarted(what)),
            Lifecycle::Failed => Err(MediaError::DeviceFailed),
            Lifecycle::Closed => Err(MediaError::SourceClosed),
        }
    }

    /// Check if the device is streaming.
    pub(crate) fn is_running(&self) -> bool {
        matches!(self.inner.state.lock().lifecycle, Lifecycle::Streaming(_))
    }
}

impl Inner {
    fn remove_track(&self, id: TrackId) {
        let mut state = self.state.lock();
        if let Some(mut writer) = remove_track_locked(self, &mut state, id) {
            writer.close();
            info!(track_id = %id, tracks = state.tracks.len(), "Track closed");
        }
    }
}

impl TrackOwner for Inner {
    fn close_track(&self, id: TrackId) {
        self.remove_track(id);
    }
}

fn loop_finished(done: &Receiver<()>) -> bool {
    matches!(done.try_recv(), Err(TryRecvError::Disconnected))
}

/// Start the device and launch the read loop. Called on the 0 -> 1 transition.
fn start_session(inner: &Arc<Inner>, state: &mut SourceState) -> MediaResult<()> {
    inner.device.start()?;
    inner.metrics.record_device_start();

    state.next_session += 1;
    let id = state.next_session;
    let cancel = Arc::new(AtomicBool::new(false));
    let (done_tx, done_rx): (Sender<()>, Receiver<()>) = crossbeam_channel::bounded(0);

    let loop_inner = Arc::clone(inner);
    let loop_cancel = Arc::clone(&cancel);
    let spawned = thread::Builder::new()
        .name(format!("{}-read-loop", inner.codec.to_lowercase()))
        .spawn(move || {
            let _done = done_tx;
            read_loop(loop_inner, id, loop_cancel);
        });

    if let Err(e) = spawned {
        error!("Failed to spawn read loop: {}", e);
        if let Err(stop_err) = inner.device.stop() {
            warn!("Failed to stop device after spawn failure: {}", stop_err);
        }
        inner.metrics.record_device_stop();
        return Err(MediaError::Spawn(e));
    }

    info!(session = id, "Device started");
    state.lifecycle = Lifecycle::Streaming(Session {
        id,
        cancel,
        done: done_rx,
    });
    Ok(())
}

/// Stop the device and cancel the read loop. Called on the 1 -> 0 transition.
fn stop_session(inner: &Inner, state: &mut SourceState) {
    let session = match std::mem::take(&mut state.lifecycle) {
        Lifecycle::Streaming(session) => session,
        other => {
            state.lifecycle = other;
            return;
        }
    };

    session.cancel.store(true, Ordering::SeqCst);
    if let Err(e) = inner.device.stop() {
        warn!(session = session.id, "Failed to stop device: {}", e);
    }
    inner.metrics.record_device_stop();
    state.draining = Some(session.done);

    info!(session = session.id, "Device stopped");
}

fn remove_track_locked(
    inner: &Inner,
    state: &mut SourceState,
    id: TrackId,
) -> Option<BufferWriter> {
    let writer = state.tracks.remove(&id)?;
    inner.metrics.record_track_closed();

    if state.tracks.is_empty() {
        stop_session(inner, state);
    }
    Some(writer)
}

fn close_all_tracks(inner: &Inner, state: &mut SourceState) {
    let ids: Vec<TrackId> = state.tracks.keys().copied().collect();
    for id in ids {
        if let Some(mut writer) = remove_track_locked(inner, state, id) {
            writer.close();
            debug!(track_id = %id, "Track closed");
        }
    }
}

/// Read chunks from the device and copy each into every live buffer.
fn read_loop(inner: Arc<Inner>, session: u64, cancel: Arc<AtomicBool>) {
    debug!(session, "Read loop starting");

    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let failure = loop {
        if cancel.load(Ordering::SeqCst) {
            break None;
        }

        let n = match inner.device.read(&mut buf) {
            Ok(0) => break Some("device returned a terminal read".to_string()),
            Ok(n) => n,
            Err(e) => break Some(e.to_string()),
        };

        let chunk = Bytes::copy_from_slice(&buf[..n]);
        inner.metrics.record_chunk(n);

        let state = inner.state.lock();
        if cancel.load(Ordering::SeqCst) {
            break None;
        }
        for writer in state.tracks.values() {
            inner.metrics.record_delivery(writer.write(chunk.clone()));
        }
        trace!(session, bytes = n, tracks = state.tracks.len(), "Chunk delivered");
    };

    if let Some(reason) = failure {
        let mut state = inner.state.lock();
        // A stop racing the read is a normal shutdown.
        if cancel.load(Ordering::SeqCst) {
            debug!(session, "Read ended after device stop");
        } else {
            error!(
                session,
                tracks = state.tracks.len(),
                reason = %reason,
                "Device read failed, closing all tracks"
            );
            inner.metrics.record_read_failure();
            close_all_tracks(&inner, &mut state);
            state.lifecycle = Lifecycle::Failed;
        }
    }

    debug!(session, "Read loop exited");
}
