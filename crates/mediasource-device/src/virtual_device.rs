//! Scripted in-process capture device.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace};

use crate::error::DeviceError;
use crate::format::{FrameSize, SampleFormat};
use crate::{CaptureDevice, DeviceConfig, DeviceDriver, DeviceResult};

/// Which optional controls a [`VirtualDevice`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceControls {
    pub bitrate: bool,
    pub flip: bool,
    pub key_frame: bool,
    pub frame_rate: bool,
    pub frame_size: bool,
    pub audio: bool,
}

impl DeviceControls {
    /// Controls of a typical hardware H.264 camera: bitrate and flips only.
    pub fn h264_camera() -> Self {
        Self {
            bitrate: true,
            flip: true,
            key_frame: false,
            frame_rate: false,
            frame_size: false,
            audio: false,
        }
    }

    /// Every control supported.
    pub fn all() -> Self {
        Self {
            bitrate: true,
            flip: true,
            key_frame: true,
            frame_rate: true,
            frame_size: true,
            audio: true,
        }
    }

    /// No optional controls.
    pub fn none() -> Self {
        Self {
            bitrate: false,
            flip: false,
            key_frame: false,
            frame_rate: false,
            frame_size: false,
            audio: false,
        }
    }
}

impl Default for DeviceControls {
    fn default() -> Self {
        Self::h264_camera()
    }
}

enum Step {
    Chunk(Bytes),
    Fail(String),
}

#[derive(Default)]
struct VirtualState {
    running: bool,
    closed: bool,
    queue: VecDeque<Step>,
    opened_with: Option<DeviceConfig>,
    bitrate: Option<u32>,
    hflip: bool,
    vflip: bool,
    frame_rate: Option<u32>,
    frame_size: Option<FrameSize>,
    audio: Option<(u32, u16, SampleFormat)>,
}

/// A capture device fed by the test or demo harness.
///
/// Chunks pushed while the device is running are returned by `read` in
/// order; chunks pushed while it is stopped are discarded, the same as a
/// camera that only produces frames while streaming.
pub struct VirtualDevice {
    state: Mutex<VirtualState>,
    ready: Condvar,
    controls: DeviceControls,
    starts: AtomicU64,
    stops: AtomicU64,
    closes: AtomicU64,
    key_frames: AtomicU64,
}

impl VirtualDevice {
    /// Create a device with the controls of a typical H.264 camera.
    pub fn new() -> Arc<Self> {
        Self::with_controls(DeviceControls::default())
    }

    /// Create a device accepting the given controls.
    pub fn with_controls(controls: DeviceControls) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(VirtualState::default()),
            ready: Condvar::new(),
            controls,
            starts: AtomicU64::new(0),
            stops: AtomicU64::new(0),
            closes: AtomicU64::new(0),
            key_frames: AtomicU64::new(0),
        })
    }

    /// Queue a chunk for the next read. Returns false if the device is not running.
    pub fn push(&self, chunk: impl Into<Bytes>) -> bool {
        let mut state = self.state.lock();
        if !state.running {
            trace!("Virtual device stopped, discarding chunk");
            return false;
        }
        state.queue.push_back(Step::Chunk(chunk.into()));
        self.ready.notify_all();
        true
    }

    /// Make the next read fail once the queued chunks are consumed.
    pub fn fail(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        state.queue.push_back(Step::Fail(reason.into()));
        self.ready.notify_all();
    }

    /// Check if the device is producing data.
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Check if the device has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of times the device was started.
    pub fn start_count(&self) -> u64 {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of times the device was stopped.
    pub fn stop_count(&self) -> u64 {
        self.stops.load(Ordering::SeqCst)
    }

    /// Number of times the device was closed.
    pub fn close_count(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    /// Number of key frame requests received.
    pub fn key_frame_requests(&self) -> u64 {
        self.key_frames.load(Ordering::SeqCst)
    }

    /// Configuration passed by the driver at open time.
    pub fn opened_with(&self) -> Option<DeviceConfig> {
        self.state.lock().opened_with.clone()
    }

    /// Last bitrate applied.
    pub fn bitrate(&self) -> Option<u32> {
        self.state.lock().bitrate
    }

    /// Horizontal and vertical flip state.
    pub fn flips(&self) -> (bool, bool) {
        let state = self.state.lock();
        (state.hflip, state.vflip)
    }

    /// Last frame rate applied.
    pub fn frame_rate(&self) -> Option<u32> {
        self.state.lock().frame_rate
    }

    /// Last frame size applied.
    pub fn frame_size(&self) -> Option<FrameSize> {
        self.state.lock().frame_size
    }

    /// Last audio configuration applied.
    pub fn audio_config(&self) -> Option<(u32, u16, SampleFormat)> {
        self.state.lock().audio
    }

    fn ensure_open(state: &VirtualState) -> DeviceResult<()> {
        if state.closed {
            Err(DeviceError::Closed)
        } else {
            Ok(())
        }
    }
}

impl CaptureDevice for VirtualDevice {
    fn start(&self) -> DeviceResult<()> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.running = true;
        self.starts.fetch_add(1, Ordering::SeqCst);
        debug!("Virtual device started");
        Ok(())
    }

    fn stop(&self) -> DeviceResult<()> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.running = false;
        state.queue.clear();
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.ready.notify_all();
        debug!("Virtual device stopped");
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> DeviceResult<usize> {
        let mut state = self.state.lock();
        loop {
            Self::ensure_open(&state)?;
            if !state.running {
                return Ok(0);
            }

            match state.queue.pop_front() {
                Some(Step::Chunk(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        state.queue.push_front(Step::Chunk(chunk.slice(n..)));
                    }
                    return Ok(n);
                }
                Some(Step::Fail(reason)) => return Err(DeviceError::ReadFailed(reason)),
                None => self.ready.wait(&mut state),
            }
        }
    }

    fn close(&self) -> DeviceResult<()> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.closed = true;
        state.running = false;
        state.queue.clear();
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.ready.notify_all();
        info!("Virtual device closed");
        Ok(())
    }

    fn set_bitrate(&self, bitrate: u32) -> DeviceResult<()> {
        if !self.controls.bitrate {
            return Err(DeviceError::NotSupported("bitrate"));
        }
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.bitrate = Some(bitrate);
        Ok(())
    }

    fn flip_horizontal(&self) -> DeviceResult<()> {
        if !self.controls.flip {
            return Err(DeviceError::NotSupported("horizontal flip"));
        }
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.hflip = !state.hflip;
        Ok(())
    }

    fn flip_vertical(&self) -> DeviceResult<()> {
        if !self.controls.flip {
            return Err(DeviceError::NotSupported("vertical flip"));
        }
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.vflip = !state.vflip;
        Ok(())
    }

    fn force_key_frame(&self) -> DeviceResult<()> {
        if !self.controls.key_frame {
            return Err(DeviceError::NotSupported("key frame request"));
        }
        Self::ensure_open(&self.state.lock())?;
        self.key_frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_frame_rate(&self, fps: u32) -> DeviceResult<()> {
        if !self.controls.frame_rate {
            return Err(DeviceError::NotSupported("frame rate"));
        }
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.frame_rate = Some(fps);
        Ok(())
    }

    fn set_frame_size(&self, size: FrameSize) -> DeviceResult<()> {
        if !self.controls.frame_size {
            return Err(DeviceError::NotSupported("frame size"));
        }
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.frame_size = Some(size);
        Ok(())
    }

    fn configure_audio(
        &self,
        sample_rate: u32,
        channels: u16,
        format: SampleFormat,
    ) -> DeviceResult<()> {
        if !self.controls.audio {
            return Err(DeviceError::NotSupported("audio configuration"));
        }
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.audio = Some((sample_rate, channels, format));
        Ok(())
    }
}

/// Driver resolving paths to registered [`VirtualDevice`]s.
#[derive(Default)]
pub struct VirtualDriver {
    devices: Mutex<HashMap<PathBuf, Arc<VirtualDevice>>>,
}

impl VirtualDriver {
    /// Create a driver with no devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device under `path`.
    pub fn with_device(self, path: impl Into<PathBuf>, device: Arc<VirtualDevice>) -> Self {
        self.devices.lock().insert(path.into(), device);
        self
    }
}

impl DeviceDriver for VirtualDriver {
    fn open(&self, path: &Path, config: &DeviceConfig) -> DeviceResult<Arc<dyn CaptureDevice>> {
        let device = self
            .devices
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| DeviceError::NotFound(path.display().to_string()))?;

        {
            let mut state = device.state.lock();
            if state.closed {
                return Err(DeviceError::OpenFailed {
                    path: path.display().to_string(),
                    reason: "device already closed".into(),
                });
            }
            state.opened_with = Some(config.clone());
        }

        debug!(path = %path.display(), ?config, "Opened virtual device");
        Ok(device)
    }
}
