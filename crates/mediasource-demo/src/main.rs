//! Fan a virtual H.264 camera out to several readers.
//!
//! Usage: `mediasource-demo [settings.json] [readers]`

use std::env;
use std::io::Read;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use tracing::{info, warn};

use mediasource_config::SourceSettings;
use mediasource_core::{MediaSourcer, VideoCaptureSource, VideoSourcer};
use mediasource_device::{DeviceControls, VirtualDevice, VirtualDriver};

const DEFAULT_READERS: usize = 3;
const FRAMES: usize = 120;
const FRAME_INTERVAL: Duration = Duration::from_millis(5);

/// Annex B start code followed by a fake NAL unit of `len` bytes.
fn fake_frame(index: usize, len: usize) -> Bytes {
    let mut frame = vec![0x00, 0x00, 0x00, 0x01, if index % 30 == 0 { 0x65 } else { 0x41 }];
    frame.resize(len, (index % 251) as u8);
    Bytes::from(frame)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut args = env::args().skip(1);
    let settings = match args.next() {
        Some(path) => SourceSettings::load(&path)
            .with_context(|| format!("Failed to load settings from {}", path))?,
        None => SourceSettings::default(),
    };
    let readers = match args.next() {
        Some(n) => n.parse::<usize>().context("Reader count must be a number")?,
        None => DEFAULT_READERS,
    };
    if readers == 0 {
        bail!("At least one reader is required");
    }

    info!(device = %settings.device.display(), readers, "Starting media source demo");

    let device = VirtualDevice::with_controls(DeviceControls::all());
    let driver = VirtualDriver::new().with_device(settings.device.clone(), device.clone());
    let source = VideoCaptureSource::open(&driver, &settings)?;

    let mut handles = Vec::with_capacity(readers);
    for reader in 0..readers {
        let mut track = source.video()?;
        let handle = thread::Builder::new()
            .name(format!("reader-{}", reader))
            .spawn(move || {
                let mut total = 0usize;
                let mut buf = [0u8; 4096];
                loop {
                    match track.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => total += n,
                        Err(e) => {
                            warn!(track_id = %track.id(), "Read failed: {}", e);
                            break;
                        }
                    }
                }
                (track.id(), total, track.evicted())
            })
            .context("Failed to spawn reader thread")?;
        handles.push(handle);
    }

    let mut control = source.video()?;
    for index in 0..FRAMES {
        if index == FRAMES / 2 {
            control.set_bit_rate(settings.bitrate / 2)?;
            control.force_idr()?;
        }
        device.push(fake_frame(index, 1500));
        thread::sleep(FRAME_INTERVAL);
    }
    control.close();

    let metrics = source.metrics();
    info!(
        chunks = metrics.chunks_read,
        bytes = metrics.bytes_read,
        delivered = metrics.chunks_delivered,
        evicted = metrics.chunks_evicted,
        "Source metrics"
    );

    source.close()?;

    for handle in handles {
        match handle.join() {
            Ok((id, bytes, evicted)) => info!(track_id = %id, bytes, evicted, "Reader finished"),
            Err(_) => warn!("Reader thread panicked"),
        }
    }

    info!(
        key_frames = device.key_frame_requests(),
        starts = device.start_count(),
        stops = device.stop_count(),
        "Demo complete"
    );
    Ok(())
}
