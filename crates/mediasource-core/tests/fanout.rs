//! Multi-track lifecycle scenarios against the virtual device.

use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::RecvTimeoutError;

use mediasource_config::{AudioSettings, SourceSettings};
use mediasource_core::{
    AudioCaptureSource, AudioSourcer, MediaError, MediaSource, MediaSourcer,
    RtspAudioVideoSource, SampleFormat, Track, VideoCaptureSource, VideoSourcer,
};
use mediasource_device::{DeviceControls, VirtualDevice, VirtualDriver};

const WAIT: Duration = Duration::from_secs(5);

fn open(capacity: usize) -> (VideoCaptureSource, Arc<VirtualDevice>) {
    let settings = SourceSettings {
        track_capacity: capacity,
        ..SourceSettings::for_device("/dev/video0")
    };
    let device = VirtualDevice::with_controls(DeviceControls::h264_camera());
    let driver = VirtualDriver::new().with_device("/dev/video0", device.clone());
    let source = VideoCaptureSource::open(&driver, &settings).unwrap();
    (source, device)
}

fn expect_chunk(track: &mut Track, expected: &'static [u8]) {
    assert_eq!(track.next_chunk_timeout(WAIT).unwrap(), Bytes::from_static(expected));
}

fn expect_end(track: &mut Track) {
    assert_eq!(
        track.next_chunk_timeout(WAIT),
        Err(RecvTimeoutError::Disconnected)
    );
}

#[test]
fn late_subscriber_starts_at_next_chunk() {
    let (source, device) = open(16);

    let mut t1 = source.get_track().unwrap();
    device.push(&b"A"[..]);
    expect_chunk(&mut t1, b"A");

    let mut t2 = source.get_track().unwrap();
    device.push(&b"B"[..]);
    device.push(&b"C"[..]);
    device.fail("sensor unplugged");

    expect_chunk(&mut t1, b"B");
    expect_chunk(&mut t1, b"C");
    expect_end(&mut t1);

    expect_chunk(&mut t2, b"B");
    expect_chunk(&mut t2, b"C");
    expect_end(&mut t2);
}

#[test]
fn every_track_sees_identical_bytes() {
    let (source, device) = open(64);

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let mut track = source.get_track().unwrap();
            thread::spawn(move || {
                let mut out = Vec::new();
                track.read_to_end(&mut out).unwrap();
                out
            })
        })
        .collect();

    let mut expected = Vec::new();
    for i in 0..32u8 {
        let chunk = vec![i; 100];
        expected.extend_from_slice(&chunk);
        device.push(chunk);
    }
    // Wait for every copy to be queued before closing.
    while source.metrics().chunks_delivered < 32 * 4 {
        thread::sleep(Duration::from_millis(1));
    }
    source.close().unwrap();

    for reader in readers {
        assert_eq!(reader.join().unwrap(), expected);
    }
}

#[test]
fn device_starts_and_stops_once_per_session() {
    let (source, device) = open(8);

    let t1 = source.get_track().unwrap();
    let t2 = source.get_track().unwrap();
    let t3 = source.get_track().unwrap();
    drop(t2);
    let t4 = source.get_track().unwrap();
    drop(t1);
    drop(t3);

    assert_eq!(device.start_count(), 1);
    assert_eq!(device.stop_count(), 0);
    assert!(device.is_running());

    drop(t4);
    assert_eq!(device.start_count(), 1);
    assert_eq!(device.stop_count(), 1);
    assert!(!device.is_running());
}

#[test]
fn close_track_on_closed_track_is_noop() {
    let (source, device) = open(8);
    let mut track = source.get_track().unwrap();
    let _other = source.get_track().unwrap();

    track.close();
    source.close_track(&track);
    track.close();

    assert_eq!(source.track_count(), 1);
    assert_eq!(device.stop_count(), 0);
}

#[test]
fn close_source_ends_tracks_and_rejects_new_ones() {
    let (source, device) = open(8);
    let mut t1 = source.get_track().unwrap();
    let mut t2 = source.get_track().unwrap();

    source.close().unwrap();

    expect_end(&mut t1);
    expect_end(&mut t2);
    assert!(matches!(source.get_track(), Err(MediaError::SourceClosed)));
    assert!(device.is_closed());
    assert_eq!(device.stop_count(), 1);
}

#[test]
fn read_failure_disables_source() {
    let (source, device) = open(8);
    let mut track = source.get_track().unwrap();

    device.fail("bus reset");
    expect_end(&mut track);

    assert!(matches!(source.get_track(), Err(MediaError::DeviceFailed)));
    assert_eq!(source.metrics().read_failures, 1);
    assert_eq!(device.stop_count(), 1);

    source.close().unwrap();
    assert!(device.is_closed());
}

#[test]
fn stalled_track_does_not_starve_others() {
    let (source, device) = open(2);
    let stalled = source.get_track().unwrap();
    let mut active = source.get_track().unwrap();

    for i in 0..10u8 {
        device.push(vec![i]);
        assert_eq!(active.next_chunk_timeout(WAIT).unwrap(), Bytes::from(vec![i]));
    }
    // Takes the source lock, so the last fan-out pass has finished.
    assert_eq!(source.track_count(), 2);

    assert_eq!(stalled.queued(), 2);
    assert_eq!(stalled.evicted(), 8);
    assert_eq!(active.evicted(), 0);
    assert_eq!(source.metrics().chunks_evicted, 8);
}

#[test]
fn unsupported_control_keeps_streaming() {
    let (source, device) = open(8);
    let mut track = source.video().unwrap();

    device.push(&b"before"[..]);
    assert!(track.force_idr().unwrap_err().is_not_supported());
    assert!(track.set_frame_rate(60).unwrap_err().is_not_supported());
    track.set_bit_rate(1_000_000).unwrap();
    device.push(&b"after"[..]);

    assert_eq!(track.next_chunk_timeout(WAIT).unwrap(), Bytes::from_static(b"before"));
    assert_eq!(track.next_chunk_timeout(WAIT).unwrap(), Bytes::from_static(b"after"));
    assert_eq!(device.bitrate(), Some(1_000_000));
}

#[test]
fn concurrent_subscribe_and_close() {
    let (source, device) = open(4);
    let source = Arc::new(source);

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let source = Arc::clone(&source);
            thread::spawn(move || {
                for _ in 0..50 {
                    let track = source.get_track().unwrap();
                    source.close_track(&track);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(source.track_count(), 0);
    assert!(!device.is_running());
    assert_eq!(device.start_count(), device.stop_count());
}

#[test]
fn audio_parameters_locked_while_any_track_streams() {
    let settings = AudioSettings::default();
    let device = VirtualDevice::with_controls(DeviceControls::all());
    let driver = VirtualDriver::new().with_device(settings.device.clone(), device.clone());
    let source = AudioCaptureSource::open(&driver, &settings).unwrap();

    let mut first = source.audio().unwrap();
    let mut second = source.audio().unwrap();
    device.push(&b"pcm1"[..]);
    assert_eq!(first.next_chunk_timeout(WAIT).unwrap(), Bytes::from_static(b"pcm1"));

    let rejected = |result: Result<(), MediaError>| {
        matches!(result, Err(MediaError::StreamingStarted(_)))
    };
    assert!(rejected(second.set_sample_rate(8000)));
    assert!(rejected(second.set_num_channels(1)));
    assert!(rejected(second.set_sample_format(SampleFormat::U8)));
    assert!(rejected(first.set_sample_rate(44100)));
    assert!(rejected(source.configure(8000, 1, SampleFormat::U8)));

    assert_eq!(device.audio_config(), Some((48000, 2, SampleFormat::S16LE)));
    assert_eq!(first.params(), source.params());
    assert_eq!(source.params().sample_rate, 48000);

    // The unread track still receives the stream untouched.
    assert_eq!(second.next_chunk_timeout(WAIT).unwrap(), Bytes::from_static(b"pcm1"));

    first.close();
    second.close();
    source.configure(16000, 1, SampleFormat::S8).unwrap();
    assert_eq!(device.audio_config(), Some((16000, 1, SampleFormat::S8)));
}

#[test]
fn rtsp_source_is_not_implemented() {
    let result = RtspAudioVideoSource::new("rtsp://10.0.0.2:554/live");
    assert!(matches!(result, Err(MediaError::NotImplemented(_))));
}
