//! Per-track broadcast buffer.
//!
//! Each track owns one buffer: the read loop is the only writer and the
//! track consumer the only reader. The queue is bounded in chunks; when it
//! is full the oldest queued chunk is evicted so the writer never blocks on
//! a stalled reader.

use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

/// Outcome of offering a chunk to a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The chunk was queued.
    Queued,

    /// The chunk was queued after evicting the oldest queued chunk.
    Evicted,

    /// The buffer is closed; the chunk was dropped.
    Dropped,
}

/// Create a connected writer/reader pair holding at most `capacity` chunks.
pub fn broadcast_buffer(capacity: usize) -> (BufferWriter, BufferReader) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let evicted = Arc::new(AtomicU64::new(0));

    let writer = BufferWriter {
        tx: Some(tx),
        evict_rx: rx.clone(),
        evicted: Arc::clone(&evicted),
    };
    let reader = BufferReader {
        rx,
        pending: Bytes::new(),
        evicted,
    };

    (writer, reader)
}

/// Write half, held by the media source.
pub struct BufferWriter {
    tx: Option<Sender<Bytes>>,
    evict_rx: Receiver<Bytes>,
    evicted: Arc<AtomicU64>,
}

impl BufferWriter {
    /// Queue a chunk without blocking.
    ///
    /// Writes after [`close`](Self::close) are dropped.
    pub fn write(&self, chunk: Bytes) -> Delivery {
        let Some(ref tx) = self.tx else {
            return Delivery::Dropped;
        };

        let mut chunk = chunk;
        let mut outcome = Delivery::Queued;
        let mut retried = false;
        loop {
            match tx.try_send(chunk) {
                Ok(()) => return outcome,
                Err(TrySendError::Full(rejected)) => {
                    chunk = rejected;
                    // The reader may have freed a slot since the first attempt.
                    if !retried {
                        retried = true;
                        continue;
                    }
                    if self.evict_rx.try_recv().is_ok() {
                        self.evicted.fetch_add(1, Ordering::Relaxed);
                        outcome = Delivery::Evicted;
                    }
                }
                Err(TrySendError::Disconnected(_)) => return Delivery::Dropped,
            }
        }
    }

    /// Close the buffer. The reader drains queued chunks, then sees end of stream.
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// Check if the buffer has been closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// Number of chunks waiting to be read.
    pub fn queued(&self) -> usize {
        self.evict_rx.len()
    }
}

/// Read half, held by the track.
pub struct BufferReader {
    rx: Receiver<Bytes>,
    pending: Bytes,
    evicted: Arc<AtomicU64>,
}

impl BufferReader {
    /// Block until the next chunk arrives. Returns `None` at end of stream.
    ///
    /// A chunk partially consumed through [`Read`] is returned first.
    pub fn next_chunk(&mut self) -> Option<Bytes> {
        if !self.pending.is_empty() {
            return Some(std::mem::take(&mut self.pending));
        }
        loop {
            match self.rx.recv() {
                Ok(chunk) if chunk.is_empty() => continue,
                Ok(chunk) => return Some(chunk),
                Err(_) => return None,
            }
        }
    }

    /// Like [`next_chunk`](Self::next_chunk) with a deadline.
    ///
    /// `RecvTimeoutError::Disconnected` signals end of stream.
    pub fn next_chunk_timeout(&mut self, timeout: Duration) -> Result<Bytes, RecvTimeoutError> {
        if !self.pending.is_empty() {
            return Ok(std::mem::take(&mut self.pending));
        }
        let deadline = Instant::now() + timeout;
        loop {
            match self.rx.recv_deadline(deadline) {
                Ok(chunk) if chunk.is_empty() => continue,
                Ok(chunk) => return Ok(chunk),
                Err(e) => return Err(e),
            }
        }
    }

    /// Number of chunks waiting to be read.
    pub fn queued(&self) -> usize {
        self.rx.len() + usize::from(!self.pending.is_empty())
    }

    /// Number of chunks evicted because this reader fell behind.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Read for BufferReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending.is_empty() {
            match self.next_chunk() {
                Some(chunk) => self.pending = chunk,
                None => return Ok(0),
            }
        }

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_write_then_read_chunks() {
        let (writer, mut reader) = broadcast_buffer(4);
        assert_eq!(writer.write(Bytes::from_static(b"one")), Delivery::Queued);
        assert_eq!(writer.write(Bytes::from_static(b"two")), Delivery::Queued);

        assert_eq!(reader.next_chunk().unwrap(), Bytes::from_static(b"one"));
        assert_eq!(reader.next_chunk().unwrap(), Bytes::from_static(b"two"));
    }

    #[test]
    fn test_full_buffer_evicts_oldest() {
        let (mut writer, mut reader) = broadcast_buffer(2);
        writer.write(Bytes::from_static(b"a"));
        writer.write(Bytes::from_static(b"b"));
        assert_eq!(writer.write(Bytes::from_static(b"c")), Delivery::Evicted);
        writer.close();

        assert_eq!(reader.evicted(), 1);
        assert_eq!(reader.next_chunk().unwrap(), Bytes::from_static(b"b"));
        assert_eq!(reader.next_chunk().unwrap(), Bytes::from_static(b"c"));
        assert!(reader.next_chunk().is_none());
    }

    #[test]
    fn test_write_after_reader_frees_slot_does_not_evict() {
        let (writer, mut reader) = broadcast_buffer(2);
        writer.write(Bytes::from_static(b"a"));
        writer.write(Bytes::from_static(b"b"));
        assert_eq!(reader.next_chunk().unwrap(), Bytes::from_static(b"a"));

        assert_eq!(writer.write(Bytes::from_static(b"c")), Delivery::Queued);
        assert_eq!(reader.evicted(), 0);
        assert_eq!(reader.next_chunk().unwrap(), Bytes::from_static(b"b"));
        assert_eq!(reader.next_chunk().unwrap(), Bytes::from_static(b"c"));
    }

    #[test]
    fn test_empty_chunks_are_skipped() {
        let (writer, mut reader) = broadcast_buffer(4);
        writer.write(Bytes::new());
        writer.write(Bytes::from_static(b"data"));
        writer.write(Bytes::new());
        writer.write(Bytes::from_static(b"more"));

        assert_eq!(
            reader.next_chunk_timeout(Duration::from_secs(5)).unwrap(),
            Bytes::from_static(b"data")
        );
        assert_eq!(reader.next_chunk().unwrap(), Bytes::from_static(b"more"));
    }

    #[test]
    fn test_close_drains_then_ends() {
        let (mut writer, mut reader) = broadcast_buffer(4);
        writer.write(Bytes::from_static(b"tail"));
        writer.close();
        writer.close();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"tail");
    }

    #[test]
    fn test_write_after_close_is_dropped() {
        let (mut writer, mut reader) = broadcast_buffer(4);
        writer.close();
        assert!(writer.is_closed());
        assert_eq!(writer.write(Bytes::from_static(b"late")), Delivery::Dropped);
        assert!(reader.next_chunk().is_none());
    }

    #[test]
    fn test_partial_reads_keep_order() {
        let (writer, mut reader) = broadcast_buffer(4);
        writer.write(Bytes::from_static(b"abcdef"));
        writer.write(Bytes::from_static(b"gh"));

        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(reader.queued(), 2);
        assert_eq!(reader.next_chunk().unwrap(), Bytes::from_static(b"ef"));
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"gh");
    }

    #[test]
    fn test_close_wakes_blocked_reader() {
        let (mut writer, mut reader) = broadcast_buffer(4);
        let handle = thread::spawn(move || reader.next_chunk());

        thread::sleep(Duration::from_millis(20));
        writer.close();
        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn test_timeout_without_data() {
        let (_writer, mut reader) = broadcast_buffer(1);
        assert_eq!(
            reader.next_chunk_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Timeout)
        );
    }
}
