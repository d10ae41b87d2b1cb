//! Track handles handed to consumers.

use std::fmt;
use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::RecvTimeoutError;

use crate::buffer::BufferReader;

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique track identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(u64);

impl TrackId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track-{}", self.0)
    }
}

/// Removal path back into the source that issued a track.
pub(crate) trait TrackOwner: Send + Sync {
    fn close_track(&self, id: TrackId);
}

/// A readable, closable view of one media stream.
///
/// Bytes arrive in device order starting from the chunk after the track was
/// created. Closing or dropping the track asks the owning source to remove
/// it; the source stops the device when the last track goes away.
pub struct Track {
    id: TrackId,
    codec: &'static str,
    reader: BufferReader,
    owner: Arc<dyn TrackOwner>,
    closed: bool,
}

impl Track {
    pub(crate) fn new(
        id: TrackId,
        codec: &'static str,
        reader: BufferReader,
        owner: Arc<dyn TrackOwner>,
    ) -> Self {
        Self {
            id,
            codec,
            reader,
            owner,
            closed: false,
        }
    }

    /// Identity of this track within its source.
    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Codec carried by this track.
    pub fn codec(&self) -> &'static str {
        self.codec
    }

    /// Block until the next chunk arrives. Returns `None` at end of stream.
    pub fn next_chunk(&mut self) -> Option<Bytes> {
        self.reader.next_chunk()
    }

    /// Like [`next_chunk`](Self::next_chunk) with a deadline.
    ///
    /// `RecvTimeoutError::Disconnected` signals end of stream.
    pub fn next_chunk_timeout(&mut self, timeout: Duration) -> Result<Bytes, RecvTimeoutError> {
        self.reader.next_chunk_timeout(timeout)
    }

    /// Number of chunks waiting to be read.
    pub fn queued(&self) -> usize {
        self.reader.queued()
    }

    /// Number of chunks lost because this track fell behind.
    pub fn evicted(&self) -> u64 {
        self.reader.evicted()
    }

    /// Tell the source no more reads will occur. Idempotent.
    ///
    /// Chunks already queued stay readable until end of stream.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.owner.close_track(self.id);
        }
    }

    /// Check if [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Read for Track {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("codec", &self.codec)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Drop for Track {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::buffer::broadcast_buffer;

    #[derive(Default)]
    struct RecordingOwner {
        closed: Mutex<Vec<TrackId>>,
    }

    impl TrackOwner for RecordingOwner {
        fn close_track(&self, id: TrackId) {
            self.closed.lock().push(id);
        }
    }

    #[test]
    fn test_track_ids_are_unique() {
        let a = TrackId::next();
        let b = TrackId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_close_notifies_owner_once() {
        let owner = Arc::new(RecordingOwner::default());
        let (_writer, reader) = broadcast_buffer(1);
        let id = TrackId::next();

        let mut track = Track::new(id, "H264", reader, owner.clone());
        track.close();
        track.close();
        drop(track);

        assert_eq!(*owner.closed.lock(), vec![id]);
    }

    #[test]
    fn test_drop_notifies_owner() {
        let owner = Arc::new(RecordingOwner::default());
        let (_writer, reader) = broadcast_buffer(1);
        let id = TrackId::next();

        drop(Track::new(id, "PCM", reader, owner.clone()));
        assert_eq!(*owner.closed.lock(), vec![id]);
    }
}
