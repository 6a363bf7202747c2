use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bridge_error::{BridgeError, Result};

use crate::source::RandomAccessSource;

/// Read-ahead used when the caller does not pick one.
pub const DEFAULT_READ_AHEAD: usize = 64 * 1024;

/// Counters describing how a [`BufferedSource`] served its requests.
#[derive(Debug, Default)]
pub struct ReadStats {
    underlying_reads: AtomicU64,
    bytes_fetched: AtomicU64,
    buffer_hits: AtomicU64,
}

impl ReadStats {
    /// Reads issued against the wrapped source.
    pub fn underlying_reads(&self) -> u64 {
        self.underlying_reads.load(Ordering::Relaxed)
    }

    /// Bytes returned by the wrapped source.
    pub fn bytes_fetched(&self) -> u64 {
        self.bytes_fetched.load(Ordering::Relaxed)
    }

    /// Requests answered from the buffer alone.
    pub fn buffer_hits(&self) -> u64 {
        self.buffer_hits.load(Ordering::Relaxed)
    }
}

/// Read-ahead buffer in front of a [`RandomAccessSource`].
///
/// Native readers issue many small reads clustered around the same
/// region (footer, page headers). A request that falls entirely inside the
/// buffered range is copied out without touching the wrapped source; any
/// other request replaces the buffer with a single read of
/// `max(request, read_ahead)` bytes starting at the requested offset.
pub struct BufferedSource<S> {
    inner: S,
    read_ahead: usize,
    buffer: Vec<u8>,
    /// Offset of `buffer[0]`, meaningless while `valid` is false.
    start: u64,
    valid: bool,
    stats: Arc<ReadStats>,
}

impl<S: RandomAccessSource> BufferedSource<S> {
    pub fn new(inner: S, read_ahead: usize) -> Result<Self> {
        if read_ahead == 0 {
            return Err(BridgeError::argument("read-ahead must be positive"));
        }
        Ok(Self {
            inner,
            read_ahead,
            buffer: Vec::new(),
            start: 0,
            valid: false,
            stats: Arc::new(ReadStats::default()),
        })
    }

    pub fn read_ahead(&self) -> usize {
        self.read_ahead
    }

    pub fn stats(&self) -> Arc<ReadStats> {
        Arc::clone(&self.stats)
    }

    /// Offset range currently buffered, if any.
    pub fn buffered_range(&self) -> Option<(u64, u64)> {
        self.valid
            .then(|| (self.start, self.start + self.buffer.len() as u64))
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn covers(&self, offset: u64, len: usize) -> bool {
        if !self.valid || offset < self.start {
            return false;
        }
        match offset.checked_add(len as u64) {
            Some(end) => end <= self.start + self.buffer.len() as u64,
            None => false,
        }
    }

    fn refill(&mut self, offset: u64, len: usize) -> Result<()> {
        let size = len.max(self.read_ahead);
        self.valid = false;
        self.buffer.resize(size, 0);

        let read = self.inner.read_at(offset, &mut self.buffer)?;
        self.buffer.truncate(read);
        self.start = offset;
        self.valid = true;

        self.stats.underlying_reads.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_fetched
            .fetch_add(read as u64, Ordering::Relaxed);
        log::trace!(
            "buffered: refilled {} of {} bytes at offset {}",
            read,
            size,
            offset
        );
        Ok(())
    }
}

impl<S: RandomAccessSource> RandomAccessSource for BufferedSource<S> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.covers(offset, buf.len()) {
            self.stats.buffer_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.refill(offset, buf.len())?;
        }

        let begin = (offset - self.start) as usize;
        let available = self.buffer.len().saturating_sub(begin);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&self.buffer[begin..begin + n]);
        Ok(n)
    }

    fn size(&mut self) -> Result<u64> {
        self.inner.size()
    }

    fn close(&mut self) -> Result<()> {
        self.valid = false;
        self.buffer = Vec::new();
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySource;
    use quickcheck_macros::quickcheck;
    use rstest::rstest;

    /// Records the length of every read that reaches the wrapped source.
    struct CountingSource {
        inner: MemorySource,
        reads: Vec<(u64, usize)>,
    }

    impl CountingSource {
        fn new(len: usize) -> Self {
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            Self {
                inner: MemorySource::new(data),
                reads: Vec::new(),
            }
        }
    }

    impl RandomAccessSource for CountingSource {
        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
            self.reads.push((offset, buf.len()));
            self.inner.read_at(offset, buf)
        }

        fn size(&mut self) -> Result<u64> {
            self.inner.size()
        }
    }

    fn expected(offset: u64, len: usize) -> Vec<u8> {
        (offset..offset + len as u64)
            .map(|i| (i % 251) as u8)
            .collect()
    }

    #[test]
    fn test_zero_read_ahead_rejected() {
        assert!(matches!(
            BufferedSource::new(CountingSource::new(1), 0),
            Err(BridgeError::Argument(_))
        ));
    }

    #[test]
    fn test_sequential_small_reads_amortised() {
        let mut source =
            BufferedSource::new(CountingSource::new(10 * 1024 * 1024), 64 * 1024)
                .unwrap();
        let stats = source.stats();

        let mut buf = vec![0u8; 1024];
        for i in 0..100u64 {
            let offset = i * 1024;
            assert_eq!(source.read_at(offset, &mut buf).unwrap(), 1024);
            assert_eq!(buf, expected(offset, 1024));
        }

        let underlying = source.into_inner().reads;
        // ceil(100 KiB / 64 KiB)
        assert_eq!(underlying.len(), 2);
        assert_eq!(underlying, vec![(0, 65536), (65536, 65536)]);
        assert_eq!(stats.underlying_reads(), 2);
        assert_eq!(stats.buffer_hits(), 98);
    }

    #[rstest]
    #[case(100, 16, 100)]
    #[case(100, 200, 200)]
    #[case(5, 8, 8)]
    fn test_refill_size_is_max_of_request_and_read_ahead(
        #[case] read_ahead: usize,
        #[case] request: usize,
        #[case] fetched: usize,
    ) {
        let mut source =
            BufferedSource::new(CountingSource::new(4096), read_ahead).unwrap();
        let mut buf = vec![0u8; request];
        source.read_at(10, &mut buf).unwrap();

        let reads = source.into_inner().reads;
        assert_eq!(reads, vec![(10, fetched)]);
    }

    #[test]
    fn test_short_read_at_end_of_data() {
        let mut source =
            BufferedSource::new(CountingSource::new(100), 32).unwrap();
        let mut buf = vec![0u8; 16];

        assert_eq!(source.read_at(90, &mut buf).unwrap(), 10);
        assert_eq!(&buf[..10], &expected(90, 10)[..]);
        assert_eq!(source.read_at(200, &mut buf).unwrap(), 0);
        assert_eq!(source.buffered_range(), Some((200, 200)));
    }

    #[test]
    fn test_backward_seek_refills() {
        let mut source =
            BufferedSource::new(CountingSource::new(1024), 64).unwrap();
        let mut buf = vec![0u8; 8];

        source.read_at(512, &mut buf).unwrap();
        source.read_at(520, &mut buf).unwrap();
        source.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, expected(0, 8));

        let reads = source.into_inner().reads;
        assert_eq!(reads, vec![(512, 64), (0, 64)]);
    }

    /// Replays a request sequence against a model of the buffer range and
    /// checks the adapter issues an underlying read exactly when the model
    /// says the request is not covered.
    #[quickcheck]
    fn prop_underlying_reads_only_when_uncovered(
        requests: Vec<(u16, u8)>,
        read_ahead: u8,
    ) -> bool {
        let total = 4096usize;
        let read_ahead = read_ahead as usize + 1;
        let mut source =
            BufferedSource::new(CountingSource::new(total), read_ahead).unwrap();
        let mut model: Option<(u64, u64)> = None;
        let mut expected_reads = Vec::new();

        for (offset, len) in requests {
            let offset = offset as u64 % (total as u64 + 64);
            let len = len as usize;
            let mut buf = vec![0u8; len];
            let got = source.read_at(offset, &mut buf).unwrap();

            if len > 0 {
                let covered = matches!(model, Some((start, end))
                    if offset >= start && offset + len as u64 <= end);
                if !covered {
                    let size = len.max(read_ahead);
                    expected_reads.push((offset, size));
                    let end = (offset + size as u64).min(total as u64).max(offset);
                    model = Some((offset, end));
                }
            }

            let available = (total as u64).saturating_sub(offset) as usize;
            if got != len.min(available) || buf[..got] != expected(offset, got)[..]
            {
                return false;
            }
        }

        source.into_inner().reads == expected_reads
    }
}
