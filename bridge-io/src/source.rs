use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use bridge_error::{BridgeError, Result};
use bytes::Bytes;

/// A data source that can serve positioned reads.
///
/// There is no cursor: every read names its own offset.
pub trait RandomAccessSource: Send {
    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returning fewer bytes than requested means the end of the data was
    /// reached at `offset + n`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Current size of the source in bytes.
    fn size(&mut self) -> Result<u64>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: RandomAccessSource + ?Sized> RandomAccessSource for Box<S> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        (**self).read_at(offset, buf)
    }

    fn size(&mut self) -> Result<u64> {
        (**self).size()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Immutable bytes held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl RandomAccessSource for MemorySource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let len = self.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let begin = offset as usize;
        let n = buf.len().min(self.data.len() - begin);
        buf[..n].copy_from_slice(&self.data[begin..begin + n]);
        Ok(n)
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}

/// Adapts anything readable and seekable, e.g. a file or a cursor.
///
/// Closing drops the inner reader; reads after that fail.
pub struct SeekableSource<R> {
    inner: Option<R>,
}

pub type FileSource = SeekableSource<File>;

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

impl<R: Read + Seek + Send> SeekableSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner: Some(inner) }
    }

    fn reader(&mut self) -> Result<&mut R> {
        self.inner
            .as_mut()
            .ok_or(BridgeError::UseAfterDispose("seekable source"))
    }
}

impl<R: Read + Seek + Send> RandomAccessSource for SeekableSource<R> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let reader = self.reader()?;
        reader.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.reader()?.seek(SeekFrom::End(0))?)
    }

    fn close(&mut self) -> Result<()> {
        self.inner = None;
        Ok(())
    }
}
