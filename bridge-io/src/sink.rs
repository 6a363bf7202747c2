use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bridge_error::{BridgeError, Result};

/// Destination for bytes pushed by native code.
pub trait OutputSink: Send {
    fn write(&mut self, data: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// Number of bytes written so far.
    fn position(&mut self) -> Result<u64>;

    fn close(&mut self) -> Result<()> {
        self.flush()
    }
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn position(&mut self) -> Result<u64> {
        (**self).position()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Adapts any [`Write`]. Closing flushes and drops the writer.
pub struct WriteSink<W> {
    inner: Option<W>,
    position: u64,
}

impl<W: Write + Send> WriteSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Some(inner),
            position: 0,
        }
    }

    fn writer(&mut self) -> Result<&mut W> {
        self.inner
            .as_mut()
            .ok_or(BridgeError::UseAfterDispose("write sink"))
    }
}

impl<W: Write + Send> OutputSink for WriteSink<W> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer()?.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.writer()?.flush()?)
    }

    fn position(&mut self) -> Result<u64> {
        Ok(self.position)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.inner.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// In-memory sink whose clones all see the same bytes.
///
/// Handy when the sink has to be moved into a binding but the output is
/// still needed afterwards.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    data: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl OutputSink for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(BridgeError::UseAfterDispose("shared buffer"));
        }
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn position(&mut self) -> Result<u64> {
        Ok(self.len() as u64)
    }

    fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
