use std::io::{self, Read};

use bridge_io::InputSlotTable;
use bytes::Bytes;
use parquet::errors::{ParquetError, Result as ParquetResult};
use parquet::file::reader::{ChunkReader, Length};

use crate::error::{to_io, to_parquet, FailureSlot};

/// Codec input backed by the slots of a managed source.
pub(crate) struct CallbackSource {
    slots: InputSlotTable,
    len: u64,
    failure: FailureSlot,
}

// The slot table is only a set of function pointers plus the binding's
// context token; the binding serializes slot invocations itself.
unsafe impl Send for CallbackSource {}
unsafe impl Sync for CallbackSource {}

impl CallbackSource {
    /// # Safety
    /// The binding behind `slots` must outlive the returned source.
    pub(crate) unsafe fn open(
        slots: InputSlotTable,
        failure: FailureSlot,
    ) -> ParquetResult<Self> {
        let len = slots
            .invoke_length()
            .map_err(|e| to_parquet(failure.record(&e)))?;
        log::debug!("input: callback source of {} bytes", len);
        Ok(Self {
            slots,
            len,
            failure,
        })
    }
}

impl Length for CallbackSource {
    fn len(&self) -> u64 {
        self.len
    }
}

impl ChunkReader for CallbackSource {
    type T = CallbackRead;

    fn get_read(&self, start: u64) -> ParquetResult<CallbackRead> {
        Ok(CallbackRead {
            slots: self.slots,
            position: start,
            failure: self.failure.clone(),
        })
    }

    fn get_bytes(&self, start: u64, length: usize) -> ParquetResult<Bytes> {
        let mut buf = vec![0u8; length];
        let mut filled = 0;
        while filled < length {
            let read = unsafe {
                self.slots.invoke_read(start + filled as u64, &mut buf[filled..])
            }
            .map_err(|e| to_parquet(self.failure.record(&e)))?;
            if read == 0 {
                return Err(ParquetError::EOF(format!(
                    "expected {} bytes at offset {}, got {}",
                    length, start, filled
                )));
            }
            filled += read;
        }
        Ok(buf.into())
    }
}

/// Sequential reader over a [`CallbackSource`] starting at a fixed offset.
pub(crate) struct CallbackRead {
    slots: InputSlotTable,
    position: u64,
    failure: FailureSlot,
}

unsafe impl Send for CallbackRead {}

impl Read for CallbackRead {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = unsafe { self.slots.invoke_read(self.position, buf) }
            .map_err(|e| to_io(self.failure.record(&e)))?;
        self.position += read as u64;
        Ok(read)
    }
}
