use std::fs::File;
use std::io::{self, Write};

use bridge_io::OutputSlotTable;

use crate::error::{to_io, FailureSlot};

/// Destination of an encoded file.
pub(crate) enum NativeOutput {
    File(File),
    Callback(CallbackWrite),
}

impl Write for NativeOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::File(file) => file.write(buf),
            Self::Callback(sink) => sink.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::File(file) => file.flush(),
            Self::Callback(sink) => sink.flush(),
        }
    }
}

pub(crate) struct CallbackWrite {
    slots: OutputSlotTable,
    failure: FailureSlot,
}

unsafe impl Send for CallbackWrite {}

impl CallbackWrite {
    /// # Safety
    /// The binding behind `slots` must outlive the returned sink.
    pub(crate) unsafe fn new(slots: OutputSlotTable, failure: FailureSlot) -> Self {
        Self { slots, failure }
    }
}

impl Write for CallbackWrite {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        unsafe { self.slots.invoke_write(buf) }
            .map_err(|e| to_io(self.failure.record(&e)))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        unsafe { self.slots.invoke_flush() }
            .map_err(|e| to_io(self.failure.record(&e)))
    }
}
