use std::os::raw::c_void;

use bridge_error::{check, check_and_return, BridgeError, ErrorCode, Result, Status};

pub type ReadAtFn = unsafe extern "C" fn(
    context: *mut c_void,
    offset: u64,
    buffer: *mut u8,
    length: usize,
    bytes_read: *mut usize,
) -> Status;

pub type GetLengthFn =
    unsafe extern "C" fn(context: *mut c_void, length: *mut u64) -> Status;

pub type CloseFn = unsafe extern "C" fn(context: *mut c_void) -> Status;

pub type WriteFn = unsafe extern "C" fn(
    context: *mut c_void,
    data: *const u8,
    length: usize,
) -> Status;

pub type FlushFn = unsafe extern "C" fn(context: *mut c_void) -> Status;

pub type TellFn =
    unsafe extern "C" fn(context: *mut c_void, position: *mut u64) -> Status;

/// Entry points native code uses to pull bytes from a managed source.
///
/// `context` is an opaque token owned by the managed binding. The slots
/// are never invoked concurrently for the same context.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InputSlotTable {
    pub context: *mut c_void,
    pub read_at: ReadAtFn,
    pub get_length: GetLengthFn,
    pub close: CloseFn,
}

/// Entry points native code uses to push bytes into a managed sink.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct OutputSlotTable {
    pub context: *mut c_void,
    pub write: WriteFn,
    pub flush: FlushFn,
    pub tell: TellFn,
    pub close: CloseFn,
}

impl InputSlotTable {
    /// # Safety
    /// The binding that produced this table must still be alive.
    pub unsafe fn invoke_read(
        &self,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        let mut read = 0usize;
        let status = (self.read_at)(
            self.context,
            offset,
            buf.as_mut_ptr(),
            buf.len(),
            &mut read,
        );
        let read = check_and_return(status, read)?;
        if read > buf.len() {
            return Err(BridgeError::native(
                ErrorCode::Callback,
                format!(
                    "read_at returned {} bytes for a {} byte request",
                    read,
                    buf.len()
                ),
            ));
        }
        Ok(read)
    }

    /// # Safety
    /// The binding that produced this table must still be alive.
    pub unsafe fn invoke_length(&self) -> Result<u64> {
        let mut length = 0u64;
        let status = (self.get_length)(self.context, &mut length);
        check_and_return(status, length)
    }

    /// # Safety
    /// The binding that produced this table must still be alive.
    pub unsafe fn invoke_close(&self) -> Result<()> {
        check((self.close)(self.context))
    }
}

impl OutputSlotTable {
    /// # Safety
    /// The binding that produced this table must still be alive.
    pub unsafe fn invoke_write(&self, data: &[u8]) -> Result<()> {
        check((self.write)(self.context, data.as_ptr(), data.len()))
    }

    /// # Safety
    /// The binding that produced this table must still be alive.
    pub unsafe fn invoke_flush(&self) -> Result<()> {
        check((self.flush)(self.context))
    }

    /// # Safety
    /// The binding that produced this table must still be alive.
    pub unsafe fn invoke_tell(&self) -> Result<u64> {
        let mut position = 0u64;
        let status = (self.tell)(self.context, &mut position);
        check_and_return(status, position)
    }

    /// # Safety
    /// The binding that produced this table must still be alive.
    pub unsafe fn invoke_close(&self) -> Result<()> {
        check((self.close)(self.context))
    }
}
