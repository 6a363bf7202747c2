use std::any::Any;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

use crate::{BridgeError, ErrorCode, Result};

/// Error details allocated by the side that failed and owned by the side
/// that checks the status.
#[repr(C)]
pub struct ErrorPayload {
    code: i32,
    message: *mut c_char,
}

impl ErrorPayload {
    fn into_raw(code: ErrorCode, message: &str) -> *mut ErrorPayload {
        let message = CString::new(message.replace('\0', " "))
            .unwrap_or_default()
            .into_raw();
        Box::into_raw(Box::new(ErrorPayload {
            code: code.as_raw(),
            message,
        }))
    }

    /// Takes ownership of `payload` and frees it.
    ///
    /// # Safety
    /// `payload` must come from [`ErrorPayload::into_raw`] and must not be
    /// used afterwards.
    unsafe fn take(payload: *mut ErrorPayload) -> (ErrorCode, String) {
        let payload = Box::from_raw(payload);
        let message = if payload.message.is_null() {
            String::new()
        } else {
            CString::from_raw(payload.message)
                .to_string_lossy()
                .into_owned()
        };
        (ErrorCode::from_raw(payload.code), message)
    }
}

/// Outcome of a call across the native boundary.
///
/// A null payload means success. Any outputs of the call are only written
/// through its out-pointers when the status is ok.
#[repr(transparent)]
#[must_use = "every native status has to be checked"]
pub struct Status {
    payload: *mut ErrorPayload,
}

impl Status {
    pub const fn ok() -> Self {
        Self {
            payload: ptr::null_mut(),
        }
    }

    pub fn new(code: ErrorCode, message: impl AsRef<str>) -> Self {
        Self {
            payload: ErrorPayload::into_raw(code, message.as_ref()),
        }
    }

    pub fn from_error(err: &BridgeError) -> Self {
        Self::new(err.code(), err.message())
    }

    pub fn is_ok(&self) -> bool {
        self.payload.is_null()
    }

    /// Error category of a failed status, `None` on success.
    pub fn code(&self) -> Option<ErrorCode> {
        if self.payload.is_null() {
            None
        } else {
            // SAFETY: non-null payloads are always built by `into_raw`.
            Some(ErrorCode::from_raw(unsafe { (*self.payload).code }))
        }
    }

    pub fn into_result(mut self) -> Result<()> {
        let payload = std::mem::replace(&mut self.payload, ptr::null_mut());
        if payload.is_null() {
            return Ok(());
        }
        // SAFETY: the payload was detached above so it is freed only here.
        let (code, message) = unsafe { ErrorPayload::take(payload) };
        Err(BridgeError::NativeCall { code, message })
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::ok()
    }
}

impl std::fmt::Debug for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code() {
            None => f.write_str("Status(ok)"),
            Some(code) => write!(f, "Status({})", code),
        }
    }
}

impl Drop for Status {
    fn drop(&mut self) {
        if !self.payload.is_null() {
            // SAFETY: a status owns its payload until it is checked.
            let (code, message) = unsafe { ErrorPayload::take(self.payload) };
            log::warn!("status: dropped unchecked {} error: {}", code, message);
        }
    }
}

impl From<BridgeError> for Status {
    fn from(err: BridgeError) -> Self {
        Self::from_error(&err)
    }
}

/// Raise the failure carried by `status`, if any.
pub fn check(status: Status) -> Result<()> {
    status.into_result()
}

/// Like [`check`], handing back `out` only when the call succeeded.
pub fn check_and_return<T>(status: Status, out: T) -> Result<T> {
    status.into_result().map(|_| out)
}

/// Run `f` at an `extern "C"` boundary.
///
/// Errors become a failed status and panics are caught so that no unwind
/// crosses into foreign frames.
pub fn guard<F, E>(f: F) -> Status
where
    F: FnOnce() -> std::result::Result<(), E>,
    E: Into<Status>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Status::ok(),
        Ok(Err(err)) => err.into(),
        Err(panic) => Status::new(ErrorCode::Panic, panic_message(&*panic)),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_owned()
    }
}

/// Frees an error payload received from a failed call.
///
/// # Safety
/// `payload` must be null or a payload returned by a native call that has
/// not been freed yet.
#[no_mangle]
pub unsafe extern "C" fn bridge_status_free(payload: *mut ErrorPayload) {
    if !payload.is_null() {
        let _ = ErrorPayload::take(payload);
    }
}

/// # Safety
/// `payload` must be a live, non-null error payload.
#[no_mangle]
pub unsafe extern "C" fn bridge_error_code(payload: *const ErrorPayload) -> i32 {
    if payload.is_null() {
        return 0;
    }
    (*payload).code
}

/// Borrowed view of the message, valid until the payload is freed.
///
/// # Safety
/// `payload` must be a live, non-null error payload.
#[no_mangle]
pub unsafe extern "C" fn bridge_error_message(
    payload: *const ErrorPayload,
) -> *const c_char {
    if payload.is_null() || (*payload).message.is_null() {
        return ptr::null();
    }
    CStr::from_ptr((*payload).message).as_ptr()
}
