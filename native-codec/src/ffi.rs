use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::error::CodecError;

pub(crate) unsafe fn arg<'a, T>(
    ptr: *const T,
    name: &str,
) -> Result<&'a T, CodecError> {
    ptr.as_ref()
        .ok_or_else(|| CodecError::argument(format!("{} is null", name)))
}

pub(crate) unsafe fn arg_mut<'a, T>(
    ptr: *mut T,
    name: &str,
) -> Result<&'a mut T, CodecError> {
    ptr.as_mut()
        .ok_or_else(|| CodecError::argument(format!("{} is null", name)))
}

pub(crate) unsafe fn c_str<'a>(
    ptr: *const c_char,
    name: &str,
) -> Result<&'a str, CodecError> {
    if ptr.is_null() {
        return Err(CodecError::argument(format!("{} is null", name)));
    }
    CStr::from_ptr(ptr).to_str().map_err(|e| {
        CodecError::argument(format!("{} is not valid UTF-8: {}", name, e))
    })
}

/// Borrow `len` elements starting at `ptr`. A null pointer is accepted
/// for an empty slice.
pub(crate) unsafe fn slice<'a, T>(
    ptr: *const T,
    len: usize,
    name: &str,
) -> Result<&'a [T], CodecError> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(CodecError::argument(format!("{} is null", name)));
    }
    Ok(std::slice::from_raw_parts(ptr, len))
}

pub(crate) fn into_c_string(value: &str) -> *mut c_char {
    CString::new(value.replace('\0', " "))
        .map(CString::into_raw)
        .unwrap_or(ptr::null_mut())
}

/// Frees a string returned by any `columnar_*` accessor.
///
/// # Safety
/// `value` must be null or a string produced by this library that has not
/// been freed yet.
#[no_mangle]
pub unsafe extern "C" fn columnar_string_free(value: *mut c_char) {
    if !value.is_null() {
        drop(CString::from_raw(value));
    }
}
