use std::fmt;
use std::str::Utf8Error;

use thiserror::Error;

mod status;

pub use status::{
    bridge_error_code, bridge_error_message, bridge_status_free, check,
    check_and_return, guard, ErrorPayload, Status,
};

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Error category carried across the native boundary.
///
/// `0` is reserved for success and is never stored in a payload.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unknown = 1,
    InvalidArgument = 2,
    Io = 3,
    Codec = 4,
    Callback = 5,
    Closed = 6,
    TypeMismatch = 7,
    Panic = 8,
}

impl ErrorCode {
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Unrecognised codes collapse to [`ErrorCode::Unknown`].
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            2 => Self::InvalidArgument,
            3 => Self::Io,
            4 => Self::Codec,
            5 => Self::Callback,
            6 => Self::Closed,
            7 => Self::TypeMismatch,
            8 => Self::Panic,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::InvalidArgument => "invalid argument",
            Self::Io => "io",
            Self::Codec => "codec",
            Self::Callback => "callback",
            Self::Closed => "closed",
            Self::TypeMismatch => "type mismatch",
            Self::Panic => "panic",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Native call failed ({code}): {message}")]
    NativeCall { code: ErrorCode, message: String },
    #[error("Callback failed: {0}")]
    Callback(String),
    #[error("Use after dispose: {0}")]
    UseAfterDispose(&'static str),
    #[error("Invalid argument: {0}")]
    Argument(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BridgeError {
    pub fn native(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::NativeCall {
            code,
            message: message.into(),
        }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    /// Category used when this error has to cross the native boundary.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NativeCall { code, .. } => *code,
            Self::Callback(_) => ErrorCode::Callback,
            Self::UseAfterDispose(_) => ErrorCode::Closed,
            Self::Argument(_) => ErrorCode::InvalidArgument,
            Self::Io(_) => ErrorCode::Io,
            Self::Other(_) => ErrorCode::Unknown,
        }
    }

    /// Message without the category prefix added by `Display`.
    pub fn message(&self) -> String {
        match self {
            Self::NativeCall { message, .. } => message.clone(),
            Self::Callback(message) | Self::Argument(message) => {
                message.clone()
            }
            Self::UseAfterDispose(label) => {
                format!("{} has already been disposed", label)
            }
            Self::Io(err) => err.to_string(),
            Self::Other(err) => err.to_string(),
        }
    }
}

impl From<Utf8Error> for BridgeError {
    fn from(e: Utf8Error) -> Self {
        Self::Argument(e.to_string())
    }
}

impl From<std::ffi::NulError> for BridgeError {
    fn from(e: std::ffi::NulError) -> Self {
        Self::Argument(e.to_string())
    }
}

/// Failure raised by a managed callback slot, as seen from native code.
///
/// Native code wraps this value into its own error type so the original
/// category survives the trip back to the top-level call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CallbackError {
    pub code: ErrorCode,
    pub message: String,
}

impl CallbackError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<CallbackError> for BridgeError {
    fn from(e: CallbackError) -> Self {
        Self::NativeCall {
            code: e.code,
            message: e.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorCode::Unknown)]
    #[case(ErrorCode::InvalidArgument)]
    #[case(ErrorCode::Io)]
    #[case(ErrorCode::Codec)]
    #[case(ErrorCode::Callback)]
    #[case(ErrorCode::Closed)]
    #[case(ErrorCode::TypeMismatch)]
    #[case(ErrorCode::Panic)]
    fn test_error_code_raw_value_is_stable(#[case] code: ErrorCode) {
        assert_ne!(code.as_raw(), 0);
        assert_eq!(ErrorCode::from_raw(code.as_raw()), code);
    }

    #[test]
    fn test_unrecognised_code_is_unknown() {
        assert_eq!(ErrorCode::from_raw(0), ErrorCode::Unknown);
        assert_eq!(ErrorCode::from_raw(-7), ErrorCode::Unknown);
        assert_eq!(ErrorCode::from_raw(4096), ErrorCode::Unknown);
    }

    #[test]
    fn test_error_codes_follow_variant() {
        let io = BridgeError::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        ));
        assert_eq!(io.code(), ErrorCode::Io);
        assert_eq!(
            BridgeError::UseAfterDispose("reader").code(),
            ErrorCode::Closed
        );
        assert_eq!(
            BridgeError::argument("null path").code(),
            ErrorCode::InvalidArgument
        );
        assert_eq!(
            BridgeError::native(ErrorCode::Codec, "bad footer").code(),
            ErrorCode::Codec
        );
    }

    #[test]
    fn test_callback_error_keeps_code() {
        let err: BridgeError =
            CallbackError::new(ErrorCode::Callback, "stream reset").into();
        match err {
            BridgeError::NativeCall { code, message } => {
                assert_eq!(code, ErrorCode::Callback);
                assert_eq!(message, "stream reset");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
