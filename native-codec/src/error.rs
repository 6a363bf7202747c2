use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use bridge_error::{BridgeError, CallbackError, ErrorCode, Status};
use parquet::errors::ParquetError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0} is closed")]
    Closed(&'static str),
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("{0}")]
    Callback(CallbackError),
}

impl CodecError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Parquet(_) | Self::Unsupported(_) => ErrorCode::Codec,
            Self::Io(_) => ErrorCode::Io,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Closed(_) => ErrorCode::Closed,
            Self::TypeMismatch(_) => ErrorCode::TypeMismatch,
            Self::Callback(err) => err.code,
        }
    }

    pub(crate) fn argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<BridgeError> for CodecError {
    fn from(err: BridgeError) -> Self {
        Self::Callback(CallbackError::new(err.code(), err.message()))
    }
}

impl From<CodecError> for Status {
    fn from(err: CodecError) -> Self {
        Status::new(err.code(), err.to_string())
    }
}

/// Remembers the most recent callback failure of one opened source or
/// sink.
///
/// The codec is free to turn an I/O error into a plain string on its way
/// up, so the original failure is kept here and takes precedence when the
/// top-level call reports its status.
#[derive(Debug, Clone, Default)]
pub(crate) struct FailureSlot(Arc<Mutex<Option<CallbackError>>>);

impl FailureSlot {
    pub(crate) fn record(&self, err: &BridgeError) -> CallbackError {
        let failure = CallbackError::new(err.code(), err.message());
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(failure.clone());
        failure
    }

    pub(crate) fn take(&self) -> Option<CallbackError> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub(crate) fn clear(&self) {
        let _ = self.take();
    }

    /// Prefer a recorded callback failure over the error it caused.
    pub(crate) fn attribute(&self, err: CodecError) -> CodecError {
        match self.take() {
            Some(failure) => CodecError::Callback(failure),
            None => err,
        }
    }
}

pub(crate) fn to_parquet(failure: CallbackError) -> ParquetError {
    ParquetError::External(Box::new(failure))
}

pub(crate) fn to_io(failure: CallbackError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, failure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_failure_wins() {
        let slot = FailureSlot::default();
        let err = CodecError::Parquet(ParquetError::General(
            "underlying Thrift error".to_owned(),
        ));
        slot.record(&BridgeError::native(ErrorCode::Callback, "socket closed"));

        let attributed = slot.attribute(err);
        assert_eq!(attributed.code(), ErrorCode::Callback);
        assert_eq!(attributed.to_string(), "socket closed");
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_without_failure_error_is_kept() {
        let slot = FailureSlot::default();
        let err = slot.attribute(CodecError::Closed("file reader"));
        assert_eq!(err.code(), ErrorCode::Closed);
    }
}
