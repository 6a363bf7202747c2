//! C ABI over the columnar codec.
//!
//! Every export takes and returns plain pointers, reports its outcome as a
//! [`bridge_error::Status`] and writes outputs through out-pointers only on
//! success. Objects handed out here are owned by the caller and must be
//! released with the matching `*_free` function exactly once.
//!
//! Child objects (row groups, row-group writers) keep a raw pointer to the
//! parent that created them. The caller must keep the parent alive for as
//! long as a child is used.

mod batch;
mod error;
mod ffi;
mod input;
mod kind;
mod output;
mod reader;
mod writer;

pub use batch::*;
pub use error::CodecError;
pub use ffi::columnar_string_free;
pub use kind::ColumnKind;
pub use reader::*;
pub use writer::*;
