//! Managed side of the callback I/O bridge.
//!
//! Native code cannot call a Rust trait object, so every data source or
//! sink handed to it is wrapped in a binding that exposes a fixed
//! `#[repr(C)]` table of `extern "C"` slots plus an opaque context
//! pointer. Native code invokes those slots synchronously, on the thread
//! that made the original call, and receives a [`bridge_error::Status`]
//! back from each of them.

mod binding;
mod buffered;
mod sink;
mod slots;
mod source;

pub use binding::{ClosedSourcePolicy, ManagedSinkBinding, ManagedSourceBinding};
pub use buffered::{BufferedSource, ReadStats, DEFAULT_READ_AHEAD};
pub use sink::{OutputSink, SharedBuffer, WriteSink};
pub use slots::{
    CloseFn, FlushFn, GetLengthFn, InputSlotTable, OutputSlotTable, ReadAtFn,
    TellFn, WriteFn,
};
pub use source::{FileSource, MemorySource, RandomAccessSource, SeekableSource};
