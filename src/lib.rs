//! Reading and writing columnar files through a native codec.
//!
//! The codec lives behind a C ABI (`native-codec`). This crate owns every
//! object the codec hands out through a [`NativeHandle`], turns each
//! returned status into a [`BridgeError`] and serves stream-backed files to
//! the codec through callback bindings with a read-ahead buffer in front.
//!
//! ```no_run
//! use columnar_bridge::*;
//!
//! # fn main() -> Result<()> {
//! let schema = Schema::new(vec![
//!     ColumnSpec::required("id", ValueKind::Int64),
//!     ColumnSpec::optional("name", ValueKind::Utf8),
//! ])?;
//! let writer = ParquetFileWriter::create(
//!     "people.parquet",
//!     &schema,
//!     &WriterProperties::default(),
//! )?;
//! let mut row_group = writer.append_row_group()?;
//! row_group.write_column(&ColumnValues::Int64(vec![Some(1), Some(2)]))?;
//! row_group.write_column(&ColumnValues::Utf8(vec![
//!     Some("ada".to_owned()),
//!     None,
//! ]))?;
//! row_group.close()?;
//! writer.close()?;
//!
//! let reader = ParquetFileReader::open("people.parquet")?;
//! let columns = reader.row_group(0)?.read_all()?;
//! assert_eq!(columns[0], ColumnValues::Int64(vec![Some(1), Some(2)]));
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "jni-bindings")]
pub mod jni;
mod properties;
mod reader;
mod schema;
mod values;
mod writer;

pub use bridge_error::{BridgeError, ErrorCode, Result};
pub use bridge_handle::{leaked_handle_count, NativeHandle};
pub use bridge_io::{
    BufferedSource, ClosedSourcePolicy, FileSource, MemorySource,
    OutputSink, RandomAccessSource, ReadStats, SeekableSource, SharedBuffer,
    WriteSink, DEFAULT_READ_AHEAD,
};

pub use properties::{Compression, ReaderProperties, WriterProperties};
pub use reader::{FileMetadata, ParquetFileReader, RowGroupReader};
pub use schema::{ColumnSpec, Schema, ValueKind};
pub use values::ColumnValues;
pub use writer::{ParquetFileWriter, RowGroupWriter};
