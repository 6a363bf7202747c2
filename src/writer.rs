use std::ffi::CString;
use std::os::raw::c_char;
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use bridge_error::{check, BridgeError, Result, Status};
use bridge_handle::NativeHandle;
use bridge_io::{ManagedSinkBinding, OutputSink};
use native_codec::*;

use crate::properties::WriterProperties;
use crate::reader::{path_to_cstring, query_ptr};
use crate::schema::Schema;
use crate::values::ColumnValues;

struct WriterCore {
    handle: NativeHandle<NativeFileWriter>,
    schema: Schema,
}

impl Drop for WriterCore {
    fn drop(&mut self) {
        self.handle.dispose();
    }
}

/// Encodes a new columnar file one row group at a time.
///
/// Dropping a writer without [`ParquetFileWriter::close`] discards the
/// unfinished file.
pub struct ParquetFileWriter {
    core: Arc<WriterCore>,
}

impl ParquetFileWriter {
    pub fn create(
        path: impl AsRef<Path>,
        schema: &Schema,
        properties: &WriterProperties,
    ) -> Result<Self> {
        let path = path_to_cstring(path.as_ref())?;
        let handle =
            Self::open(schema, properties, |message, options, out| unsafe {
                columnar_writer_open_path(path.as_ptr(), message, options, out)
            })?;
        Ok(Self::wrap(handle, schema))
    }

    /// Encode into a managed sink. With `owns_sink` set the sink is closed
    /// after the footer is written; otherwise it is only flushed.
    pub fn to_sink<S: OutputSink + 'static>(
        sink: S,
        schema: &Schema,
        properties: &WriterProperties,
        owns_sink: bool,
    ) -> Result<Self> {
        let binding = ManagedSinkBinding::new("writer", sink, owns_sink);
        let slots = binding.slots();
        let handle =
            Self::open(schema, properties, |message, options, out| unsafe {
                columnar_writer_open_sink(&slots, message, options, out)
            })?;
        handle.add_keepalive(binding)?;
        Ok(Self::wrap(handle, schema))
    }

    fn open(
        schema: &Schema,
        properties: &WriterProperties,
        f: impl FnOnce(
            *const c_char,
            *const WriterOptions,
            *mut *mut NativeFileWriter,
        ) -> Status,
    ) -> Result<NativeHandle<NativeFileWriter>> {
        if schema.is_empty() {
            return Err(BridgeError::argument("schema has no columns"));
        }
        properties.validate()?;
        let message = CString::new(schema.to_message_type())?;
        let created_by =
            properties.created_by.as_deref().map(CString::new).transpose()?;
        let options = properties.to_native(created_by.as_deref());

        let mut raw = ptr::null_mut();
        check(f(message.as_ptr(), &options, &mut raw))?;
        log::debug!("writer: opened with {} columns", schema.len());
        Ok(unsafe {
            NativeHandle::acquire("file writer", raw, columnar_writer_free)
        })
    }

    fn wrap(handle: NativeHandle<NativeFileWriter>, schema: &Schema) -> Self {
        Self {
            core: Arc::new(WriterCore {
                handle,
                schema: schema.clone(),
            }),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.core.schema
    }

    /// Start the next row group. The previous one must be closed first.
    pub fn append_row_group(&self) -> Result<RowGroupWriter> {
        let raw = query_ptr(&self.core.handle, |raw, out| unsafe {
            columnar_writer_append_row_group(raw, out)
        })?;
        let handle = unsafe {
            NativeHandle::acquire(
                "row group writer",
                raw,
                columnar_row_group_writer_free,
            )
        };
        Ok(RowGroupWriter {
            parent: Arc::clone(&self.core),
            handle,
            written: 0,
            rows: None,
        })
    }

    /// Write the footer and release the output.
    pub fn close(&self) -> Result<()> {
        self.core
            .handle
            .with_raw(|raw| check(unsafe { columnar_writer_close(raw) }))?
    }

    pub fn dispose(&self) {
        self.core.handle.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.core.handle.is_disposed()
    }
}

/// Collects the columns of one row group, in schema order.
pub struct RowGroupWriter {
    parent: Arc<WriterCore>,
    handle: NativeHandle<NativeRowGroupWriter>,
    written: usize,
    rows: Option<usize>,
}

impl RowGroupWriter {
    fn call(
        &self,
        f: impl FnOnce(*mut NativeRowGroupWriter) -> Status,
    ) -> Result<()> {
        self.parent
            .handle
            .with_raw(|_| self.handle.with_raw(|raw| check(f(raw))))??
    }

    /// Index of the column the next [`Self::write_column`] fills.
    pub fn next_column(&self) -> usize {
        self.written
    }

    pub fn write_column(&mut self, values: &ColumnValues) -> Result<()> {
        let schema = &self.parent.schema;
        let column = schema.column(self.written).ok_or_else(|| {
            BridgeError::argument(format!(
                "all {} columns are already written",
                schema.len()
            ))
        })?;
        if values.kind() != column.kind {
            return Err(BridgeError::argument(format!(
                "{} values for {} column {}",
                values.kind(),
                column.kind,
                column.name
            )));
        }
        if !column.nullable && values.null_count() > 0 {
            return Err(BridgeError::argument(format!(
                "null value in required column {}",
                column.name
            )));
        }
        if let Some(rows) = self.rows {
            if values.len() != rows {
                return Err(BridgeError::argument(format!(
                    "column {} has {} rows, expected {}",
                    column.name,
                    values.len(),
                    rows
                )));
            }
        }

        let flags = values.validity();
        let validity = flags.as_ptr();
        let len = values.len();
        match values {
            ColumnValues::Boolean(v) => {
                let dense = dense(v);
                self.call(|raw| unsafe {
                    columnar_row_group_writer_write_bool(
                        raw,
                        dense.as_ptr(),
                        validity,
                        len,
                    )
                })?
            }
            ColumnValues::Int32(v) => {
                let dense = dense(v);
                self.call(|raw| unsafe {
                    columnar_row_group_writer_write_i32(
                        raw,
                        dense.as_ptr(),
                        validity,
                        len,
                    )
                })?
            }
            ColumnValues::Int64(v) => {
                let dense = dense(v);
                self.call(|raw| unsafe {
                    columnar_row_group_writer_write_i64(
                        raw,
                        dense.as_ptr(),
                        validity,
                        len,
                    )
                })?
            }
            ColumnValues::Float(v) => {
                let dense = dense(v);
                self.call(|raw| unsafe {
                    columnar_row_group_writer_write_f32(
                        raw,
                        dense.as_ptr(),
                        validity,
                        len,
                    )
                })?
            }
            ColumnValues::Double(v) => {
                let dense = dense(v);
                self.call(|raw| unsafe {
                    columnar_row_group_writer_write_f64(
                        raw,
                        dense.as_ptr(),
                        validity,
                        len,
                    )
                })?
            }
            ColumnValues::Utf8(v) => self.write_bytes(
                v.iter().map(|s| s.as_deref().map(str::as_bytes)),
                validity,
                len,
            )?,
            ColumnValues::Binary(v) => {
                self.write_bytes(v.iter().map(Option::as_deref), validity, len)?
            }
        }

        self.written += 1;
        self.rows = Some(len);
        Ok(())
    }

    fn write_bytes<'a>(
        &self,
        rows: impl Iterator<Item = Option<&'a [u8]>>,
        validity: *const bool,
        len: usize,
    ) -> Result<()> {
        let (data, lengths): (Vec<*const u8>, Vec<usize>) = rows
            .map(|row| match row {
                Some(bytes) => (bytes.as_ptr(), bytes.len()),
                None => (ptr::null(), 0),
            })
            .unzip();
        self.call(|raw| unsafe {
            columnar_row_group_writer_write_bytes(
                raw,
                data.as_ptr(),
                lengths.as_ptr(),
                validity,
                len,
            )
        })
    }

    /// Encode the buffered columns into the file.
    pub fn close(&mut self) -> Result<()> {
        let expected = self.parent.schema.len();
        if self.written != expected {
            return Err(BridgeError::argument(format!(
                "{} of {} columns written",
                self.written, expected
            )));
        }
        self.call(|raw| unsafe { columnar_row_group_writer_close(raw) })
    }

    pub fn dispose(&self) {
        self.handle.dispose();
    }
}

impl Drop for RowGroupWriter {
    fn drop(&mut self) {
        self.handle.dispose();
    }
}

fn dense<T: Copy + Default>(values: &[Option<T>]) -> Vec<T> {
    values.iter().map(|v| v.unwrap_or_default()).collect()
}
