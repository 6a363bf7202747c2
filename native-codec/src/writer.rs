use std::fs::File;
use std::os::raw::c_char;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_error::{guard, Status};
use bridge_io::OutputSlotTable;
use parquet::basic::Compression;
use parquet::column::writer::ColumnWriter;
use parquet::data_type::ByteArray;
use parquet::file::properties::WriterProperties;
use parquet::file::writer::{SerializedColumnWriter, SerializedFileWriter};
use parquet::schema::parser::parse_message_type;
use parquet::schema::types::{SchemaDescriptor, Type as SchemaType};

use crate::batch::BatchValues;
use crate::error::{CodecError, FailureSlot};
use crate::ffi::{arg, arg_mut, c_str, slice};
use crate::kind::ColumnKind;
use crate::output::{CallbackWrite, NativeOutput};

pub const COMPRESSION_UNCOMPRESSED: i32 = 0;
pub const COMPRESSION_SNAPPY: i32 = 1;

/// Encoder settings. Zero sizes and a null `created_by` keep the codec
/// defaults; a null options pointer keeps all of them.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    pub compression: i32,
    pub dictionary_enabled: bool,
    pub data_page_size_limit: usize,
    /// Upper bound on the rows of a single row group.
    pub max_row_group_size: usize,
    pub created_by: *const c_char,
}

impl WriterOptions {
    unsafe fn properties(
        options: Option<&Self>,
    ) -> Result<WriterProperties, CodecError> {
        let mut builder = WriterProperties::builder();
        let options = match options {
            Some(options) => options,
            None => return Ok(builder.build()),
        };

        builder = builder
            .set_compression(match options.compression {
                COMPRESSION_UNCOMPRESSED => Compression::UNCOMPRESSED,
                COMPRESSION_SNAPPY => Compression::SNAPPY,
                other => {
                    return Err(CodecError::argument(format!(
                        "unknown compression {}",
                        other
                    )))
                }
            })
            .set_dictionary_enabled(options.dictionary_enabled);
        if options.data_page_size_limit > 0 {
            builder =
                builder.set_data_page_size_limit(options.data_page_size_limit);
        }
        if options.max_row_group_size > 0 {
            builder =
                builder.set_max_row_group_size(options.max_row_group_size);
        }
        if !options.created_by.is_null() {
            let created_by = c_str(options.created_by, "created_by")?;
            builder = builder.set_created_by(created_by.to_owned());
        }
        Ok(builder.build())
    }
}

#[derive(Debug, Clone)]
struct WriterColumn {
    name: String,
    kind: ColumnKind,
    nullable: bool,
}

fn parse_schema(
    message: &str,
) -> Result<(Arc<SchemaType>, Vec<WriterColumn>), CodecError> {
    let schema = parse_message_type(message)
        .map_err(|e| CodecError::argument(format!("schema: {}", e)))?;
    let schema = Arc::new(schema);
    let descr = SchemaDescriptor::new(Arc::clone(&schema));

    let columns = descr
        .columns()
        .iter()
        .map(|column| {
            if column.path().parts().len() > 1 {
                return Err(CodecError::Unsupported(format!(
                    "nested column {}",
                    column.path()
                )));
            }
            Ok(WriterColumn {
                name: column.name().to_owned(),
                kind: ColumnKind::of(column)?,
                nullable: column.max_def_level() > 0,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if columns.is_empty() {
        return Err(CodecError::argument("schema has no columns"));
    }
    Ok((schema, columns))
}

/// A file being encoded.
pub struct NativeFileWriter {
    writer: Option<SerializedFileWriter<NativeOutput>>,
    /// Slots of a managed sink whose close slot has not run yet.
    output: Option<OutputSlotTable>,
    columns: Vec<WriterColumn>,
    max_row_group_size: usize,
    /// Shared with the open row-group writer, which clears it when it is
    /// closed or freed.
    row_group_open: Arc<AtomicBool>,
    failure: FailureSlot,
    start: u64,
}

impl NativeFileWriter {
    fn writer(
        &mut self,
    ) -> Result<&mut SerializedFileWriter<NativeOutput>, CodecError> {
        self.writer.as_mut().ok_or(CodecError::Closed("file writer"))
    }

    fn write_row_group(
        &mut self,
        columns: Vec<PendingColumn>,
    ) -> Result<(), CodecError> {
        self.failure.clear();
        self.row_group_open.store(false, Ordering::Release);
        let result = self.encode_row_group(columns);
        result.map_err(|err| self.failure.attribute(err))
    }

    fn encode_row_group(
        &mut self,
        columns: Vec<PendingColumn>,
    ) -> Result<(), CodecError> {
        let mut row_group = self.writer()?.next_row_group()?;
        for pending in columns {
            let mut column = row_group.next_column()?.ok_or_else(|| {
                CodecError::argument("more columns than the schema declares")
            })?;
            pending.write_to(&mut column)?;
            column.close()?;
        }
        let metadata = row_group.close()?;
        log::debug!(
            "writer: row group of {} rows, {} bytes",
            metadata.num_rows(),
            metadata.total_byte_size()
        );
        Ok(())
    }

    fn close(&mut self) -> Result<(), CodecError> {
        self.failure.clear();
        let result = self.finish();
        result.map_err(|err| self.failure.attribute(err))
    }

    /// Write the footer, then release the managed sink exactly once.
    fn finish(&mut self) -> Result<(), CodecError> {
        if self.row_group_open.load(Ordering::Acquire) {
            return Err(CodecError::argument("a row group is still open"));
        }
        if let Some(writer) = self.writer.take() {
            let metadata = writer.close()?;
            log::debug!("writer: finished file of {} rows", metadata.num_rows);
        }
        if let Some(output) = self.output.take() {
            let end = unsafe { output.invoke_tell() };
            if let Ok(end) = end {
                log::debug!(
                    "writer: {} bytes written to callback sink",
                    end.saturating_sub(self.start)
                );
            }
            log::debug!("writer: closing callback sink");
            unsafe { output.invoke_close() }?;
        }
        Ok(())
    }
}

impl Drop for NativeFileWriter {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            log::warn!("writer: discarding unfinished file");
        }
        if let Some(output) = self.output.take() {
            if let Err(err) = unsafe { output.invoke_close() } {
                log::warn!("writer: close during free failed: {}", err);
            }
        }
    }
}

/// # Safety
/// `path` and `schema` must be NUL-terminated strings, `options` null or a
/// valid options struct.
#[no_mangle]
pub unsafe extern "C" fn columnar_writer_open_path(
    path: *const c_char,
    schema: *const c_char,
    options: *const WriterOptions,
    writer: *mut *mut NativeFileWriter,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let path = c_str(path, "path")?;
        let schema = c_str(schema, "schema")?;
        let out = arg_mut(writer, "writer")?;
        let options = options.as_ref();
        let (schema, columns) = parse_schema(schema)?;
        let properties = WriterOptions::properties(options)?;

        let file = File::create(path)?;
        let encoder = SerializedFileWriter::new(
            NativeOutput::File(file),
            schema,
            Arc::new(properties),
        )?;
        log::debug!("writer: created {}", path);
        *out = Box::into_raw(Box::new(NativeFileWriter {
            writer: Some(encoder),
            output: None,
            columns,
            max_row_group_size: options.map_or(0, |o| o.max_row_group_size),
            row_group_open: Arc::new(AtomicBool::new(false)),
            failure: FailureSlot::default(),
            start: 0,
        }));
        Ok(())
    })
}

/// Encode into the slots of a managed sink.
///
/// On success the writer takes over the close slot and invokes it once,
/// after the footer is written or when the writer is freed. On failure the
/// close slot is left to the caller.
///
/// # Safety
/// `slots` must point to a table whose binding outlives the writer.
#[no_mangle]
pub unsafe extern "C" fn columnar_writer_open_sink(
    slots: *const OutputSlotTable,
    schema: *const c_char,
    options: *const WriterOptions,
    writer: *mut *mut NativeFileWriter,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let slots = *arg(slots, "slots")?;
        let schema = c_str(schema, "schema")?;
        let out = arg_mut(writer, "writer")?;
        let options = options.as_ref();
        let (schema, columns) = parse_schema(schema)?;
        let properties = WriterOptions::properties(options)?;

        let failure = FailureSlot::default();
        let start = slots.invoke_tell()?;
        let sink = CallbackWrite::new(slots, failure.clone());
        let encoder = SerializedFileWriter::new(
            NativeOutput::Callback(sink),
            schema,
            Arc::new(properties),
        )
        .map_err(|err| failure.attribute(err.into()))?;
        *out = Box::into_raw(Box::new(NativeFileWriter {
            writer: Some(encoder),
            output: Some(slots),
            columns,
            max_row_group_size: options.map_or(0, |o| o.max_row_group_size),
            row_group_open: Arc::new(AtomicBool::new(false)),
            failure,
            start,
        }));
        Ok(())
    })
}

/// Start the next row group. Only one row group can be open at a time.
///
/// # Safety
/// `writer` must be a live writer returned by this library. The row-group
/// writer must be freed before the writer.
#[no_mangle]
pub unsafe extern "C" fn columnar_writer_append_row_group(
    writer: *mut NativeFileWriter,
    row_group: *mut *mut NativeRowGroupWriter,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let out = arg_mut(row_group, "row_group")?;
        let native = arg_mut(writer, "writer")?;
        native.writer()?;
        if native.row_group_open.swap(true, Ordering::AcqRel) {
            return Err(CodecError::argument("a row group is still open"));
        }
        *out = Box::into_raw(Box::new(NativeRowGroupWriter {
            writer,
            open: Arc::clone(&native.row_group_open),
            columns: Vec::new(),
            rows: 0,
            closed: false,
        }));
        Ok(())
    })
}

/// Write the footer and release the output.
///
/// # Safety
/// `writer` must be a live writer returned by this library.
#[no_mangle]
pub unsafe extern "C" fn columnar_writer_close(
    writer: *mut NativeFileWriter,
) -> Status {
    guard(|| -> Result<(), CodecError> { arg_mut(writer, "writer")?.close() })
}

/// # Safety
/// `writer` must be null or a writer returned by this library that has not
/// been freed yet.
#[no_mangle]
pub unsafe extern "C" fn columnar_writer_free(writer: *mut NativeFileWriter) {
    if !writer.is_null() {
        drop(Box::from_raw(writer));
    }
}

struct PendingColumn {
    values: BatchValues,
    def_levels: Option<Vec<i16>>,
}

impl PendingColumn {
    fn write_to(
        self,
        column: &mut SerializedColumnWriter<'_>,
    ) -> Result<(), CodecError> {
        let defs = self.def_levels.as_deref();
        match (self.values, column.untyped()) {
            (BatchValues::Boolean(v), ColumnWriter::BoolColumnWriter(w)) => {
                w.write_batch(&v, defs, None)?
            }
            (BatchValues::Int32(v), ColumnWriter::Int32ColumnWriter(w)) => {
                w.write_batch(&v, defs, None)?
            }
            (BatchValues::Int64(v), ColumnWriter::Int64ColumnWriter(w)) => {
                w.write_batch(&v, defs, None)?
            }
            (BatchValues::Float(v), ColumnWriter::FloatColumnWriter(w)) => {
                w.write_batch(&v, defs, None)?
            }
            (BatchValues::Double(v), ColumnWriter::DoubleColumnWriter(w)) => {
                w.write_batch(&v, defs, None)?
            }
            (BatchValues::Bytes(v), ColumnWriter::ByteArrayColumnWriter(w)) => {
                let v: Vec<ByteArray> = v.into_iter().map(ByteArray::from).collect();
                w.write_batch(&v, defs, None)?
            }
            _ => {
                return Err(CodecError::TypeMismatch(
                    "values do not match the physical column type".to_owned(),
                ))
            }
        };
        Ok(())
    }
}

/// Buffers the columns of one row group until it is closed.
pub struct NativeRowGroupWriter {
    writer: *mut NativeFileWriter,
    open: Arc<AtomicBool>,
    columns: Vec<PendingColumn>,
    rows: usize,
    closed: bool,
}

impl NativeRowGroupWriter {
    fn push(
        &mut self,
        accepted: &[ColumnKind],
        rows: usize,
        validity: Option<&[bool]>,
        values: BatchValues,
    ) -> Result<(), CodecError> {
        if self.closed {
            return Err(CodecError::Closed("row group writer"));
        }
        let parent = unsafe { &mut *self.writer };
        parent.writer()?;

        let index = self.columns.len();
        let column = parent.columns.get(index).ok_or_else(|| {
            CodecError::argument(format!(
                "all {} columns are already written",
                parent.columns.len()
            ))
        })?;
        if !accepted.contains(&column.kind) {
            return Err(CodecError::TypeMismatch(format!(
                "{} values for {} column {}",
                accepted[0], column.kind, column.name
            )));
        }
        if index > 0 && rows != self.rows {
            return Err(CodecError::argument(format!(
                "column {} has {} rows, expected {}",
                column.name, rows, self.rows
            )));
        }
        if let (ColumnKind::Utf8, BatchValues::Bytes(values)) =
            (column.kind, &values)
        {
            for value in values {
                std::str::from_utf8(value).map_err(|e| {
                    CodecError::argument(format!("{}: {}", column.name, e))
                })?;
            }
        }

        let def_levels = if column.nullable {
            Some(match validity {
                Some(validity) => {
                    validity.iter().map(|valid| *valid as i16).collect()
                }
                None => vec![1; rows],
            })
        } else {
            if validity.map_or(false, |v| v.contains(&false)) {
                return Err(CodecError::argument(format!(
                    "null value in required column {}",
                    column.name
                )));
            }
            None
        };

        self.rows = rows;
        self.columns.push(PendingColumn { values, def_levels });
        Ok(())
    }

    fn close(&mut self) -> Result<(), CodecError> {
        if self.closed {
            return Ok(());
        }
        let parent = unsafe { &mut *self.writer };
        if self.columns.len() != parent.columns.len() {
            return Err(CodecError::argument(format!(
                "{} of {} columns written",
                self.columns.len(),
                parent.columns.len()
            )));
        }
        if parent.max_row_group_size > 0 && self.rows > parent.max_row_group_size
        {
            return Err(CodecError::argument(format!(
                "row group of {} rows exceeds the limit of {}",
                self.rows, parent.max_row_group_size
            )));
        }
        self.closed = true;
        parent.write_row_group(std::mem::take(&mut self.columns))
    }
}

impl Drop for NativeRowGroupWriter {
    fn drop(&mut self) {
        if !self.closed {
            log::debug!(
                "writer: discarding row group with {} buffered columns",
                self.columns.len()
            );
            self.open.store(false, Ordering::Release);
        }
    }
}

fn select<T: Clone>(values: &[T], validity: Option<&[bool]>) -> Vec<T> {
    match validity {
        Some(validity) => values
            .iter()
            .zip(validity)
            .filter(|(_, valid)| **valid)
            .map(|(value, _)| value.clone())
            .collect(),
        None => values.to_vec(),
    }
}

unsafe fn optional_slice<'a>(ptr: *const bool, len: usize) -> Option<&'a [bool]> {
    if ptr.is_null() {
        None
    } else {
        Some(std::slice::from_raw_parts(ptr, len))
    }
}

macro_rules! write_values {
    ($name:ident, $ty:ty, $variant:ident, $kind:ident) => {
        /// Buffer the next column. `values` holds one entry per row; entries
        /// of null rows are ignored. A null `validity` means no nulls.
        ///
        /// # Safety
        /// `row_group` must be a live row-group writer whose file writer is
        /// still alive. `values` and a non-null `validity` must hold `len`
        /// elements.
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            row_group: *mut NativeRowGroupWriter,
            values: *const $ty,
            validity: *const bool,
            len: usize,
        ) -> Status {
            guard(|| -> Result<(), CodecError> {
                let row_group = arg_mut(row_group, "row_group")?;
                let values = slice(values, len, "values")?;
                let validity = optional_slice(validity, len);
                row_group.push(
                    &[ColumnKind::$kind],
                    len,
                    validity,
                    BatchValues::$variant(select(values, validity)),
                )
            })
        }
    };
}

write_values!(columnar_row_group_writer_write_bool, bool, Boolean, Boolean);
write_values!(columnar_row_group_writer_write_i32, i32, Int32, Int32);
write_values!(columnar_row_group_writer_write_i64, i64, Int64, Int64);
write_values!(columnar_row_group_writer_write_f32, f32, Float, Float);
write_values!(columnar_row_group_writer_write_f64, f64, Double, Double);

/// Buffer the next utf8 or binary column. `data[i]`/`lengths[i]` describe
/// row `i`; both are ignored for null rows.
///
/// # Safety
/// `row_group` must be a live row-group writer whose file writer is still
/// alive. `data`, `lengths` and a non-null `validity` must hold `len`
/// elements.
#[no_mangle]
pub unsafe extern "C" fn columnar_row_group_writer_write_bytes(
    row_group: *mut NativeRowGroupWriter,
    data: *const *const u8,
    lengths: *const usize,
    validity: *const bool,
    len: usize,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let row_group = arg_mut(row_group, "row_group")?;
        let data = slice(data, len, "data")?;
        let lengths = slice(lengths, len, "lengths")?;
        let validity = optional_slice(validity, len);

        let mut values = Vec::with_capacity(len);
        for row in 0..len {
            if validity.map_or(true, |v| v[row]) {
                values.push(slice(data[row], lengths[row], "value")?.to_vec());
            }
        }
        row_group.push(
            &[ColumnKind::Utf8, ColumnKind::Binary],
            len,
            validity,
            BatchValues::Bytes(values),
        )
    })
}

/// Encode the buffered columns. Every column of the schema must have been
/// written with the same number of rows.
///
/// # Safety
/// `row_group` must be a live row-group writer whose file writer is still
/// alive.
#[no_mangle]
pub unsafe extern "C" fn columnar_row_group_writer_close(
    row_group: *mut NativeRowGroupWriter,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        arg_mut(row_group, "row_group")?.close()
    })
}

/// # Safety
/// `row_group` must be null or a row-group writer returned by this library
/// that has not been freed yet, and its file writer must still be alive.
#[no_mangle]
pub unsafe extern "C" fn columnar_row_group_writer_free(
    row_group: *mut NativeRowGroupWriter,
) {
    if !row_group.is_null() {
        drop(Box::from_raw(row_group));
    }
}
