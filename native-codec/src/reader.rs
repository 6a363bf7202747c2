use std::fs::File;
use std::os::raw::c_char;
use std::ptr;

use bridge_error::{guard, Status};
use bridge_io::InputSlotTable;
use parquet::file::metadata::ParquetMetaData;
use parquet::file::reader::{FileReader, RowGroupReader};
use parquet::file::serialized_reader::SerializedFileReader;
use parquet::schema::types::ColumnDescPtr;

use crate::batch::NativeColumnBatch;
use crate::error::{CodecError, FailureSlot};
use crate::ffi::{arg, arg_mut, c_str, into_c_string};
use crate::input::CallbackSource;
use crate::kind::ColumnKind;

/// An opened columnar file.
pub struct NativeFileReader {
    file: Option<Box<dyn FileReader>>,
    /// Slots of a managed source whose close slot has not run yet.
    input: Option<InputSlotTable>,
    failure: FailureSlot,
}

impl NativeFileReader {
    fn file(&self) -> Result<&dyn FileReader, CodecError> {
        self.file.as_deref().ok_or(CodecError::Closed("file reader"))
    }

    /// Drop the decoder, then release the managed source exactly once.
    fn close(&mut self) -> Result<(), CodecError> {
        self.file = None;
        if let Some(input) = self.input.take() {
            log::debug!("reader: closing callback source");
            unsafe { input.invoke_close() }?;
        }
        Ok(())
    }

    fn run<T>(
        &self,
        f: impl FnOnce(&dyn FileReader) -> Result<T, CodecError>,
    ) -> Result<T, CodecError> {
        self.failure.clear();
        let result = self.file().and_then(f);
        result.map_err(|err| self.failure.attribute(err))
    }
}

impl Drop for NativeFileReader {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("reader: close during free failed: {}", err);
        }
    }
}

/// # Safety
/// `path` must be a NUL-terminated string and `reader` a valid out-pointer.
#[no_mangle]
pub unsafe extern "C" fn columnar_reader_open_path(
    path: *const c_char,
    reader: *mut *mut NativeFileReader,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let path = c_str(path, "path")?;
        let out = arg_mut(reader, "reader")?;
        let file = SerializedFileReader::new(File::open(path)?)?;
        log::debug!(
            "reader: opened {} with {} row groups",
            path,
            file.num_row_groups()
        );
        *out = Box::into_raw(Box::new(NativeFileReader {
            file: Some(Box::new(file)),
            input: None,
            failure: FailureSlot::default(),
        }));
        Ok(())
    })
}

/// Open a file served by the slots of a managed source.
///
/// On success the reader takes over the close slot and invokes it once,
/// when the reader is closed or freed. On failure the close slot is left
/// to the caller.
///
/// # Safety
/// `slots` must point to a table whose binding outlives the reader.
#[no_mangle]
pub unsafe extern "C" fn columnar_reader_open_source(
    slots: *const InputSlotTable,
    reader: *mut *mut NativeFileReader,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let slots = *arg(slots, "slots")?;
        let out = arg_mut(reader, "reader")?;
        let failure = FailureSlot::default();
        let file = CallbackSource::open(slots, failure.clone())
            .and_then(SerializedFileReader::new)
            .map_err(|err| failure.attribute(err.into()))?;
        *out = Box::into_raw(Box::new(NativeFileReader {
            file: Some(Box::new(file)),
            input: Some(slots),
            failure,
        }));
        Ok(())
    })
}

/// Release the decoder and the underlying input. Further calls on the
/// reader or its children fail with a closed status.
///
/// # Safety
/// `reader` must be a live reader returned by this library.
#[no_mangle]
pub unsafe extern "C" fn columnar_reader_close(
    reader: *mut NativeFileReader,
) -> Status {
    guard(|| -> Result<(), CodecError> { arg_mut(reader, "reader")?.close() })
}

/// # Safety
/// `reader` must be null or a reader returned by this library that has not
/// been freed yet. Children of the reader must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn columnar_reader_free(reader: *mut NativeFileReader) {
    if !reader.is_null() {
        drop(Box::from_raw(reader));
    }
}

/// File-level metadata, detached from the reader.
pub struct NativeMetadata {
    metadata: ParquetMetaData,
}

impl NativeMetadata {
    fn column(&self, index: usize) -> Result<ColumnDescPtr, CodecError> {
        let schema = self.metadata.file_metadata().schema_descr();
        if index >= schema.num_columns() {
            return Err(CodecError::argument(format!(
                "column {} out of range for {} columns",
                index,
                schema.num_columns()
            )));
        }
        Ok(schema.column(index))
    }
}

/// # Safety
/// `reader` must be a live reader returned by this library.
#[no_mangle]
pub unsafe extern "C" fn columnar_reader_metadata(
    reader: *const NativeFileReader,
    metadata: *mut *mut NativeMetadata,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let reader = arg(reader, "reader")?;
        let out = arg_mut(metadata, "metadata")?;
        let metadata = reader.run(|file| Ok(file.metadata().clone()))?;
        *out = Box::into_raw(Box::new(NativeMetadata { metadata }));
        Ok(())
    })
}

/// # Safety
/// `metadata` must be a live metadata object returned by this library.
#[no_mangle]
pub unsafe extern "C" fn columnar_metadata_num_rows(
    metadata: *const NativeMetadata,
    num_rows: *mut i64,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let metadata = arg(metadata, "metadata")?;
        *arg_mut(num_rows, "num_rows")? =
            metadata.metadata.file_metadata().num_rows();
        Ok(())
    })
}

/// # Safety
/// `metadata` must be a live metadata object returned by this library.
#[no_mangle]
pub unsafe extern "C" fn columnar_metadata_num_row_groups(
    metadata: *const NativeMetadata,
    num_row_groups: *mut usize,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let metadata = arg(metadata, "metadata")?;
        *arg_mut(num_row_groups, "num_row_groups")? =
            metadata.metadata.num_row_groups();
        Ok(())
    })
}

/// # Safety
/// `metadata` must be a live metadata object returned by this library.
#[no_mangle]
pub unsafe extern "C" fn columnar_metadata_num_columns(
    metadata: *const NativeMetadata,
    num_columns: *mut usize,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let metadata = arg(metadata, "metadata")?;
        *arg_mut(num_columns, "num_columns")? =
            metadata.metadata.file_metadata().schema_descr().num_columns();
        Ok(())
    })
}

/// Writes null when the file does not record its writer. The string must
/// be released with `columnar_string_free`.
///
/// # Safety
/// `metadata` must be a live metadata object returned by this library.
#[no_mangle]
pub unsafe extern "C" fn columnar_metadata_created_by(
    metadata: *const NativeMetadata,
    created_by: *mut *mut c_char,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let metadata = arg(metadata, "metadata")?;
        let out = arg_mut(created_by, "created_by")?;
        *out = match metadata.metadata.file_metadata().created_by() {
            Some(value) => into_c_string(value),
            None => ptr::null_mut(),
        };
        Ok(())
    })
}

/// Dotted path of a leaf column. The string must be released with
/// `columnar_string_free`.
///
/// # Safety
/// `metadata` must be a live metadata object returned by this library.
#[no_mangle]
pub unsafe extern "C" fn columnar_metadata_column_name(
    metadata: *const NativeMetadata,
    column: usize,
    name: *mut *mut c_char,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let metadata = arg(metadata, "metadata")?;
        let out = arg_mut(name, "name")?;
        *out = into_c_string(&metadata.column(column)?.path().string());
        Ok(())
    })
}

/// # Safety
/// `metadata` must be a live metadata object returned by this library.
#[no_mangle]
pub unsafe extern "C" fn columnar_metadata_column_kind(
    metadata: *const NativeMetadata,
    column: usize,
    kind: *mut i32,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let metadata = arg(metadata, "metadata")?;
        let out = arg_mut(kind, "kind")?;
        let descr = metadata.column(column)?;
        *out = ColumnKind::of(&descr)?.as_raw();
        Ok(())
    })
}

/// # Safety
/// `metadata` must be a live metadata object returned by this library.
#[no_mangle]
pub unsafe extern "C" fn columnar_metadata_column_nullable(
    metadata: *const NativeMetadata,
    column: usize,
    nullable: *mut bool,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let metadata = arg(metadata, "metadata")?;
        let out = arg_mut(nullable, "nullable")?;
        *out = metadata.column(column)?.max_def_level() > 0;
        Ok(())
    })
}

/// # Safety
/// `metadata` must be null or a metadata object returned by this library
/// that has not been freed yet.
#[no_mangle]
pub unsafe extern "C" fn columnar_metadata_free(metadata: *mut NativeMetadata) {
    if !metadata.is_null() {
        drop(Box::from_raw(metadata));
    }
}

/// One row group of an opened file. Each column read decodes its column
/// chunk on its own, so one unreadable column leaves the others usable.
pub struct NativeRowGroup {
    reader: *const NativeFileReader,
    index: usize,
    num_rows: i64,
    kinds: Vec<Result<ColumnKind, String>>,
}

impl NativeRowGroup {
    fn read_column(
        &self,
        column: usize,
    ) -> Result<NativeColumnBatch, CodecError> {
        let kind = match self.kinds.get(column) {
            None => {
                return Err(CodecError::argument(format!(
                    "column {} out of range for {} columns",
                    column,
                    self.kinds.len()
                )))
            }
            Some(Err(reason)) => {
                return Err(CodecError::Unsupported(reason.clone()))
            }
            Some(Ok(kind)) => *kind,
        };

        let rows = usize::try_from(self.num_rows).unwrap_or(0);
        let reader = unsafe { &*self.reader };
        let batch = reader.run(|file| {
            let row_group = file.get_row_group(self.index)?;
            let max_def_level = row_group
                .metadata()
                .column(column)
                .column_descr()
                .max_def_level();
            let chunk = row_group.get_column_reader(column)?;
            NativeColumnBatch::read(kind, chunk, max_def_level, rows)
        })?;
        log::debug!(
            "reader: decoded column {} of row group {} ({} rows)",
            column,
            self.index,
            batch.len()
        );
        Ok(batch)
    }
}

/// # Safety
/// `reader` must be a live reader returned by this library. The row group
/// must be freed before the reader.
#[no_mangle]
pub unsafe extern "C" fn columnar_reader_row_group(
    reader: *const NativeFileReader,
    index: usize,
    row_group: *mut *mut NativeRowGroup,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let out = arg_mut(row_group, "row_group")?;
        let native = arg(reader, "reader")?;
        let (num_rows, kinds) = native.run(|file| {
            let metadata = file.metadata();
            if index >= metadata.num_row_groups() {
                return Err(CodecError::argument(format!(
                    "row group {} out of range for {} row groups",
                    index,
                    metadata.num_row_groups()
                )));
            }
            let schema = metadata.file_metadata().schema_descr();
            let kinds = (0..schema.num_columns())
                .map(|i| {
                    ColumnKind::of(&schema.column(i)).map_err(|e| e.to_string())
                })
                .collect::<Vec<_>>();
            Ok((metadata.row_group(index).num_rows(), kinds))
        })?;
        *out = Box::into_raw(Box::new(NativeRowGroup {
            reader,
            index,
            num_rows,
            kinds,
        }));
        Ok(())
    })
}

/// # Safety
/// `row_group` must be a live row group returned by this library.
#[no_mangle]
pub unsafe extern "C" fn columnar_row_group_num_rows(
    row_group: *const NativeRowGroup,
    num_rows: *mut i64,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let row_group = arg(row_group, "row_group")?;
        *arg_mut(num_rows, "num_rows")? = row_group.num_rows;
        Ok(())
    })
}

/// Decode one column into a new batch owned by the caller.
///
/// # Safety
/// `row_group` must be a live row group whose reader is still alive.
#[no_mangle]
pub unsafe extern "C" fn columnar_row_group_read_column(
    row_group: *const NativeRowGroup,
    column: usize,
    batch: *mut *mut NativeColumnBatch,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let row_group = arg(row_group, "row_group")?;
        let out = arg_mut(batch, "batch")?;
        let decoded = row_group.read_column(column)?;
        *out = Box::into_raw(Box::new(decoded));
        Ok(())
    })
}

/// # Safety
/// `row_group` must be null or a row group returned by this library that
/// has not been freed yet.
#[no_mangle]
pub unsafe extern "C" fn columnar_row_group_free(row_group: *mut NativeRowGroup) {
    if !row_group.is_null() {
        drop(Box::from_raw(row_group));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::*;
    use bridge_error::{check, ErrorCode};
    use parquet::column::writer::ColumnWriter;
    use parquet::file::properties::WriterProperties;
    use parquet::file::writer::SerializedFileWriter;
    use parquet::schema::parser::parse_message_type;
    use std::ffi::CString;
    use std::path::Path;
    use std::sync::Arc;
    use tempdir::TempDir;

    /// Write one row group with the plain parquet writer, handing each
    /// leaf column writer to `write` with its index.
    fn write_file(
        path: &Path,
        message: &str,
        mut write: impl FnMut(usize, &mut ColumnWriter<'_>),
    ) {
        let schema = Arc::new(parse_message_type(message).unwrap());
        let file = File::create(path).unwrap();
        let mut writer = SerializedFileWriter::new(
            file,
            schema,
            Arc::new(WriterProperties::builder().build()),
        )
        .unwrap();
        let mut row_group = writer.next_row_group().unwrap();
        let mut index = 0;
        while let Some(mut column) = row_group.next_column().unwrap() {
            write(index, column.untyped());
            column.close().unwrap();
            index += 1;
        }
        row_group.close().unwrap();
        writer.close().unwrap();
    }

    unsafe fn open(path: &Path) -> (*mut NativeFileReader, *mut NativeRowGroup) {
        let path = CString::new(path.to_str().unwrap()).unwrap();
        let mut reader = ptr::null_mut();
        check(columnar_reader_open_path(path.as_ptr(), &mut reader)).unwrap();
        let mut row_group = ptr::null_mut();
        check(columnar_reader_row_group(reader, 0, &mut row_group)).unwrap();
        (reader, row_group)
    }

    unsafe fn read_column(
        row_group: *mut NativeRowGroup,
        column: usize,
    ) -> Result<*mut NativeColumnBatch, Status> {
        let mut batch = ptr::null_mut();
        let status = columnar_row_group_read_column(row_group, column, &mut batch);
        if status.is_ok() {
            Ok(batch)
        } else {
            Err(status)
        }
    }

    unsafe fn validity(batch: *mut NativeColumnBatch) -> Vec<bool> {
        let mut data = ptr::null();
        let mut len = 0;
        check(columnar_batch_validity(batch, &mut data, &mut len)).unwrap();
        std::slice::from_raw_parts(data, len).to_vec()
    }

    unsafe fn values<T: Copy>(
        batch: *mut NativeColumnBatch,
        f: unsafe extern "C" fn(
            *const NativeColumnBatch,
            *mut *const T,
            *mut usize,
        ) -> Status,
    ) -> Vec<T> {
        let mut data = ptr::null();
        let mut len = 0;
        check(f(batch, &mut data, &mut len)).unwrap();
        std::slice::from_raw_parts(data, len).to_vec()
    }

    #[test_log::test]
    fn test_unsupported_column_leaves_others_readable() {
        let dir = TempDir::new("native-codec").unwrap();
        let path = dir.path().join("unsigned.parquet");
        write_file(
            &path,
            "message m { required int64 id; required int32 u (UINT_32); }",
            |index, column| match (index, column) {
                (0, ColumnWriter::Int64ColumnWriter(w)) => {
                    w.write_batch(&[1, 2, 3], None, None).unwrap();
                }
                (1, ColumnWriter::Int32ColumnWriter(w)) => {
                    w.write_batch(&[7, -1, 0], None, None).unwrap();
                }
                _ => unreachable!(),
            },
        );

        unsafe {
            let (reader, row_group) = open(&path);
            let batch = read_column(row_group, 0).unwrap();
            assert_eq!(values(batch, columnar_batch_values_i64), vec![1, 2, 3]);
            columnar_batch_free(batch);

            let status = read_column(row_group, 1).unwrap_err();
            assert_eq!(status.code(), Some(ErrorCode::Codec));

            // the failure does not stick to the row group
            let batch = read_column(row_group, 0).unwrap();
            columnar_batch_free(batch);
            columnar_row_group_free(row_group);
            columnar_reader_free(reader);
        }
    }

    #[test_log::test]
    fn test_leaves_of_optional_group() {
        let dir = TempDir::new("native-codec").unwrap();
        let path = dir.path().join("nested.parquet");
        write_file(
            &path,
            "message m {
                required int64 id;
                optional group point {
                    required int32 x;
                    optional double y;
                }
            }",
            |index, column| match (index, column) {
                (0, ColumnWriter::Int64ColumnWriter(w)) => {
                    w.write_batch(&[1, 2, 3], None, None).unwrap();
                }
                (1, ColumnWriter::Int32ColumnWriter(w)) => {
                    w.write_batch(&[10, 30], Some(&[1, 0, 1][..]), None).unwrap();
                }
                (2, ColumnWriter::DoubleColumnWriter(w)) => {
                    w.write_batch(&[1.5], Some(&[2, 0, 1][..]), None).unwrap();
                }
                _ => unreachable!(),
            },
        );

        unsafe {
            let (reader, row_group) = open(&path);

            let x = read_column(row_group, 1).unwrap();
            assert_eq!(validity(x), vec![true, false, true]);
            assert_eq!(values(x, columnar_batch_values_i32), vec![10, 0, 30]);
            columnar_batch_free(x);

            let y = read_column(row_group, 2).unwrap();
            assert_eq!(validity(y), vec![true, false, false]);
            assert_eq!(values(y, columnar_batch_values_f64), vec![1.5, 0.0, 0.0]);
            columnar_batch_free(y);

            let status = read_column(row_group, 3).unwrap_err();
            assert_eq!(status.code(), Some(ErrorCode::InvalidArgument));

            columnar_row_group_free(row_group);
            columnar_reader_free(reader);
        }
    }
}
