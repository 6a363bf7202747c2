use std::ffi::{CStr, CString};
use std::io::{Read, Seek};
use std::os::raw::c_char;
use std::path::Path;
use std::ptr;
use std::slice;
use std::sync::Arc;

use bridge_error::{
    check, check_and_return, BridgeError, ErrorCode, Result, Status,
};
use bridge_handle::NativeHandle;
use bridge_io::{
    BufferedSource, ManagedSourceBinding, MemorySource, RandomAccessSource,
    ReadStats, SeekableSource,
};
use bytes::Bytes;
use native_codec::*;

use crate::properties::ReaderProperties;
use crate::schema::{ColumnSpec, Schema, ValueKind};
use crate::values::ColumnValues;

/// Call a native accessor that reports its result through one
/// out-pointer.
pub(crate) fn query<R, T: Default>(
    handle: &NativeHandle<R>,
    f: impl FnOnce(*mut R, &mut T) -> Status,
) -> Result<T> {
    query_with(handle, T::default(), f)
}

/// Like [`query`], for calls that hand out a new native object.
pub(crate) fn query_ptr<R, C>(
    handle: &NativeHandle<R>,
    f: impl FnOnce(*mut R, &mut *mut C) -> Status,
) -> Result<*mut C> {
    query_with(handle, ptr::null_mut(), f)
}

fn query_with<R, T>(
    handle: &NativeHandle<R>,
    initial: T,
    f: impl FnOnce(*mut R, &mut T) -> Status,
) -> Result<T> {
    handle.with_raw(|raw| {
        let mut out = initial;
        let status = f(raw, &mut out);
        check_and_return(status, out)
    })?
}

/// Take ownership of a string returned by native code.
unsafe fn take_string(value: *mut c_char) -> Option<String> {
    if value.is_null() {
        return None;
    }
    let owned = CStr::from_ptr(value).to_string_lossy().into_owned();
    columnar_string_free(value);
    Some(owned)
}

pub(crate) fn path_to_cstring(path: &Path) -> Result<CString> {
    let path = path.to_str().ok_or_else(|| {
        BridgeError::argument(format!("{} is not valid UTF-8", path.display()))
    })?;
    if path.is_empty() {
        return Err(BridgeError::argument("empty path"));
    }
    Ok(CString::new(path)?)
}

struct ReaderCore {
    handle: NativeHandle<NativeFileReader>,
    stats: Option<Arc<ReadStats>>,
}

impl Drop for ReaderCore {
    fn drop(&mut self) {
        self.handle.dispose();
    }
}

/// An opened columnar file.
///
/// Metadata and row groups obtained from a reader keep its native state
/// alive; disposing the reader makes them fail with
/// [`BridgeError::UseAfterDispose`].
pub struct ParquetFileReader {
    core: Arc<ReaderCore>,
}

impl ParquetFileReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path_to_cstring(path.as_ref())?;
        let mut raw = ptr::null_mut();
        check(unsafe { columnar_reader_open_path(path.as_ptr(), &mut raw) })?;
        log::debug!("reader: opened {:?}", path);

        let handle = unsafe {
            NativeHandle::acquire("file reader", raw, columnar_reader_free)
        };
        Ok(Self {
            core: Arc::new(ReaderCore {
                handle,
                stats: None,
            }),
        })
    }

    /// Read a file served by a managed source through a read-ahead buffer.
    ///
    /// The source is closed once the reader is disposed when
    /// `owns_source` is set; a failed open closes an owned source right
    /// away.
    pub fn from_source<S: RandomAccessSource + 'static>(
        source: S,
        properties: &ReaderProperties,
    ) -> Result<Self> {
        properties.validate()?;
        let buffered = BufferedSource::new(source, properties.read_ahead)?;
        let stats = buffered.stats();
        let binding = ManagedSourceBinding::new(
            "reader",
            buffered,
            properties.owns_source,
        )
        .with_policy(properties.closed_source_policy);

        let slots = binding.slots();
        let mut raw = ptr::null_mut();
        check(unsafe { columnar_reader_open_source(&slots, &mut raw) })?;
        log::debug!(
            "reader: opened managed source with {} byte read-ahead",
            properties.read_ahead
        );

        let handle = unsafe {
            NativeHandle::acquire("file reader", raw, columnar_reader_free)
        };
        handle.add_keepalive(binding)?;
        Ok(Self {
            core: Arc::new(ReaderCore {
                handle,
                stats: Some(stats),
            }),
        })
    }

    pub fn from_bytes(
        bytes: impl Into<Bytes>,
        properties: &ReaderProperties,
    ) -> Result<Self> {
        Self::from_source(MemorySource::new(bytes), properties)
    }

    pub fn from_reader<R: Read + Seek + Send + 'static>(
        reader: R,
        properties: &ReaderProperties,
    ) -> Result<Self> {
        Self::from_source(SeekableSource::new(reader), properties)
    }

    pub fn metadata(&self) -> Result<FileMetadata> {
        let raw = query_ptr(&self.core.handle, |raw, out| unsafe {
            columnar_reader_metadata(raw, out)
        })?;
        let handle = unsafe {
            NativeHandle::acquire("file metadata", raw, columnar_metadata_free)
        };
        Ok(FileMetadata { handle })
    }

    pub fn row_group(&self, index: usize) -> Result<RowGroupReader> {
        let num_columns = self.metadata()?.num_columns()?;
        let raw = query_ptr(&self.core.handle, |raw, out| unsafe {
            columnar_reader_row_group(raw, index, out)
        })?;
        let handle = unsafe {
            NativeHandle::acquire("row group", raw, columnar_row_group_free)
        };
        Ok(RowGroupReader {
            parent: Arc::clone(&self.core),
            handle,
            index,
            num_columns,
        })
    }

    /// Counters of the read-ahead buffer, for readers over a managed
    /// source.
    pub fn read_stats(&self) -> Option<Arc<ReadStats>> {
        self.core.stats.clone()
    }

    /// Release the decoder and close an owned source, reporting any
    /// failure. The handle stays valid until [`Self::dispose`].
    pub fn close(&self) -> Result<()> {
        self.core
            .handle
            .with_raw(|raw| check(unsafe { columnar_reader_close(raw) }))?
    }

    pub fn dispose(&self) {
        self.core.handle.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.core.handle.is_disposed()
    }
}

/// File-level metadata. Detached from the reader natively, so it stays
/// usable after the reader is disposed.
pub struct FileMetadata {
    handle: NativeHandle<NativeMetadata>,
}

impl FileMetadata {
    pub fn num_rows(&self) -> Result<i64> {
        query(&self.handle, |raw, out| unsafe {
            columnar_metadata_num_rows(raw, out)
        })
    }

    pub fn num_row_groups(&self) -> Result<usize> {
        query(&self.handle, |raw, out| unsafe {
            columnar_metadata_num_row_groups(raw, out)
        })
    }

    pub fn num_columns(&self) -> Result<usize> {
        query(&self.handle, |raw, out| unsafe {
            columnar_metadata_num_columns(raw, out)
        })
    }

    pub fn created_by(&self) -> Result<Option<String>> {
        self.handle.with_raw(|raw| {
            let mut value = ptr::null_mut();
            let status = unsafe { columnar_metadata_created_by(raw, &mut value) };
            check(status)?;
            Ok(unsafe { take_string(value) })
        })?
    }

    pub fn schema(&self) -> Result<Schema> {
        let mut columns = Vec::new();
        for index in 0..self.num_columns()? {
            let name = self.handle.with_raw(|raw| {
                let mut value = ptr::null_mut();
                let status = unsafe {
                    columnar_metadata_column_name(raw, index, &mut value)
                };
                check(status)?;
                Ok::<_, BridgeError>(
                    unsafe { take_string(value) }.unwrap_or_default(),
                )
            })??;
            let kind = query(&self.handle, |raw, out| unsafe {
                columnar_metadata_column_kind(raw, index, out)
            })?;
            let nullable = query(&self.handle, |raw, out| unsafe {
                columnar_metadata_column_nullable(raw, index, out)
            })?;
            columns.push(ColumnSpec {
                name,
                kind: ValueKind::from_raw(kind)?,
                nullable,
            });
        }
        Ok(Schema::from_columns(columns))
    }

    pub fn dispose(&self) {
        self.handle.dispose();
    }
}

impl Drop for FileMetadata {
    fn drop(&mut self) {
        self.handle.dispose();
    }
}

/// One row group of an opened file.
pub struct RowGroupReader {
    parent: Arc<ReaderCore>,
    handle: NativeHandle<NativeRowGroup>,
    index: usize,
    num_columns: usize,
}

impl RowGroupReader {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    pub fn num_rows(&self) -> Result<i64> {
        self.parent.handle.with_raw(|_| {
            query(&self.handle, |raw, out| unsafe {
                columnar_row_group_num_rows(raw, out)
            })
        })?
    }

    pub fn read_column(&self, column: usize) -> Result<ColumnValues> {
        if column >= self.num_columns {
            return Err(BridgeError::argument(format!(
                "column {} out of range for {} columns",
                column, self.num_columns
            )));
        }
        self.parent.handle.with_raw(|_| {
            let raw = query_ptr(&self.handle, |raw, out| unsafe {
                columnar_row_group_read_column(raw, column, out)
            })?;
            let batch = unsafe {
                NativeHandle::acquire("column batch", raw, columnar_batch_free)
            };
            let values = batch.with_raw(|raw| unsafe { decode_batch(raw) })?;
            batch.dispose();
            values
        })?
    }

    pub fn read_all(&self) -> Result<Vec<ColumnValues>> {
        (0..self.num_columns)
            .map(|column| self.read_column(column))
            .collect()
    }

    pub fn dispose(&self) {
        self.handle.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.handle.is_disposed()
    }
}

impl Drop for RowGroupReader {
    fn drop(&mut self) {
        self.handle.dispose();
    }
}

unsafe fn batch_view<'a, T>(
    batch: *const NativeColumnBatch,
    f: unsafe extern "C" fn(
        *const NativeColumnBatch,
        *mut *const T,
        *mut usize,
    ) -> Status,
) -> Result<&'a [T]> {
    let mut data = ptr::null();
    let mut len = 0;
    check(f(batch, &mut data, &mut len))?;
    if len == 0 {
        return Ok(&[]);
    }
    Ok(slice::from_raw_parts(data, len))
}

fn zip_validity<T: Copy>(values: &[T], validity: &[bool]) -> Vec<Option<T>> {
    values
        .iter()
        .zip(validity)
        .map(|(value, valid)| valid.then_some(*value))
        .collect()
}

/// Copy a native batch into managed values.
///
/// # Safety
/// `batch` must be a live batch.
unsafe fn decode_batch(batch: *mut NativeColumnBatch) -> Result<ColumnValues> {
    let mut kind = 0;
    check(columnar_batch_kind(batch, &mut kind))?;
    let validity = batch_view(batch, columnar_batch_validity)?;

    let values = match ValueKind::from_raw(kind)? {
        ValueKind::Boolean => ColumnValues::Boolean(zip_validity(
            batch_view(batch, columnar_batch_values_bool)?,
            validity,
        )),
        ValueKind::Int32 => ColumnValues::Int32(zip_validity(
            batch_view(batch, columnar_batch_values_i32)?,
            validity,
        )),
        ValueKind::Int64 => ColumnValues::Int64(zip_validity(
            batch_view(batch, columnar_batch_values_i64)?,
            validity,
        )),
        ValueKind::Float => ColumnValues::Float(zip_validity(
            batch_view(batch, columnar_batch_values_f32)?,
            validity,
        )),
        ValueKind::Double => ColumnValues::Double(zip_validity(
            batch_view(batch, columnar_batch_values_f64)?,
            validity,
        )),
        ValueKind::Utf8 => {
            let rows = byte_rows(batch, validity)?;
            let strings = rows
                .into_iter()
                .map(|row| row.map(String::from_utf8).transpose())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| {
                    BridgeError::native(ErrorCode::Codec, e.to_string())
                })?;
            ColumnValues::Utf8(strings)
        }
        ValueKind::Binary => ColumnValues::Binary(byte_rows(batch, validity)?),
    };
    Ok(values)
}

unsafe fn byte_rows(
    batch: *mut NativeColumnBatch,
    validity: &[bool],
) -> Result<Vec<Option<Vec<u8>>>> {
    let mut rows = Vec::with_capacity(validity.len());
    for (row, valid) in validity.iter().enumerate() {
        if !valid {
            rows.push(None);
            continue;
        }
        let mut data = ptr::null();
        let mut len = 0;
        check(columnar_batch_value_bytes(batch, row, &mut data, &mut len))?;
        let bytes = if len == 0 {
            Vec::new()
        } else {
            slice::from_raw_parts(data, len).to_vec()
        };
        rows.push(Some(bytes));
    }
    Ok(rows)
}
