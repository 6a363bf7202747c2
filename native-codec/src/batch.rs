use parquet::column::reader::{ColumnReader, ColumnReaderImpl};
use parquet::data_type::DataType;

use bridge_error::{guard, Status};

use crate::error::CodecError;
use crate::ffi::{arg, arg_mut};
use crate::kind::ColumnKind;

/// Dense values of one column; null rows hold the kind's default value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BatchValues {
    Boolean(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Bytes(Vec<Vec<u8>>),
}

/// A decoded column of one row group.
#[derive(Debug, Clone)]
pub struct NativeColumnBatch {
    kind: ColumnKind,
    validity: Vec<bool>,
    values: BatchValues,
}

impl NativeColumnBatch {
    /// Decode a whole column chunk of `rows` records.
    ///
    /// `max_def_level` is the definition level of a present value; lower
    /// levels are nulls, whichever ancestor was missing.
    pub(crate) fn read(
        kind: ColumnKind,
        reader: ColumnReader,
        max_def_level: i16,
        rows: usize,
    ) -> Result<Self, CodecError> {
        let (validity, values) = match (kind, reader) {
            (ColumnKind::Boolean, ColumnReader::BoolColumnReader(mut r)) => {
                let (validity, dense) = read_leaf(&mut r, max_def_level, rows)?;
                let values = BatchValues::Boolean(spread(dense, &validity));
                (validity, values)
            }
            (ColumnKind::Int32, ColumnReader::Int32ColumnReader(mut r)) => {
                let (validity, dense) = read_leaf(&mut r, max_def_level, rows)?;
                let values = BatchValues::Int32(spread(dense, &validity));
                (validity, values)
            }
            (ColumnKind::Int64, ColumnReader::Int64ColumnReader(mut r)) => {
                let (validity, dense) = read_leaf(&mut r, max_def_level, rows)?;
                let values = BatchValues::Int64(spread(dense, &validity));
                (validity, values)
            }
            (ColumnKind::Float, ColumnReader::FloatColumnReader(mut r)) => {
                let (validity, dense) = read_leaf(&mut r, max_def_level, rows)?;
                let values = BatchValues::Float(spread(dense, &validity));
                (validity, values)
            }
            (ColumnKind::Double, ColumnReader::DoubleColumnReader(mut r)) => {
                let (validity, dense) = read_leaf(&mut r, max_def_level, rows)?;
                let values = BatchValues::Double(spread(dense, &validity));
                (validity, values)
            }
            (
                ColumnKind::Utf8 | ColumnKind::Binary,
                ColumnReader::ByteArrayColumnReader(mut r),
            ) => {
                let (validity, dense) = read_leaf(&mut r, max_def_level, rows)?;
                let dense = dense.iter().map(|b| b.data().to_vec()).collect();
                let values = BatchValues::Bytes(spread(dense, &validity));
                (validity, values)
            }
            (kind, _) => {
                return Err(CodecError::TypeMismatch(format!(
                    "column chunk does not hold {} values",
                    kind
                )))
            }
        };
        Ok(Self {
            kind,
            validity,
            values,
        })
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.validity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validity.is_empty()
    }
}

/// Read every record of a flat column: one validity flag per row and the
/// values of the non-null rows.
fn read_leaf<T: DataType>(
    reader: &mut ColumnReaderImpl<T>,
    max_def_level: i16,
    rows: usize,
) -> Result<(Vec<bool>, Vec<T::T>), CodecError> {
    let mut def_levels = Vec::with_capacity(rows);
    let mut values = Vec::with_capacity(rows);
    let mut records = 0;
    while records < rows {
        let levels = if max_def_level > 0 {
            Some(&mut def_levels)
        } else {
            None
        };
        let (read, _, _) =
            reader.read_records(rows - records, levels, None, &mut values)?;
        if read == 0 {
            break;
        }
        records += read;
    }

    let validity: Vec<bool> = if max_def_level > 0 {
        def_levels.iter().map(|level| *level == max_def_level).collect()
    } else {
        vec![true; values.len()]
    };
    if validity.len() != rows {
        return Err(CodecError::Unsupported(format!(
            "column chunk holds {} of {} rows",
            validity.len(),
            rows
        )));
    }
    Ok((validity, values))
}

/// Place the values of non-null rows at their row positions.
fn spread<V: Default>(dense: Vec<V>, validity: &[bool]) -> Vec<V> {
    let mut dense = dense.into_iter();
    validity
        .iter()
        .map(|valid| {
            if *valid {
                dense.next().unwrap_or_default()
            } else {
                V::default()
            }
        })
        .collect()
}

/// # Safety
/// `batch` must be a live batch returned by this library.
#[no_mangle]
pub unsafe extern "C" fn columnar_batch_len(
    batch: *const NativeColumnBatch,
    len: *mut usize,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let batch = arg(batch, "batch")?;
        *arg_mut(len, "len")? = batch.len();
        Ok(())
    })
}

/// # Safety
/// `batch` must be a live batch returned by this library.
#[no_mangle]
pub unsafe extern "C" fn columnar_batch_kind(
    batch: *const NativeColumnBatch,
    kind: *mut i32,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let batch = arg(batch, "batch")?;
        *arg_mut(kind, "kind")? = batch.kind.as_raw();
        Ok(())
    })
}

/// One flag per row, `false` for nulls. The view is valid until the batch
/// is freed.
///
/// # Safety
/// `batch` must be a live batch returned by this library.
#[no_mangle]
pub unsafe extern "C" fn columnar_batch_validity(
    batch: *const NativeColumnBatch,
    data: *mut *const bool,
    len: *mut usize,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let batch = arg(batch, "batch")?;
        let data = arg_mut(data, "data")?;
        let len = arg_mut(len, "len")?;
        *data = batch.validity.as_ptr();
        *len = batch.validity.len();
        Ok(())
    })
}

macro_rules! batch_values {
    ($name:ident, $variant:ident, $ty:ty) => {
        /// Dense values, one per row. The view is valid until the batch is
        /// freed.
        ///
        /// # Safety
        /// `batch` must be a live batch returned by this library.
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            batch: *const NativeColumnBatch,
            data: *mut *const $ty,
            len: *mut usize,
        ) -> Status {
            guard(|| -> Result<(), CodecError> {
                let batch = arg(batch, "batch")?;
                let data = arg_mut(data, "data")?;
                let len = arg_mut(len, "len")?;
                match &batch.values {
                    BatchValues::$variant(values) => {
                        *data = values.as_ptr();
                        *len = values.len();
                        Ok(())
                    }
                    _ => Err(CodecError::TypeMismatch(format!(
                        "{} requested from a {} column",
                        stringify!($ty),
                        batch.kind
                    ))),
                }
            })
        }
    };
}

batch_values!(columnar_batch_values_bool, Boolean, bool);
batch_values!(columnar_batch_values_i32, Int32, i32);
batch_values!(columnar_batch_values_i64, Int64, i64);
batch_values!(columnar_batch_values_f32, Float, f32);
batch_values!(columnar_batch_values_f64, Double, f64);

/// Bytes of one row of a utf8 or binary column. Null rows yield an empty
/// view. The view is valid until the batch is freed.
///
/// # Safety
/// `batch` must be a live batch returned by this library.
#[no_mangle]
pub unsafe extern "C" fn columnar_batch_value_bytes(
    batch: *const NativeColumnBatch,
    row: usize,
    data: *mut *const u8,
    len: *mut usize,
) -> Status {
    guard(|| -> Result<(), CodecError> {
        let batch = arg(batch, "batch")?;
        let data = arg_mut(data, "data")?;
        let len = arg_mut(len, "len")?;
        let values = match &batch.values {
            BatchValues::Bytes(values) => values,
            _ => {
                return Err(CodecError::TypeMismatch(format!(
                    "bytes requested from a {} column",
                    batch.kind
                )))
            }
        };
        let value = values.get(row).ok_or_else(|| {
            CodecError::argument(format!(
                "row {} out of range for {} rows",
                row,
                values.len()
            ))
        })?;
        *data = value.as_ptr();
        *len = value.len();
        Ok(())
    })
}

/// # Safety
/// `batch` must be null or a batch returned by this library that has not
/// been freed yet.
#[no_mangle]
pub unsafe extern "C" fn columnar_batch_free(batch: *mut NativeColumnBatch) {
    if !batch.is_null() {
        drop(Box::from_raw(batch));
    }
}
