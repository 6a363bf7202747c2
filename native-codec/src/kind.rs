use std::fmt;

use parquet::basic::{ConvertedType, LogicalType, Type as PhysicalType};
use parquet::schema::types::ColumnDescriptor;

use crate::error::CodecError;

/// Value kinds understood at the boundary, as raw `i32` codes.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Boolean = 1,
    Int32 = 2,
    Int64 = 3,
    Float = 4,
    Double = 5,
    Utf8 = 6,
    Binary = 7,
}

impl ColumnKind {
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            1 => Self::Boolean,
            2 => Self::Int32,
            3 => Self::Int64,
            4 => Self::Float,
            5 => Self::Double,
            6 => Self::Utf8,
            7 => Self::Binary,
            _ => return None,
        })
    }

    pub(crate) fn physical_type(self) -> PhysicalType {
        match self {
            Self::Boolean => PhysicalType::BOOLEAN,
            Self::Int32 => PhysicalType::INT32,
            Self::Int64 => PhysicalType::INT64,
            Self::Float => PhysicalType::FLOAT,
            Self::Double => PhysicalType::DOUBLE,
            Self::Utf8 | Self::Binary => PhysicalType::BYTE_ARRAY,
        }
    }

    pub(crate) fn of(descr: &ColumnDescriptor) -> Result<Self, CodecError> {
        if descr.max_rep_level() > 0 {
            return Err(CodecError::Unsupported(format!(
                "repeated column {}",
                descr.path()
            )));
        }
        Ok(match descr.physical_type() {
            PhysicalType::BOOLEAN => Self::Boolean,
            PhysicalType::INT32 | PhysicalType::INT64
                if reinterprets_integer(descr) =>
            {
                return Err(CodecError::Unsupported(format!(
                    "{} annotation of column {}",
                    descr.converted_type(),
                    descr.path()
                )))
            }
            PhysicalType::INT32 => Self::Int32,
            PhysicalType::INT64 => Self::Int64,
            PhysicalType::FLOAT => Self::Float,
            PhysicalType::DOUBLE => Self::Double,
            PhysicalType::BYTE_ARRAY => {
                let utf8 = descr.converted_type() == ConvertedType::UTF8
                    || matches!(descr.logical_type(), Some(LogicalType::String));
                if utf8 {
                    Self::Utf8
                } else {
                    Self::Binary
                }
            }
            other => {
                return Err(CodecError::Unsupported(format!(
                    "physical type {} of column {}",
                    other,
                    descr.path()
                )))
            }
        })
    }
}

/// Unsigned and decimal integers would come out as signed raw values.
fn reinterprets_integer(descr: &ColumnDescriptor) -> bool {
    let converted = matches!(
        descr.converted_type(),
        ConvertedType::UINT_32 | ConvertedType::UINT_64 | ConvertedType::DECIMAL
    );
    let logical = matches!(
        descr.logical_type(),
        Some(LogicalType::Decimal { .. })
            | Some(LogicalType::Integer {
                bit_width: 32 | 64,
                is_signed: false,
            })
    );
    converted || logical
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "boolean",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float => "float",
            Self::Double => "double",
            Self::Utf8 => "utf8",
            Self::Binary => "binary",
        };
        f.write_str(name)
    }
}
