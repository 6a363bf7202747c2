use crate::schema::ValueKind;

/// Values of one column of a row group, `None` for nulls.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Boolean(Vec<Option<bool>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    Float(Vec<Option<f32>>),
    Double(Vec<Option<f64>>),
    Utf8(Vec<Option<String>>),
    Binary(Vec<Option<Vec<u8>>>),
}

macro_rules! each {
    ($values:expr, $v:ident => $body:expr) => {
        match $values {
            ColumnValues::Boolean($v) => $body,
            ColumnValues::Int32($v) => $body,
            ColumnValues::Int64($v) => $body,
            ColumnValues::Float($v) => $body,
            ColumnValues::Double($v) => $body,
            ColumnValues::Utf8($v) => $body,
            ColumnValues::Binary($v) => $body,
        }
    };
}

impl ColumnValues {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Int32(_) => ValueKind::Int32,
            Self::Int64(_) => ValueKind::Int64,
            Self::Float(_) => ValueKind::Float,
            Self::Double(_) => ValueKind::Double,
            Self::Utf8(_) => ValueKind::Utf8,
            Self::Binary(_) => ValueKind::Binary,
        }
    }

    pub fn len(&self) -> usize {
        each!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        each!(self, v => v.iter().filter(|x| x.is_none()).count())
    }

    /// One flag per row, `false` for nulls.
    pub(crate) fn validity(&self) -> Vec<bool> {
        each!(self, v => v.iter().map(Option::is_some).collect())
    }

    /// Human-readable rendering of one row, `null` for nulls.
    pub fn display_at(&self, row: usize) -> Option<String> {
        let rendered = match self {
            Self::Boolean(v) => v.get(row)?.map(|x| x.to_string()),
            Self::Int32(v) => v.get(row)?.map(|x| x.to_string()),
            Self::Int64(v) => v.get(row)?.map(|x| x.to_string()),
            Self::Float(v) => v.get(row)?.map(|x| x.to_string()),
            Self::Double(v) => v.get(row)?.map(|x| x.to_string()),
            Self::Utf8(v) => v.get(row)?.clone(),
            Self::Binary(v) => v.get(row)?.as_ref().map(|bytes| {
                bytes.iter().map(|b| format!("{:02x}", b)).collect()
            }),
        };
        Some(rendered.unwrap_or_else(|| "null".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nulls_and_rendering() {
        let values =
            ColumnValues::Binary(vec![Some(vec![0xde, 0xad]), None, Some(vec![])]);
        assert_eq!(values.kind(), ValueKind::Binary);
        assert_eq!(values.len(), 3);
        assert_eq!(values.null_count(), 1);
        assert_eq!(values.validity(), vec![true, false, true]);
        assert_eq!(values.display_at(0).unwrap(), "dead");
        assert_eq!(values.display_at(1).unwrap(), "null");
        assert_eq!(values.display_at(2).unwrap(), "");
        assert_eq!(values.display_at(3), None);
    }
}
