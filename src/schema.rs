use std::collections::HashSet;
use std::fmt;

use bridge_error::{BridgeError, ErrorCode, Result};
use native_codec::ColumnKind;
use serde::{Deserialize, Serialize};

/// Logical kind of a column's values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Boolean,
    Int32,
    Int64,
    Float,
    Double,
    Utf8,
    Binary,
}

impl ValueKind {
    pub(crate) fn from_native(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Boolean => Self::Boolean,
            ColumnKind::Int32 => Self::Int32,
            ColumnKind::Int64 => Self::Int64,
            ColumnKind::Float => Self::Float,
            ColumnKind::Double => Self::Double,
            ColumnKind::Utf8 => Self::Utf8,
            ColumnKind::Binary => Self::Binary,
        }
    }

    /// Decode a kind code received from native code.
    pub(crate) fn from_raw(raw: i32) -> Result<Self> {
        ColumnKind::from_raw(raw)
            .map(Self::from_native)
            .ok_or_else(|| {
                BridgeError::native(
                    ErrorCode::TypeMismatch,
                    format!("unknown column kind {}", raw),
                )
            })
    }

    fn message_type(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float => "float",
            Self::Double => "double",
            Self::Utf8 => "binary",
            Self::Binary => "binary",
        }
    }
}

impl fmt::Display for ValueKind {
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ValueKind,
    pub nullable: bool,
}

impl ColumnSpec {
    pub fn required(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
        }
    }
}

/// Flat list of columns, in file order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "SchemaColumns")]
pub struct Schema {
    columns: Vec<ColumnSpec>,
}

/// Unvalidated form of [`Schema`] as it appears in JSON.
#[derive(Deserialize)]
struct SchemaColumns {
    columns: Vec<ColumnSpec>,
}

impl TryFrom<SchemaColumns> for Schema {
    type Error = BridgeError;

    fn try_from(value: SchemaColumns) -> Result<Self> {
        Schema::new(value.columns)
    }
}

impl Schema {
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self> {
        if columns.is_empty() {
            return Err(BridgeError::argument("schema has no columns"));
        }
        let mut seen = HashSet::new();
        for column in &columns {
            validate_name(&column.name)?;
            if !seen.insert(column.name.as_str()) {
                return Err(BridgeError::argument(format!(
                    "duplicate column name {}",
                    column.name
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Columns as described by an existing file, whose names need not
    /// follow the rules of [`Schema::new`].
    pub(crate) fn from_columns(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&ColumnSpec> {
        self.columns.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Render the schema in the codec's message-type syntax.
    pub fn to_message_type(&self) -> String {
        let mut message = String::from("message schema {\n");
        for column in &self.columns {
            let repetition = if column.nullable {
                "optional"
            } else {
                "required"
            };
            let annotation = match column.kind {
                ValueKind::Utf8 => " (UTF8)",
                _ => "",
            };
            message.push_str(&format!(
                "  {} {} {}{};\n",
                repetition,
                column.kind.message_type(),
                column.name,
                annotation
            ));
        }
        message.push('}');
        message
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BridgeError::argument("empty column name"));
    }
    let valid = name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(BridgeError::argument(format!(
            "column name {:?} may only hold letters, digits, '_' and '-'",
            name
        )));
    }
    Ok(())
}
