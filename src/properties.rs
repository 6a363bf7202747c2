use std::ffi::CStr;
use std::fs;
use std::path::Path;
use std::ptr;

use anyhow::Context;
use bridge_error::{BridgeError, Result};
use bridge_io::{ClosedSourcePolicy, DEFAULT_READ_AHEAD};
use native_codec::{WriterOptions, COMPRESSION_SNAPPY, COMPRESSION_UNCOMPRESSED};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

fn from_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&json).map_err(|e| {
        BridgeError::argument(format!("{}: {}", path.display(), e))
    })
}

/// How a reader pulls bytes out of a managed source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderProperties {
    /// Minimum size of every read issued against the source.
    pub read_ahead: usize,
    /// Close the source once the reader is done with it.
    pub owns_source: bool,
    pub closed_source_policy: ClosedSourcePolicy,
}

impl Default for ReaderProperties {
    fn default() -> Self {
        Self {
            read_ahead: DEFAULT_READ_AHEAD,
            owns_source: true,
            closed_source_policy: ClosedSourcePolicy::default(),
        }
    }
}

impl ReaderProperties {
    pub fn with_read_ahead(mut self, read_ahead: usize) -> Self {
        self.read_ahead = read_ahead;
        self
    }

    pub fn with_owns_source(mut self, owns_source: bool) -> Self {
        self.owns_source = owns_source;
        self
    }

    pub fn with_closed_source_policy(
        mut self,
        policy: ClosedSourcePolicy,
    ) -> Self {
        self.closed_source_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.read_ahead == 0 {
            return Err(BridgeError::argument("read_ahead must be positive"));
        }
        Ok(())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let properties: Self = from_json_file(path.as_ref())?;
        properties.validate()?;
        Ok(properties)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    Uncompressed,
    #[default]
    Snappy,
}

/// Encoder settings for a new file. Unset limits keep the codec defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterProperties {
    pub compression: Compression,
    pub dictionary_enabled: bool,
    pub data_page_size_limit: Option<usize>,
    pub max_row_group_size: Option<usize>,
    pub created_by: Option<String>,
}

impl Default for WriterProperties {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            dictionary_enabled: true,
            data_page_size_limit: None,
            max_row_group_size: None,
            created_by: None,
        }
    }
}

impl WriterProperties {
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_dictionary_enabled(mut self, enabled: bool) -> Self {
        self.dictionary_enabled = enabled;
        self
    }

    pub fn with_data_page_size_limit(mut self, limit: usize) -> Self {
        self.data_page_size_limit = Some(limit);
        self
    }

    pub fn with_max_row_group_size(mut self, rows: usize) -> Self {
        self.max_row_group_size = Some(rows);
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_page_size_limit == Some(0) {
            return Err(BridgeError::argument(
                "data_page_size_limit must be positive",
            ));
        }
        if self.max_row_group_size == Some(0) {
            return Err(BridgeError::argument(
                "max_row_group_size must be positive",
            ));
        }
        if let Some(created_by) = &self.created_by {
            if created_by.contains('\0') {
                return Err(BridgeError::argument(
                    "created_by contains a NUL byte",
                ));
            }
        }
        Ok(())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let properties: Self = from_json_file(path.as_ref())?;
        properties.validate()?;
        Ok(properties)
    }

    /// Native view of these properties. `created_by` has to outlive every
    /// use of the returned options.
    pub(crate) fn to_native(&self, created_by: Option<&CStr>) -> WriterOptions {
        WriterOptions {
            compression: match self.compression {
                Compression::Uncompressed => COMPRESSION_UNCOMPRESSED,
                Compression::Snappy => COMPRESSION_SNAPPY,
            },
            dictionary_enabled: self.dictionary_enabled,
            data_page_size_limit: self.data_page_size_limit.unwrap_or(0),
            max_row_group_size: self.max_row_group_size.unwrap_or(0),
            created_by: created_by.map_or(ptr::null(), CStr::as_ptr),
        }
    }
}
