use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::store::StoreError;
use crate::value::Row;

/// Engine settings. Fixed once a [`crate::Resolver`] is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Most key values a Filter chain may carry from one step to the next.
    pub filter_key_limit: usize,
    /// Defaults merged into every leaf's parameters when the caller omits them.
    pub global_params: Row,
    /// Separator of nested output field names (`user.name`).
    pub nested_separator: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filter_key_limit: 5000,
            global_params: Row::new(),
            nested_separator: ".".to_string(),
        }
    }
}

impl Config {
    /// Read a JSON config file; absent fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}
