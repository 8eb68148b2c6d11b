//! Compiled-artifact store: where leaf interfaces, compiled SQL and
//! uncompiled JSON definitions come from.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::fragments::JsonDefinition;
use crate::interface::Interface;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("leaf '{0}' not found")]
    NotFound(String),

    #[error("leaf id '{0}' does not name a path inside the store")]
    InvalidLeaf(String),

    #[error("io error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid artifact '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of leaf artifacts.
///
/// The compiled path (`load_interface` + `load_compiled_sql`) is tried first;
/// `load_json_definition` serves leaves that have not been compiled.
pub trait ArtifactStore {
    fn load_interface(&self, leaf: &str) -> Result<Interface, StoreError>;

    fn load_compiled_sql(&self, leaf: &str) -> Result<String, StoreError>;

    fn load_json_definition(&self, leaf: &str) -> Result<JsonDefinition, StoreError>;
}

/// Artifacts laid out in a directory:
///
/// ```text
/// <root>/<leaf>.interface.json
/// <root>/<leaf>.sql
/// <root>/<leaf>.json
/// ```
///
/// Leaf ids containing `/` map to sub-directories.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Artifact path of `leaf`. Ids whose path would leave `root` (absolute,
    /// `..`, `.` or prefix components) are refused.
    fn path(&self, leaf: &str, suffix: &str) -> Result<PathBuf, StoreError> {
        let relative = PathBuf::from(format!("{}{}", leaf, suffix));
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(StoreError::InvalidLeaf(leaf.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn read(&self, leaf: &str, suffix: &str) -> Result<(PathBuf, String), StoreError> {
        let path = self.path(leaf, suffix)?;
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok((path, text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(leaf.to_string())),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

impl ArtifactStore for FileStore {
    fn load_interface(&self, leaf: &str) -> Result<Interface, StoreError> {
        let (path, text) = self.read(leaf, ".interface.json")?;
        serde_json::from_str(&text).map_err(|source| StoreError::Json { path, source })
    }

    fn load_compiled_sql(&self, leaf: &str) -> Result<String, StoreError> {
        self.read(leaf, ".sql").map(|(_, sql)| sql)
    }

    fn load_json_definition(&self, leaf: &str) -> Result<JsonDefinition, StoreError> {
        let (path, text) = self.read(leaf, ".json")?;
        serde_json::from_str(&text).map_err(|source| StoreError::Json { path, source })
    }
}

/// In-memory artifacts, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    compiled: HashMap<String, (Interface, String)>,
    definitions: HashMap<String, JsonDefinition>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled leaf.
    pub fn compiled(mut self, leaf: &str, interface: Interface, sql: &str) -> Self {
        self.compiled
            .insert(leaf.to_string(), (interface, sql.to_string()));
        self
    }

    /// Register an uncompiled JSON leaf.
    pub fn definition(mut self, leaf: &str, definition: JsonDefinition) -> Self {
        self.definitions.insert(leaf.to_string(), definition);
        self
    }
}

impl ArtifactStore for MemoryStore {
    fn load_interface(&self, leaf: &str) -> Result<Interface, StoreError> {
        self.compiled
            .get(leaf)
            .map(|(interface, _)| interface.clone())
            .ok_or_else(|| StoreError::NotFound(leaf.to_string()))
    }

    fn load_compiled_sql(&self, leaf: &str) -> Result<String, StoreError> {
        self.compiled
            .get(leaf)
            .map(|(_, sql)| sql.clone())
            .ok_or_else(|| StoreError::NotFound(leaf.to_string()))
    }

    fn load_json_definition(&self, leaf: &str) -> Result<JsonDefinition, StoreError> {
        self.definitions
            .get(leaf)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(leaf.to_string()))
    }
}
