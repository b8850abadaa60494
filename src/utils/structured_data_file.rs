//! Structured data files
//!
//! Loads JSON or YAML documents from disk into a mutex-guarded cache keyed by
//! absolute path. Lookups lean on this to serve values out of auxiliary files
//! without re-reading them per event.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

use crate::error::{Result, WishboneError};

/// Which syntaxes a file is allowed to be in.
#[derive(Debug, Clone, Copy)]
pub struct Expect {
    pub json: bool,
    pub yaml: bool,
}

impl Default for Expect {
    fn default() -> Self {
        Self {
            json: true,
            yaml: true,
        }
    }
}

/// Loads and caches structured data from disk.
pub struct StructuredDataFile {
    expect: Expect,
    content: Mutex<HashMap<PathBuf, Value>>,
}

impl Default for StructuredDataFile {
    fn default() -> Self {
        Self::new(Expect::default())
    }
}

impl StructuredDataFile {
    pub fn new(expect: Expect) -> Self {
        Self {
            expect,
            content: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the content of `path`, loading it on first access.
    pub fn get(&self, path: &Path) -> Result<Value> {
        let path = canonical(path)?;
        let mut content = self.content.lock().expect("content lock");
        if let Some(value) = content.get(&path) {
            return Ok(value.clone());
        }
        let value = self.read_file(&path)?;
        content.insert(path, value.clone());
        Ok(value)
    }

    /// (Re)loads `path` into the cache.
    pub fn load(&self, path: &Path) -> Result<Value> {
        let path = canonical(path)?;
        let value = self.read_file(&path)?;
        self.content
            .lock()
            .expect("content lock")
            .insert(path, value.clone());
        Ok(value)
    }

    /// Evicts the file content from the cache. Unknown paths are a no-op.
    pub fn delete(&self, path: &Path) {
        if let Ok(path) = canonical(path) {
            self.content.lock().expect("content lock").remove(&path);
        }
    }

    /// The complete cache, keyed by absolute path.
    pub fn dump(&self) -> HashMap<PathBuf, Value> {
        self.content.lock().expect("content lock").clone()
    }

    fn read_file(&self, path: &Path) -> Result<Value> {
        let metadata = fs::metadata(path).map_err(|_| {
            WishboneError::InvalidData(format!(
                "file '{}' does not exist or is not accessible",
                path.display()
            ))
        })?;
        if !metadata.is_file() {
            return Err(WishboneError::InvalidData(format!(
                "'{}' does not appear to be a regular file",
                path.display()
            )));
        }
        let raw = fs::read_to_string(path)?;

        let mut errors = Vec::new();
        if self.expect.json {
            match serde_json::from_str(&raw) {
                Ok(value) => return Ok(value),
                Err(err) => errors.push(format!("JSON: {err}")),
            }
        }
        if self.expect.yaml {
            match serde_yaml::from_str(&raw) {
                Ok(value) => return Ok(value),
                Err(err) => errors.push(format!("YAML: {err}")),
            }
        }
        Err(WishboneError::InvalidData(format!(
            "could not load file '{}': {}",
            path.display(),
            errors.join(", ")
        )))
    }
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|_| {
        WishboneError::InvalidData(format!(
            "file '{}' does not exist or is not accessible",
            path.display()
        ))
    })
}
