//! Serves values out of a structured data file on disk.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, WishboneError};
use crate::utils::StructuredDataFile;

use super::Lookup;

/// Resolves a dotted key inside a JSON or YAML document. The document is
/// cached after the first read.
pub struct FileLookup {
    loader: StructuredDataFile,
    path: PathBuf,
    key: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FileArgs {
    path: PathBuf,
    #[serde(default)]
    key: String,
}

impl FileLookup {
    pub fn from_arguments(arguments: Value) -> Result<Arc<dyn Lookup>> {
        let args: FileArgs = serde_json::from_value(arguments)
            .map_err(|err| WishboneError::InvalidData(format!("file lookup arguments: {err}")))?;
        let lookup = Self {
            loader: StructuredDataFile::default(),
            path: args.path,
            key: args.key,
        };
        // Surface unreadable files at configuration time, not mid-pipeline.
        lookup.loader.get(&lookup.path)?;
        Ok(Arc::new(lookup))
    }
}

impl Lookup for FileLookup {
    fn lookup(&self) -> Value {
        let Ok(document) = self.loader.get(&self.path) else {
            return Value::Null;
        };
        if self.key.is_empty() {
            return document;
        }
        let mut cursor = &document;
        for segment in self.key.split('.') {
            match cursor.as_object().and_then(|map| map.get(segment)) {
                Some(value) => cursor = value,
                None => return Value::Null,
            }
        }
        cursor.clone()
    }
}
