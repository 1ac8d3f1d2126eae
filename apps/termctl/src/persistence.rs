//! Tabs/profile association document, described as field tables and
//! processed by one generic encoder/decoder over `serde_json::Value`.
//!
//! ```json
//! { "tabs": [ { "profile": "{61c54bbd-c2c6-5271-96e7-009a87ff44bf}" } ] }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("field '{field}' must be {expected}")]
    TypeMismatch { field: String, expected: &'static str },
}

impl PersistenceError {
    fn mismatch(field: impl Into<String>, expected: &'static str) -> Self {
        PersistenceError::TypeMismatch {
            field: field.into(),
            expected,
        }
    }

    /// Prefixes the failing field path with its parent.
    fn within(self, parent: &str) -> Self {
        match self {
            PersistenceError::TypeMismatch { field, expected } => PersistenceError::TypeMismatch {
                field: if field.is_empty() {
                    parent.to_string()
                } else if field.starts_with('[') {
                    format!("{parent}{field}")
                } else {
                    format!("{parent}.{field}")
                },
                expected,
            },
            other => other,
        }
    }
}

/// One row of a model's schema: JSON key, reader, writer.
pub struct Field<M> {
    pub name: &'static str,
    pub read: fn(&M) -> Value,
    pub write: fn(&mut M, &Value) -> Result<(), PersistenceError>,
}

/// A struct persisted through a field table. Keys absent from the document
/// keep the value from `Default`.
pub trait JsonModel: Default + Sized + 'static {
    const FIELDS: &'static [Field<Self>];
}

pub fn encode<M: JsonModel>(model: &M) -> Value {
    let mut object = Map::new();
    for field in M::FIELDS {
        object.insert(field.name.to_string(), (field.read)(model));
    }
    Value::Object(object)
}

pub fn decode<M: JsonModel>(value: &Value) -> Result<M, PersistenceError> {
    let object = value
        .as_object()
        .ok_or_else(|| PersistenceError::mismatch("", "an object"))?;
    let mut model = M::default();
    for field in M::FIELDS {
        match object.get(field.name) {
            None | Some(Value::Null) => {}
            Some(raw) => (field.write)(&mut model, raw).map_err(|err| err.within(field.name))?,
        }
    }
    Ok(model)
}

fn read_string(value: &Value) -> Result<String, PersistenceError> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| PersistenceError::mismatch("", "a string"))
}

fn read_list<M: JsonModel>(value: &Value) -> Result<Vec<M>, PersistenceError> {
    let items = value
        .as_array()
        .ok_or_else(|| PersistenceError::mismatch("", "an array"))?;
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| decode::<M>(item).map_err(|err| err.within(&format!("[{idx}]"))))
        .collect()
}

fn write_list<M: JsonModel>(items: &[M]) -> Value {
    Value::Array(items.iter().map(encode).collect())
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersistedTab {
    /// Profile identifier the tab was opened with.
    pub profile: String,
}

impl JsonModel for PersistedTab {
    const FIELDS: &'static [Field<Self>] = &[Field {
        name: "profile",
        read: |tab| Value::String(tab.profile.clone()),
        write: |tab, value| {
            tab.profile = read_string(value)?;
            Ok(())
        },
    }];
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersistedState {
    pub tabs: Vec<PersistedTab>,
}

impl JsonModel for PersistedState {
    const FIELDS: &'static [Field<Self>] = &[Field {
        name: "tabs",
        read: |state| write_list(&state.tabs),
        write: |state, value| {
            state.tabs = read_list(value)?;
            Ok(())
        },
    }];
}

impl PersistedState {
    pub fn from_json_str(raw: &str) -> Result<Self, PersistenceError> {
        let value: Value = serde_json::from_str(raw)?;
        decode(&value)
    }

    pub fn to_json_string(&self) -> Result<String, PersistenceError> {
        Ok(serde_json::to_string_pretty(&encode(self))?)
    }

    /// A missing file is an empty state.
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(target = "persistence", path = %path.display(), "no saved state");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_json_str(&raw).inspect_err(|err| {
            warn!(target = "persistence", path = %path.display(), error = %err, "saved state rejected");
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let io_err = |source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, self.to_json_string()?).map_err(io_err)?;
        debug!(target = "persistence", path = %path.display(), tabs = self.tabs.len(), "state saved");
        Ok(())
    }
}
