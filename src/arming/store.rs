use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

pub const ARMED_KEY: &str = "notifications_armed";
pub const RESET_AT_KEY: &str = "notifications_reset_at";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Flat key/value persistence for the arming flags.
pub trait StateStore {
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn set_bool(&mut self, key: &str, value: bool) -> Result<(), StoreError>;
    fn get_number(&self, key: &str) -> Option<i64>;
    fn set_number(&mut self, key: &str, value: i64) -> Result<(), StoreError>;
}

/// In-memory store for tests.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    bools: BTreeMap<String, bool>,
    numbers: BTreeMap<String, i64>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl StateStore for MemoryStore {
    fn get_bool(&self, key: &str) -> Option<bool> {
        self.bools.get(key).copied()
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<(), StoreError> {
        self.bools.insert(key.to_string(), value);
        Ok(())
    }

    fn get_number(&self, key: &str) -> Option<i64> {
        self.numbers.get(key).copied()
    }

    fn set_number(&mut self, key: &str, value: i64) -> Result<(), StoreError> {
        self.numbers.insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    #[serde(default)]
    values: BTreeMap<String, Value>,
}

/// JSON file store, rewritten on every change.
#[derive(Debug)]
pub struct JsonStateStore {
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl JsonStateStore {
    /// Opens `path`. A missing file starts empty; an unreadable or malformed one is
    /// logged and also starts empty, which reads back as disarmed.
    pub fn open(path: &Path) -> Result<Self> {
        let values = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("unable to read state file {}", path.display()))?;
            parse_state_text(&content).unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "ignoring malformed state file");
                BTreeMap::new()
            })
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), StoreError> {
        let payload = StateFile {
            version: 1,
            values: self.values.clone(),
        };
        let text = serde_json::to_string_pretty(&payload)?;
        fs::write(&self.path, format!("{text}\n")).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

fn parse_state_text(content: &str) -> Result<BTreeMap<String, Value>> {
    let raw = serde_json::from_str::<StateFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;
    if raw.version != 1 {
        anyhow::bail!(
            "unsupported state file version {}; expected version 1",
            raw.version
        );
    }
    Ok(raw.values)
}

impl StateStore for JsonStateStore {
    fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), Value::Bool(value));
        self.save()
    }

    fn get_number(&self, key: &str) -> Option<i64> {
        let value = self.values.get(key)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|secs| secs.floor() as i64))
    }

    fn set_number(&mut self, key: &str, value: i64) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), Value::Number(value.into()));
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempdir().expect("tempdir");
        let store = JsonStateStore::open(&dir.path().join("state.json")).expect("open");
        assert_eq!(store.get_bool(ARMED_KEY), None);
        assert_eq!(store.get_number(RESET_AT_KEY), None);
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        let mut store = JsonStateStore::open(&path).expect("open");
        store.set_bool(ARMED_KEY, true).expect("set bool");
        store.set_number(RESET_AT_KEY, 1_793_430_000).expect("set number");

        let reopened = JsonStateStore::open(&path).expect("reopen");
        assert_eq!(reopened.get_bool(ARMED_KEY), Some(true));
        assert_eq!(reopened.get_number(RESET_AT_KEY), Some(1_793_430_000));

        let text = fs::read_to_string(&path).expect("read");
        assert!(text.contains("\"version\": 1"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn malformed_file_reads_as_empty() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not-json ").expect("write");
        let store = JsonStateStore::open(&path).expect("open");
        assert_eq!(store.get_bool(ARMED_KEY), None);
    }

    #[test]
    fn fractional_epoch_is_floored() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        fs::write(
            &path,
            r#"{"version":1,"values":{"notifications_reset_at":1793430000.75}}"#,
        )
        .expect("write");
        let store = JsonStateStore::open(&path).expect("open");
        assert_eq!(store.get_number(RESET_AT_KEY), Some(1_793_430_000));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let err = parse_state_text(r#"{"version":2,"values":{}}"#).expect_err("version");
        assert!(err.to_string().contains("unsupported state file version"));
    }

    #[test]
    fn wrong_type_reads_as_missing() {
        let values = parse_state_text(r#"{"version":1,"values":{"notifications_armed":"yes"}}"#)
            .expect("parse");
        assert_eq!(values.get(ARMED_KEY).and_then(Value::as_bool), None);
    }

    #[test]
    fn unwritable_path_reports_store_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("missing-dir").join("state.json");
        let mut store = JsonStateStore::open(&path).expect("open");
        let err = store.set_bool(ARMED_KEY, true).expect_err("write should fail");
        assert!(matches!(err, StoreError::Write { .. }));
    }
}
