use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("settings store {path}: {message}")]
pub struct SettingsError {
    pub path: PathBuf,
    pub message: String,
}

/// Namespaced integer key/value persistence. A key that was never set reads as
/// 0, so callers cannot tell "absent" from a stored zero.
pub trait SettingsStore {
    fn set_int(&mut self, key: &str, value: i64) -> Result<(), SettingsError>;
    fn get_int(&self, key: &str) -> Result<i64, SettingsError>;
    fn unset(&mut self, key: &str) -> Result<(), SettingsError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: BTreeMap<String, i64>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SettingsStore for MemorySettings {
    fn set_int(&mut self, key: &str, value: i64) -> Result<(), SettingsError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn get_int(&self, key: &str) -> Result<i64, SettingsError> {
        Ok(self.values.get(key).copied().unwrap_or(0))
    }

    fn unset(&mut self, key: &str) -> Result<(), SettingsError> {
        self.values.remove(key);
        Ok(())
    }
}

/// Settings kept in a flat JSON object of integers, re-read on every call.
#[derive(Debug, Clone)]
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn error(&self, message: impl Into<String>) -> SettingsError {
        SettingsError {
            path: self.path.clone(),
            message: message.into(),
        }
    }

    fn load(&self) -> Result<BTreeMap<String, i64>, SettingsError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(self.error(format!("unable to read: {err}"))),
        };
        serde_json::from_str(&content).map_err(|err| {
            self.error(format!(
                "invalid JSON at line {}, column {}: {err}",
                err.line(),
                err.column()
            ))
        })
    }

    fn save(&self, values: &BTreeMap<String, i64>) -> Result<(), SettingsError> {
        let text = serde_json::to_string_pretty(values)
            .map_err(|err| self.error(format!("unable to encode: {err}")))?;
        fs::write(&self.path, format!("{text}\n"))
            .map_err(|err| self.error(format!("unable to write: {err}")))
    }
}

impl SettingsStore for FileSettings {
    fn set_int(&mut self, key: &str, value: i64) -> Result<(), SettingsError> {
        let mut values = self.load()?;
        values.insert(key.to_string(), value);
        self.save(&values)
    }

    fn get_int(&self, key: &str) -> Result<i64, SettingsError> {
        Ok(self.load()?.get(key).copied().unwrap_or(0))
    }

    fn unset(&mut self, key: &str) -> Result<(), SettingsError> {
        let mut values = self.load()?;
        if values.remove(key).is_some() {
            self.save(&values)?;
        }
        Ok(())
    }
}
