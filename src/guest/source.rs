//! Grouped key/value lookup over a guest configuration file.

use crate::error::{Error, Result};
use std::path::Path;
use std::str::FromStr;
use toml::{Table, Value};

/// Grouped key lookup.
///
/// Values are always handed out as text; typed access goes through
/// [`require`] and [`require_parsed`].
pub trait KeySource {
    /// Value of `key` in `group`, if present.
    fn get(&self, group: &str, key: &str) -> Option<String>;

    /// Keys of `group` in file order. Empty if the group is absent.
    fn keys(&self, group: &str) -> Vec<String>;

    /// Whether the group exists at all.
    fn has_group(&self, group: &str) -> bool;
}

/// Guest configuration stored as a TOML document.
///
/// Groups are top-level tables whose values are strings or scalars.
#[derive(Debug, Clone, Default)]
pub struct TomlSource {
    table: Table,
}

impl TomlSource {
    /// Parse a document from text.
    pub fn parse(text: &str) -> Result<Self> {
        let table = text
            .parse::<Table>()
            .map_err(|e| Error::ConfigLoad(e.to_string()))?;
        Ok(Self { table })
    }

    /// Load and parse a document from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigLoad(format!("{}: {}", path.display(), e)))?;
        Self::parse(&text).map_err(|e| match e {
            Error::ConfigLoad(msg) => Error::ConfigLoad(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    fn group(&self, group: &str) -> Option<&Table> {
        self.table.get(group).and_then(Value::as_table)
    }
}

impl KeySource for TomlSource {
    fn get(&self, group: &str, key: &str) -> Option<String> {
        match self.group(group)?.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn keys(&self, group: &str) -> Vec<String> {
        self.group(group)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn has_group(&self, group: &str) -> bool {
        self.group(group).is_some()
    }
}

/// Fetch a required, non-empty value.
pub fn require(src: &dyn KeySource, group: &str, key: &str) -> Result<String> {
    match src.get(group, key) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(Error::missing_key(group, key)),
    }
}

/// Fetch a required value and parse it.
pub fn require_parsed<T>(src: &dyn KeySource, group: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = require(src, group, key)?;
    raw.parse::<T>()
        .map_err(|e| Error::invalid_value(group, key, raw.clone(), e.to_string()))
}
