//! Application settings visible to the workflow host.
//!
//! Settings come from a `local.settings.json`-style file (`{"Values": {...}}`),
//! then per-test overrides are applied on top, then the harness injects the
//! mock server address. Hosts read them by name and may expand
//! `@{appsetting('Name')}` placeholders in strings.

use crate::error::{MockworkError, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::LazyLock;

/// Setting the harness injects with the mock server base URL.
pub const MOCK_SERVER_BASE_URL: &str = "MockServer-BaseUrl";

/// Matches `@{appsetting('Name')}`, capturing `Name`.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@\{appsetting\('([^']+)'\)\}")
        .unwrap_or_else(|_| panic!("Static regex 'PLACEHOLDER' failed to compile"))
});

#[derive(Debug, Deserialize)]
struct SettingsFile {
    #[serde(rename = "Values", default)]
    values: BTreeMap<String, serde_json::Value>,
}

/// Resolved name → value settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    /// Create empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a JSON file with a top-level `Values` object.
    ///
    /// Non-string values are stored in their JSON text form.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| MockworkError::SettingsFile {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;
        let file: SettingsFile =
            serde_json::from_str(&raw).map_err(|e| MockworkError::SettingsFile {
                path: path.to_path_buf(),
                cause: e.to_string(),
            })?;

        let values = file
            .values
            .into_iter()
            .map(|(key, value)| {
                let text = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, text)
            })
            .collect();
        Ok(Self { values })
    }

    /// Add or replace one value.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Apply per-test overrides. Overridden keys are logged.
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, String>) {
        for (key, value) in overrides {
            let previous = self.values.insert(key.clone(), value.clone());
            tracing::debug!(
                key = %key,
                replaced = previous.is_some(),
                "Applied setting override"
            );
        }
    }

    /// Get a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Get a value that must be present.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| MockworkError::ConfigValue {
            key: key.to_string(),
            cause: "setting is not defined".to_string(),
        })
    }

    /// Replace every `@{appsetting('Name')}` placeholder in `text`.
    pub fn expand(&self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&text[last..whole.start()]);
            out.push_str(self.require(name.as_str())?);
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    /// All values, ordered by name.
    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}
