//! Configuration for flowmesh actors.
//!
//! Loaded from TOML with per-field defaults, then optionally overridden from
//! `FLOWMESH_*` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::{Result, ResultExt};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Deferred store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Engine and controller settings.
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Deferred store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Keep values produced by a loader after their ticket settles.
    #[serde(default = "default_retain_resolved")]
    pub retain_resolved: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retain_resolved: default_retain_resolved(),
        }
    }
}

/// Engine and controller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Timeout applied by `EngineClient` to every request. `None` waits forever.
    #[serde(with = "optional_duration_secs", default, rename = "request_timeout_secs")]
    pub request_timeout: Option<Duration>,

    /// Timeout for the requirement lookup a controller performs on assignment.
    #[serde(
        with = "duration_secs",
        default = "default_negotiation_timeout",
        rename = "negotiation_timeout_secs"
    )]
    pub negotiation_timeout: Duration,

    /// Number of informs a controller keeps in its history.
    #[serde(default = "default_inform_history")]
    pub inform_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            negotiation_timeout: default_negotiation_timeout(),
            inform_history: default_inform_history(),
        }
    }
}

impl EngineConfig {
    /// Set the request timeout.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the inform history size.
    #[must_use]
    pub const fn inform_history(mut self, size: usize) -> Self {
        self.inform_history = size;
        self
    }
}

impl FlowConfig {
    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlParseFailed` on malformed input.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::toml_parse_failed(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileReadFailed` if the file cannot be read and
    /// `Error::TomlParseFailed` if it cannot be parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        Self::from_toml_str(&text)
    }

    /// Load `path`, falling back to defaults when it is missing or malformed.
    pub fn from_file_or_default(path: impl AsRef<Path>) -> Self {
        Self::from_file(path).or_default_logged(Self::default())
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `FLOWMESH_*` environment overrides. Unparsable values are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(retain) = env_parse::<bool>("FLOWMESH_STORE_RETAIN_RESOLVED") {
            self.store.retain_resolved = retain;
        }

        if let Some(secs) = env_parse::<u64>("FLOWMESH_ENGINE_REQUEST_TIMEOUT_SECS") {
            self.engine.request_timeout = Some(Duration::from_secs(secs));
        }

        if let Some(secs) = env_parse::<u64>("FLOWMESH_ENGINE_NEGOTIATION_TIMEOUT_SECS") {
            self.engine.negotiation_timeout = Duration::from_secs(secs);
        }

        if let Some(size) = env_parse::<usize>("FLOWMESH_ENGINE_INFORM_HISTORY") {
            self.engine.inform_history = size;
        }

        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name)
        .ok()
        .and_then(|raw| parse_override(name, &raw))
}

fn parse_override<T: std::str::FromStr>(name: &str, raw: &str) -> Option<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::toml_parse_failed(format!("override {name}={raw}")))
        .into_option_logged()
}

const fn default_retain_resolved() -> bool {
    true
}

const fn default_negotiation_timeout() -> Duration {
    Duration::from_secs(5)
}

const fn default_inform_history() -> usize {
    256
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod optional_duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        duration.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|secs| secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = FlowConfig::default();
        assert!(config.store.retain_resolved);
        assert_eq!(config.engine.request_timeout, None);
        assert_eq!(config.engine.negotiation_timeout, Duration::from_secs(5));
        assert_eq!(config.engine.inform_history, 256);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = FlowConfig::from_toml_str(
            r"
            [store]
            retain_resolved = false

            [engine]
            request_timeout_secs = 30
            ",
        )
        .unwrap();

        assert!(!config.store.retain_resolved);
        assert_eq!(config.engine.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.engine.inform_history, 256);
    }

    #[test]
    fn test_malformed_toml_is_reported() {
        let err = FlowConfig::from_toml_str("[store\nretain_resolved = ").unwrap_err();
        assert!(matches!(err, Error::TomlParseFailed { .. }));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\ninform_history = 8").unwrap();
        let config = FlowConfig::from_file(file.path()).unwrap();
        assert_eq!(config.engine.inform_history, 8);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = FlowConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, Error::FileReadFailed { .. }));
    }

    #[test]
    fn test_unreadable_file_falls_back_to_defaults() {
        let config = FlowConfig::from_file_or_default("/definitely/not/here.toml");
        assert_eq!(config, FlowConfig::default());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\ninform_history = 8").unwrap();
        let config = FlowConfig::from_file_or_default(file.path());
        assert_eq!(config.engine.inform_history, 8);
    }

    #[test]
    fn test_override_values_are_trimmed_and_parsed() {
        assert_eq!(parse_override::<u64>("SECS", " 30 "), Some(30));
        assert_eq!(parse_override::<bool>("RETAIN", "false"), Some(false));
    }

    #[test]
    fn test_unparsable_override_is_ignored() {
        assert_eq!(parse_override::<u64>("SECS", "soon"), None);
        assert_eq!(parse_override::<usize>("HISTORY", "-1"), None);
    }

    #[test]
    fn test_builder_setters() {
        let config = EngineConfig::default()
            .request_timeout(Duration::from_secs(2))
            .inform_history(4);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.inform_history, 4);
    }
}
