//! Explorer and backend configuration
//!
//! All sections deserialize from TOML with every field optional:
//!
//! ```toml
//! [explorer]
//! journal_capacity = 128
//! expand_new_containers = true
//!
//! [backend]
//! latency_ms = 400
//! jitter_ms = 200
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Explorer behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Terminal operations kept in the journal
    pub journal_capacity: usize,
    /// Open a newly created container in the view
    pub expand_new_containers: bool,
    /// Abandon an in-flight load when its container is collapsed
    pub abandon_on_collapse: bool,
}

impl ExplorerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With journal capacity
    #[inline]
    #[must_use]
    pub fn with_journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity;
        self
    }

    /// With auto-expansion of created containers
    #[inline]
    #[must_use]
    pub fn with_expand_new_containers(mut self, enabled: bool) -> Self {
        self.expand_new_containers = enabled;
        self
    }

    /// With abandon-on-collapse
    #[inline]
    #[must_use]
    pub fn with_abandon_on_collapse(mut self, enabled: bool) -> Self {
        self.abandon_on_collapse = enabled;
        self
    }
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            journal_capacity: 64,
            expand_new_containers: true,
            abandon_on_collapse: false,
        }
    }
}

/// In-memory collaborator behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryBackendConfig {
    /// Base artificial latency per request in milliseconds
    pub latency_ms: u64,
    /// Random extra latency, up to this many milliseconds
    pub jitter_ms: u64,
    /// Start with the demo project
    pub seed_demo: bool,
}

impl MemoryBackendConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// No artificial latency
    #[inline]
    #[must_use]
    pub fn instant() -> Self {
        Self::default().with_latency(0, 0)
    }

    /// With latency
    #[inline]
    #[must_use]
    pub fn with_latency(mut self, latency_ms: u64, jitter_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self.jitter_ms = jitter_ms;
        self
    }

    /// With or without demo data
    #[inline]
    #[must_use]
    pub fn with_seed_demo(mut self, seed: bool) -> Self {
        self.seed_demo = seed;
        self
    }

    /// Latency for one request given a random sample
    #[must_use]
    pub fn latency(&self, sample: u64) -> Duration {
        let jitter = match self.jitter_ms.checked_add(1) {
            Some(span) => sample % span,
            None => sample,
        };
        Duration::from_millis(self.latency_ms.saturating_add(jitter))
    }
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        Self {
            latency_ms: 400,
            jitter_ms: 200,
            seed_demo: true,
        }
    }
}

/// Upper bound for `latency_ms` and `jitter_ms`
pub const MAX_LATENCY_MS: u64 = 60_000;

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NebulaConfig {
    /// Explorer section
    pub explorer: ExplorerConfig,
    /// Backend section
    pub backend: MemoryBackendConfig,
}

impl NebulaConfig {
    /// Parse from TOML text
    ///
    /// # Errors
    /// `Parse` on malformed TOML, `Invalid` on out-of-range values
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// `Io` if the file cannot be read, otherwise as [`NebulaConfig::from_toml_str`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `Invalid` naming the offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.explorer.journal_capacity == 0 {
            return Err(ConfigError::Invalid(
                "explorer.journal_capacity must be at least 1".to_string(),
            ));
        }
        for (field, value) in [
            ("backend.latency_ms", self.backend.latency_ms),
            ("backend.jitter_ms", self.backend.jitter_ms),
        ] {
            if value > MAX_LATENCY_MS {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be at most {MAX_LATENCY_MS}, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = NebulaConfig::from_toml_str("").unwrap();
        assert_eq!(config, NebulaConfig::default());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = NebulaConfig::from_toml_str(
            "[explorer]\njournal_capacity = 8\n\n[backend]\nlatency_ms = 0\n",
        )
        .unwrap();
        assert_eq!(config.explorer.journal_capacity, 8);
        assert!(config.explorer.expand_new_containers);
        assert_eq!(config.backend.latency_ms, 0);
        assert_eq!(config.backend.jitter_ms, 200);
    }

    #[test]
    fn zero_journal_is_rejected() {
        let err = NebulaConfig::from_toml_str("[explorer]\njournal_capacity = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = NebulaConfig::from_toml_str("[explorer\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn latency_is_bounded_by_jitter() {
        let config = MemoryBackendConfig::new().with_latency(400, 200);
        assert_eq!(config.latency(0), Duration::from_millis(400));
        assert!(config.latency(u64::MAX) <= Duration::from_millis(600));
        assert_eq!(MemoryBackendConfig::instant().latency(17), Duration::ZERO);

        let extreme = MemoryBackendConfig::new().with_latency(u64::MAX, u64::MAX);
        assert_eq!(extreme.latency(5), Duration::from_millis(u64::MAX));
        let wide = MemoryBackendConfig::new().with_latency(0, u64::MAX);
        assert_eq!(wide.latency(u64::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn oversized_latency_is_rejected() {
        let err = NebulaConfig::from_toml_str("[backend]\njitter_ms = 9223372036854775807\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("backend.jitter_ms")));

        let err = NebulaConfig::from_toml_str("[backend]\nlatency_ms = 60001\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let ok = NebulaConfig::from_toml_str("[backend]\nlatency_ms = 60000\njitter_ms = 60000\n");
        assert!(ok.is_ok());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = NebulaConfig::load("/nonexistent/nebula.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
