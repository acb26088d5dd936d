use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RefsError, Result};

/// Refs configuration.
///
/// Loaded once by the CLI and passed by reference into every engine
/// operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefsConfig {
    /// Annotation keys used to encode attachment edges
    pub annotations: ReferenceAnnotationKeys,

    /// Registries reached over plain HTTP (e.g. "localhost:5000")
    pub insecure_registries: Vec<String>,

    /// Per-call registry timeout in seconds
    pub timeout_secs: u64,

    /// Log level used when `RUST_LOG` is not set
    pub log_level: LogLevel,
}

impl Default for RefsConfig {
    fn default() -> Self {
        Self {
            annotations: ReferenceAnnotationKeys::default(),
            insecure_registries: Vec::new(),
            timeout_secs: 60,
            log_level: LogLevel::Warn,
        }
    }
}

impl RefsConfig {
    /// Default config location (`~/.a3s/refs.yaml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".a3s").join("refs.yaml"))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `~/.a3s/refs.yaml` is
    /// read when present and defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Parse a YAML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            RefsError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: RefsConfig = serde_yaml::from_str(&data)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Reject configurations the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let keys = &self.annotations;
        for (name, value) in [
            ("reference_type", &keys.reference_type),
            ("reference_digest", &keys.reference_digest),
            ("reference_description", &keys.reference_description),
            ("artifact_type", &keys.artifact_type),
        ] {
            if value.trim().is_empty() {
                return Err(RefsError::ConfigError(format!(
                    "annotation key '{}' must not be empty",
                    name
                )));
            }
        }
        if keys.reference_type == keys.reference_digest
            || keys.reference_type == keys.reference_description
            || keys.reference_digest == keys.reference_description
        {
            return Err(RefsError::ConfigError(
                "reference annotation keys must be distinct".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(RefsError::ConfigError(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Registry call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Annotation keys for the reference triple and the artifact type.
///
/// The namespace is not ratified anywhere yet, so the keys are
/// configuration rather than literals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceAnnotationKeys {
    pub reference_type: String,
    pub reference_digest: String,
    pub reference_description: String,
    /// Top-level manifest annotation naming the artifact type
    pub artifact_type: String,
}

impl Default for ReferenceAnnotationKeys {
    fn default() -> Self {
        Self {
            reference_type: "org.opencontainers.reference.type".to_string(),
            reference_digest: "org.opencontainers.reference.digest".to_string(),
            reference_description: "org.opencontainers.reference.description".to_string(),
            artifact_type: "org.opencontainers.artifact.type".to_string(),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = RefsConfig::default();
        assert_eq!(
            config.annotations.reference_digest,
            "org.opencontainers.reference.digest"
        );
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert!(config.insecure_registries.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("refs.yaml");
        std::fs::write(
            &path,
            "insecure_registries:\n  - localhost:5000\nannotations:\n  reference_type: dev.a3s.reference.type\n",
        )
        .unwrap();

        let config = RefsConfig::from_file(&path).unwrap();
        assert_eq!(config.insecure_registries, vec!["localhost:5000"]);
        assert_eq!(config.annotations.reference_type, "dev.a3s.reference.type");
        assert_eq!(
            config.annotations.reference_description,
            "org.opencontainers.reference.description"
        );
        assert_eq!(config.timeout_secs, 60);
    }

    #[test]
    fn test_log_level_parsing() {
        let config: RefsConfig = serde_yaml::from_str("log_level: debug").unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.log_level.as_filter(), "debug");
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let dir = TempDir::new().unwrap();
        let result = RefsConfig::load(Some(&dir.path().join("missing.yaml")));
        assert!(matches!(result, Err(RefsError::ConfigError(_))));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let mut config = RefsConfig::default();
        config.annotations.reference_type = config.annotations.reference_digest.clone();
        assert!(matches!(config.validate(), Err(RefsError::ConfigError(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = RefsConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
