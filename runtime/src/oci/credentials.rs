//! Per-registry credentials at `~/.a3s/auth/credentials.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use a3s_refs_core::error::{RefsError, Result};
use serde::{Deserialize, Serialize};

/// Username and password for one registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    registries: BTreeMap<String, Credential>,
}

/// JSON-file credential store. Writes go through a temp file and a rename.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn default_path() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            RefsError::ConfigError("Cannot determine home directory for credential store".to_string())
        })?;
        Ok(Self::new(home.join(".a3s").join("auth").join("credentials.json")))
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store credentials for a registry, replacing any existing entry.
    pub fn store(&self, registry: &str, credential: Credential) -> Result<()> {
        let mut file = self.load()?;
        file.registries.insert(normalize_registry(registry), credential);
        self.save(&file)
    }

    pub fn get(&self, registry: &str) -> Result<Option<Credential>> {
        Ok(self.load()?.registries.remove(&normalize_registry(registry)))
    }

    /// Remove credentials for a registry. Returns whether an entry existed.
    pub fn remove(&self, registry: &str) -> Result<bool> {
        let mut file = self.load()?;
        if file.registries.remove(&normalize_registry(registry)).is_none() {
            return Ok(false);
        }
        self.save(&file)?;
        Ok(true)
    }

    fn load(&self) -> Result<CredentialFile> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CredentialFile::default())
            }
            Err(e) => {
                return Err(RefsError::ConfigError(format!(
                    "Failed to read credential store {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        serde_json::from_str(&data).map_err(|e| {
            RefsError::ConfigError(format!(
                "Failed to parse credential store {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn save(&self, file: &CredentialFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, serde_json::to_string_pretty(file)?)?;
        std::fs::rename(&tmp_path, &self.path)?;
        tracing::debug!(path = %self.path.display(), "Saved credential store");
        Ok(())
    }
}

/// Docker Hub goes by several hostnames; store them under one key.
fn normalize_registry(registry: &str) -> String {
    let r = registry.trim().to_lowercase();
    match r.as_str() {
        "docker.io" | "registry-1.docker.io" => "index.docker.io".to_string(),
        _ => r,
    }
}
