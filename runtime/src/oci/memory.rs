//! In-process registry gateway.
//!
//! Holds blobs and manifests by digest plus a tag table per repository.
//! Used to exercise the engine without a network.

use std::collections::HashMap;

use a3s_refs_core::error::{RefsError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::descriptor::Descriptor;
use super::digest::ContentHash;
use super::manifest::{ImageIndex, ImageManifest, Resolved};
use super::reference::ImageReference;
use super::registry::{check_digest_target, RegistryGateway};

#[derive(Debug, Default)]
struct Repository {
    blobs: HashMap<ContentHash, Bytes>,
    manifests: HashMap<ContentHash, Bytes>,
    tags: HashMap<String, ContentHash>,
}

/// Content-addressed registry kept in memory.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    repositories: RwLock<HashMap<String, Repository>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw manifest bytes as-is (no re-serialisation) and tag them.
    pub fn put_raw_manifest(&self, reference: &ImageReference, raw: impl Into<Bytes>) -> ContentHash {
        let raw = raw.into();
        let digest = ContentHash::sha256(&raw);
        let mut repos = self.repositories.write();
        let repo = repos.entry(reference.repository_name()).or_default();
        repo.manifests.insert(digest.clone(), raw);
        if let Some(ref tag) = reference.tag {
            repo.tags.insert(tag.clone(), digest.clone());
        }
        digest
    }

    pub fn blob(&self, repository: &ImageReference, digest: &ContentHash) -> Option<Bytes> {
        self.repositories
            .read()
            .get(&repository.repository_name())
            .and_then(|r| r.blobs.get(digest).cloned())
    }

    pub fn manifest_count(&self, repository: &ImageReference) -> usize {
        self.repositories
            .read()
            .get(&repository.repository_name())
            .map_or(0, |r| r.manifests.len())
    }

    pub fn tag(&self, reference: &ImageReference) -> Option<ContentHash> {
        let tag = reference.tag.as_ref()?;
        self.repositories
            .read()
            .get(&reference.repository_name())
            .and_then(|r| r.tags.get(tag).cloned())
    }

    fn put_manifest(&self, reference: &ImageReference, body: Vec<u8>, descriptor: &Descriptor) -> Result<()> {
        check_digest_target(reference, descriptor)?;
        let mut repos = self.repositories.write();
        let repo = repos.entry(reference.repository_name()).or_default();
        for layer_digest in referenced_blobs(&body)? {
            if !repo.blobs.contains_key(&layer_digest) && !repo.manifests.contains_key(&layer_digest) {
                return Err(RefsError::RegistryError {
                    registry: reference.registry.clone(),
                    message: format!("manifest references unknown content {}", layer_digest),
                });
            }
        }
        repo.manifests.insert(descriptor.digest.clone(), Bytes::from(body));
        if let Some(ref tag) = reference.tag {
            repo.tags.insert(tag.clone(), descriptor.digest.clone());
        }
        Ok(())
    }
}

/// Digests a manifest or index points at, which must already exist.
fn referenced_blobs(body: &[u8]) -> Result<Vec<ContentHash>> {
    #[derive(serde::Deserialize)]
    struct Refs {
        config: Option<Descriptor>,
        #[serde(default)]
        layers: Vec<Descriptor>,
        #[serde(default)]
        manifests: Vec<Descriptor>,
    }
    let refs: Refs = serde_json::from_slice(body)?;
    Ok(refs
        .config
        .into_iter()
        .chain(refs.layers)
        .chain(refs.manifests)
        .map(|d| d.digest)
        .collect())
}

#[async_trait]
impl RegistryGateway for MemoryRegistry {
    async fn resolve(&self, reference: &ImageReference) -> Result<Resolved> {
        let raw = {
            let repos = self.repositories.read();
            let repo = repos
                .get(&reference.repository_name())
                .ok_or_else(|| RefsError::NotFound(reference.to_string()))?;
            let digest = match (&reference.digest, &reference.tag) {
                (Some(digest), _) => Some(digest),
                (None, Some(tag)) => repo.tags.get(tag),
                (None, None) => None,
            };
            digest
                .and_then(|d| repo.manifests.get(d))
                .cloned()
                .ok_or_else(|| RefsError::NotFound(reference.to_string()))?
        };
        Resolved::from_raw(reference.clone(), raw)
    }

    async fn write_blob(&self, repository: &ImageReference, data: &[u8]) -> Result<ContentHash> {
        let digest = ContentHash::sha256(data);
        self.repositories
            .write()
            .entry(repository.repository_name())
            .or_default()
            .blobs
            .insert(digest.clone(), Bytes::copy_from_slice(data));
        Ok(digest)
    }

    async fn write_manifest(
        &self,
        reference: &ImageReference,
        manifest: &ImageManifest,
    ) -> Result<Descriptor> {
        let body = manifest.to_bytes()?;
        let descriptor = Descriptor::describe(&body, manifest.media_type.clone());
        self.put_manifest(reference, body, &descriptor)?;
        Ok(descriptor)
    }

    async fn write_index(
        &self,
        reference: &ImageReference,
        index: &ImageIndex,
    ) -> Result<Descriptor> {
        let body = index.to_bytes()?;
        let descriptor = Descriptor::describe(&body, index.effective_media_type().to_string());
        self.put_manifest(reference, body, &descriptor)?;
        Ok(descriptor)
    }
}
