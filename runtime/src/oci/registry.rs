//! Registry gateway.
//!
//! The engine reaches registries only through [`RegistryGateway`]:
//! resolve a reference, write a blob, write a manifest or an index.
//! [`RemoteRegistry`] implements it over the `oci-distribution` client.

use std::future::Future;
use std::time::Duration;

use a3s_refs_core::config::RefsConfig;
use a3s_refs_core::error::{RefsError, Result};
use async_trait::async_trait;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::errors::{OciDistributionError, OciErrorCode};
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference, RegistryOperation};

use super::credentials::CredentialStore;
use super::descriptor::Descriptor;
use super::digest::ContentHash;
use super::manifest::{ImageIndex, ImageManifest, Resolved, ACCEPTED_MEDIA_TYPES};
use super::reference::ImageReference;

/// Narrow registry interface consumed by the reference engine.
#[async_trait]
pub trait RegistryGateway: Send + Sync {
    /// Fetch the manifest or index a reference points at, as raw bytes.
    async fn resolve(&self, reference: &ImageReference) -> Result<Resolved>;

    /// Upload a blob into the reference's repository.
    async fn write_blob(&self, repository: &ImageReference, data: &[u8]) -> Result<ContentHash>;

    /// Write a manifest under a tag or its own digest.
    async fn write_manifest(
        &self,
        reference: &ImageReference,
        manifest: &ImageManifest,
    ) -> Result<Descriptor>;

    /// Write an index under a tag or its own digest.
    async fn write_index(&self, reference: &ImageReference, index: &ImageIndex)
        -> Result<Descriptor>;
}

/// Authentication credentials for a container registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryAuth {
    Anonymous,
    Basic { username: String, password: String },
}

impl RegistryAuth {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        RegistryAuth::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `REGISTRY_USERNAME` / `REGISTRY_PASSWORD`, else anonymous.
    pub fn from_env() -> Self {
        match (
            std::env::var("REGISTRY_USERNAME"),
            std::env::var("REGISTRY_PASSWORD"),
        ) {
            (Ok(username), Ok(password)) => Self::basic(username, password),
            _ => RegistryAuth::Anonymous,
        }
    }

    /// Credential store first, then environment, then anonymous.
    pub fn from_credential_store(registry: &str) -> Self {
        let stored = CredentialStore::default_path().and_then(|store| store.get(registry));
        match stored {
            Ok(Some(credential)) => Self::basic(credential.username, credential.password),
            Ok(None) => Self::from_env(),
            Err(e) => {
                tracing::warn!(registry, error = %e, "Ignoring unreadable credential store");
                Self::from_env()
            }
        }
    }

    fn to_oci_auth(&self) -> OciRegistryAuth {
        match self {
            RegistryAuth::Basic { username, password } => {
                OciRegistryAuth::Basic(username.clone(), password.clone())
            }
            RegistryAuth::Anonymous => OciRegistryAuth::Anonymous,
        }
    }
}

/// Registry gateway backed by the `oci-distribution` client.
pub struct RemoteRegistry {
    client: Client,
    /// Fixed credentials; looked up per registry when unset
    auth: Option<RegistryAuth>,
    timeout: Duration,
}

impl RemoteRegistry {
    /// Gateway that looks credentials up per registry.
    pub fn new(config: &RefsConfig) -> Self {
        let protocol = if config.insecure_registries.is_empty() {
            ClientProtocol::Https
        } else {
            ClientProtocol::HttpsExcept(config.insecure_registries.clone())
        };
        let client = Client::new(ClientConfig {
            protocol,
            ..Default::default()
        });
        Self {
            client,
            auth: None,
            timeout: config.timeout(),
        }
    }

    /// Gateway that always uses `auth`.
    pub fn with_auth(config: &RefsConfig, auth: RegistryAuth) -> Self {
        Self {
            auth: Some(auth),
            ..Self::new(config)
        }
    }

    fn auth_for(&self, registry: &str) -> OciRegistryAuth {
        match self.auth {
            Some(ref auth) => auth.to_oci_auth(),
            None => RegistryAuth::from_credential_store(registry).to_oci_auth(),
        }
    }

    async fn timed<T>(
        &self,
        operation: &str,
        reference: &ImageReference,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| {
            RefsError::TimeoutError(format!(
                "{} {} took longer than {}s",
                operation,
                reference,
                self.timeout.as_secs()
            ))
        })?
    }

    async fn authenticate_push(&self, oci_ref: &Reference, reference: &ImageReference) -> Result<()> {
        let auth = self.auth_for(&reference.registry);
        self.client
            .auth(oci_ref, &auth, RegistryOperation::Push)
            .await
            .map_err(|e| write_error(reference, "authenticate", e))?;
        Ok(())
    }

    async fn push_raw_manifest(
        &self,
        reference: &ImageReference,
        body: Vec<u8>,
        media_type: &str,
    ) -> Result<()> {
        let oci_ref = to_oci_reference(reference)?;
        let content_type = http::HeaderValue::from_str(media_type).map_err(|e| {
            RefsError::MalformedManifest(format!("invalid media type '{}': {}", media_type, e))
        })?;
        self.timed("push manifest", reference, async {
            self.authenticate_push(&oci_ref, reference).await?;
            self.client
                .push_manifest_raw(&oci_ref, body, content_type)
                .await
                .map_err(|e| write_error(reference, "push manifest", e))
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RegistryGateway for RemoteRegistry {
    async fn resolve(&self, reference: &ImageReference) -> Result<Resolved> {
        let oci_ref = to_oci_reference(reference)?;
        let auth = self.auth_for(&reference.registry);

        tracing::debug!(reference = %reference, "Resolving manifest");
        let (raw, registry_digest) = self
            .timed("resolve", reference, async {
                self.client
                    .pull_manifest_raw(&oci_ref, &auth, ACCEPTED_MEDIA_TYPES)
                    .await
                    .map_err(|e| resolve_error(reference, e))
            })
            .await?;

        let resolved = Resolved::from_raw(reference.clone(), raw)?;
        if resolved.descriptor.digest.to_string() != registry_digest {
            tracing::warn!(
                reference = %reference,
                registry_digest = %registry_digest,
                computed = %resolved.descriptor.digest,
                "Registry digest differs from the fetched bytes; using the fetched bytes"
            );
        }
        if let Some(ref pinned) = reference.digest {
            if !pinned.verify(&resolved.raw) {
                return Err(RefsError::ResolutionFailure {
                    reference: reference.to_string(),
                    message: format!("content does not match {}", pinned),
                });
            }
        }
        Ok(resolved)
    }

    async fn write_blob(&self, repository: &ImageReference, data: &[u8]) -> Result<ContentHash> {
        let digest = ContentHash::sha256(data);
        let oci_ref = to_oci_reference(repository)?;
        self.timed("push blob", repository, async {
            self.authenticate_push(&oci_ref, repository).await?;
            self.client
                .push_blob(&oci_ref, data, &digest.to_string())
                .await
                .map_err(|e| write_error(repository, "push blob", e))
        })
        .await?;
        tracing::debug!(repository = %repository.repository_name(), digest = %digest, size = data.len(), "Blob written");
        Ok(digest)
    }

    async fn write_manifest(
        &self,
        reference: &ImageReference,
        manifest: &ImageManifest,
    ) -> Result<Descriptor> {
        let body = manifest.to_bytes()?;
        let descriptor = Descriptor::describe(&body, manifest.media_type.clone());
        check_digest_target(reference, &descriptor)?;
        self.push_raw_manifest(reference, body, &manifest.media_type).await?;
        Ok(descriptor)
    }

    async fn write_index(
        &self,
        reference: &ImageReference,
        index: &ImageIndex,
    ) -> Result<Descriptor> {
        let body = index.to_bytes()?;
        let descriptor = Descriptor::describe(&body, index.effective_media_type().to_string());
        check_digest_target(reference, &descriptor)?;
        self.push_raw_manifest(reference, body, index.effective_media_type())
            .await?;
        Ok(descriptor)
    }
}

/// A write addressed by digest must carry exactly that content.
pub(crate) fn check_digest_target(reference: &ImageReference, descriptor: &Descriptor) -> Result<()> {
    match reference.digest {
        Some(ref digest) if digest != &descriptor.digest => Err(RefsError::RegistryError {
            registry: reference.registry.clone(),
            message: format!(
                "refusing to write {} under {}",
                descriptor.digest, reference
            ),
        }),
        _ => Ok(()),
    }
}

fn to_oci_reference(reference: &ImageReference) -> Result<Reference> {
    let ref_str = reference.full_reference();
    ref_str.parse::<Reference>().map_err(|e| {
        RefsError::InvalidReference(format!("'{}': {}", ref_str, e))
    })
}

fn is_not_found(err: &OciDistributionError) -> bool {
    match err {
        OciDistributionError::ImageManifestNotFoundError(_) => true,
        OciDistributionError::RegistryError { envelope, .. } => envelope
            .errors
            .iter()
            .any(|e| matches!(e.code, OciErrorCode::ManifestUnknown | OciErrorCode::NameUnknown)),
        _ => false,
    }
}

fn resolve_error(reference: &ImageReference, err: OciDistributionError) -> RefsError {
    if is_not_found(&err) {
        return RefsError::NotFound(reference.to_string());
    }
    RefsError::ResolutionFailure {
        reference: reference.to_string(),
        message: err.to_string(),
    }
}

fn write_error(reference: &ImageReference, operation: &str, err: OciDistributionError) -> RefsError {
    RefsError::RegistryError {
        registry: reference.registry.clone(),
        message: format!("{} {}: {}", operation, reference, err),
    }
}
