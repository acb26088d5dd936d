//! Reference graph engine.
//!
//! Resolves subjects through a [`RegistryGateway`], computes new graph
//! nodes with the pure operations in [`super::refindex`] and
//! [`super::mutate`], and writes them back children first: blobs, then
//! the artifact manifest, then the index.
//!
//! Attaching to an index moves through these states, one registry write
//! per transition:
//!
//! ```text
//! Resolved ──► Promoted ──► ArtifactPushed ──► IndexUpdated
//! ```
//!
//! A failure after `ArtifactPushed` leaves an unreferenced artifact
//! manifest behind; re-running the attach is safe. Concurrent attaches to
//! the same subject race on the final index write and the last writer
//! wins unless the registry rejects stale tag updates.

use std::path::Path;

use a3s_refs_core::config::RefsConfig;
use a3s_refs_core::error::{RefsError, Result, ResultExt};
use bytes::Bytes;

use super::descriptor::Descriptor;
use super::digest::ContentHash;
use super::manifest::{Document, ImageIndex, Resolved};
use super::mutate::{ArtifactManifest, Layer};
use super::reference::ImageReference;
use super::refindex::{
    insert_entry, is_reference_index, promote, reference_descriptor, Promotion, ReferenceFilter,
    ReferenceListing,
};
use super::registry::RegistryGateway;

/// Payload to attach, with its classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub data: Bytes,
    pub media_type: String,
    /// Written as the artifact type annotation and as `reference.type`
    pub artifact_type: Option<String>,
    /// Written as `reference.description` for index attachments
    pub description: Option<String>,
}

impl Artifact {
    pub fn new(data: impl Into<Bytes>, media_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            media_type: media_type.into(),
            artifact_type: None,
            description: None,
        }
    }

    pub async fn from_file(path: &Path, media_type: impl Into<String>) -> Result<Self> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            RefsError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to read {}: {}", path.display(), e),
            ))
        })?;
        Ok(Self::new(data, media_type))
    }

    /// Empty strings count as absent.
    pub fn with_artifact_type(mut self, artifact_type: impl Into<String>) -> Self {
        let artifact_type = artifact_type.into();
        self.artifact_type = (!artifact_type.is_empty()).then_some(artifact_type);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = (!description.is_empty()).then_some(description);
        self
    }
}

/// Where a reference index is written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IndexTarget {
    /// Back under the tag the subject was resolved by
    #[default]
    OriginalTag,
    /// `<alg>-<hex>` of the original index's digest
    FallbackTag,
    /// An explicit tag in the subject's repository
    Tag(String),
}

/// What an attach wrote.
#[derive(Debug, Clone, PartialEq)]
pub enum AttachOutcome {
    /// Artifact manifest pushed by digest, referencing a single manifest
    Manifest {
        subject: Descriptor,
        artifact: Descriptor,
        pushed_to: ImageReference,
    },
    /// Artifact listed in a reference index
    Index {
        subject: Descriptor,
        artifact: Descriptor,
        index: Descriptor,
        written_to: ImageReference,
        promoted: bool,
    },
}

impl AttachOutcome {
    pub fn artifact(&self) -> &Descriptor {
        match self {
            AttachOutcome::Manifest { artifact, .. } | AttachOutcome::Index { artifact, .. } => {
                artifact
            }
        }
    }
}

/// What a promotion did.
#[derive(Debug, Clone, PartialEq)]
pub enum PromoteOutcome {
    Promoted {
        index: Descriptor,
        written_to: ImageReference,
    },
    /// A reference index for this origin already exists at `location`;
    /// nothing written
    AlreadyReference {
        index: Descriptor,
        location: ImageReference,
    },
}

/// A reference index built in memory, not yet written.
#[derive(Debug, Clone)]
pub struct ReferenceIndexPlan {
    /// Descriptor of the index as resolved
    pub source: Descriptor,
    pub promotion: Promotion,
    /// `<repository>:<alg>-<hex>` of the original index
    pub fallback: ImageReference,
}

/// Engine operations over a registry gateway and a configuration.
pub struct ReferenceEngine<'a, G: RegistryGateway + ?Sized> {
    registry: &'a G,
    config: &'a RefsConfig,
}

impl<'a, G: RegistryGateway + ?Sized> ReferenceEngine<'a, G> {
    pub fn new(registry: &'a G, config: &'a RefsConfig) -> Self {
        Self { registry, config }
    }

    /// Artifact manifest for `artifact`, declared to be about `subject`.
    pub fn build_artifact(&self, subject: &Descriptor, artifact: &Artifact) -> ArtifactManifest {
        let draft = ArtifactManifest::empty()
            .with_reference_descriptor(subject)
            .append_layer(Layer::new(artifact.data.clone(), artifact.media_type.clone()));
        match artifact.artifact_type {
            Some(ref artifact_type) => draft.with_annotations([(
                self.config.annotations.artifact_type.clone(),
                artifact_type.clone(),
            )]),
            None => draft,
        }
    }

    /// Attach `artifact` to whatever `subject` resolves to.
    ///
    /// A manifest subject gets an artifact pushed by digest; an index
    /// subject gets the artifact listed in its reference index, written
    /// to `target`.
    pub async fn attach(
        &self,
        subject: &ImageReference,
        artifact: &Artifact,
        target: &IndexTarget,
    ) -> Result<AttachOutcome> {
        self.resolve_and_attach(subject, artifact, target)
            .await
            .context("attach")
    }

    /// Attach to the first entry of an index; a manifest subject is an error.
    pub async fn attach_to_index(
        &self,
        subject: &ImageReference,
        artifact: &Artifact,
        target: &IndexTarget,
    ) -> Result<AttachOutcome> {
        self.resolve_and_attach_to_index(subject, artifact, target)
            .await
            .context("attach to index")
    }

    async fn resolve_and_attach(
        &self,
        subject: &ImageReference,
        artifact: &Artifact,
        target: &IndexTarget,
    ) -> Result<AttachOutcome> {
        let resolved = self.registry.resolve(subject).await?;
        match resolved.document {
            Document::Manifest(_) => self.attach_resolved_manifest(resolved, artifact).await,
            Document::Index(_) => self.attach_resolved_index(resolved, artifact, target).await,
        }
    }

    async fn resolve_and_attach_to_index(
        &self,
        subject: &ImageReference,
        artifact: &Artifact,
        target: &IndexTarget,
    ) -> Result<AttachOutcome> {
        let resolved = self.registry.resolve(subject).await?;
        self.attach_resolved_index(resolved, artifact, target).await
    }

    async fn attach_resolved_manifest(
        &self,
        resolved: Resolved,
        artifact: &Artifact,
    ) -> Result<AttachOutcome> {
        let subject = resolved.descriptor.stripped();
        let draft = self.build_artifact(&subject, artifact);
        let pushed_to = self.push_artifact(&resolved.reference, &draft).await?;
        let artifact = draft.manifest()?.descriptor()?;

        tracing::info!(
            subject = %subject.digest,
            artifact = %artifact.digest,
            target = %pushed_to,
            "Artifact attached to manifest"
        );
        Ok(AttachOutcome::Manifest {
            subject,
            artifact,
            pushed_to,
        })
    }

    async fn attach_resolved_index(
        &self,
        resolved: Resolved,
        artifact: &Artifact,
        target: &IndexTarget,
    ) -> Result<AttachOutcome> {
        let reference = resolved.reference.clone();
        let (index, raw, _) = resolved.into_index()?;
        if index.manifests.is_empty() {
            return Err(RefsError::EmptyIndex(reference.to_string()));
        }

        let (reference_index, promoted, written_to) = self
            .starting_reference_index(&reference, &index, &raw, target)
            .await?;
        tracing::info!(reference = %reference, promoted, "Reference index ready");

        // Slot 0 of a reference index is the original index.
        let nested = reference_index.manifests[0].stripped();
        let draft = self.build_artifact(&nested, artifact);
        let artifact_desc = draft.manifest()?.descriptor()?;
        let entry = reference_descriptor(
            &artifact_desc,
            &self.config.annotations,
            artifact.artifact_type.as_deref().unwrap_or_default(),
            &nested.digest,
            artifact.description.as_deref().unwrap_or_default(),
        );
        let updated = insert_entry(&reference_index, entry)?;

        self.push_artifact(&reference, &draft).await?;
        tracing::info!(artifact = %artifact_desc.digest, "Artifact pushed");

        let index_desc = self.registry.write_index(&written_to, &updated).await?;
        tracing::info!(
            index = %index_desc.digest,
            target = %written_to,
            entries = updated.manifests.len(),
            "Reference index updated"
        );

        Ok(AttachOutcome::Index {
            subject: nested,
            artifact: artifact_desc,
            index: index_desc,
            written_to,
            promoted,
        })
    }

    /// The reference index an index attach builds on, and where it goes.
    ///
    /// When the destination is not the subject itself, a reference index
    /// for the same origin already stored there is the starting point, so
    /// earlier entries survive and duplicates are detected.
    async fn starting_reference_index(
        &self,
        reference: &ImageReference,
        index: &ImageIndex,
        raw: &[u8],
        target: &IndexTarget,
    ) -> Result<(ImageIndex, bool, ImageReference)> {
        let origin = match index.manifests.first() {
            Some(first) if is_reference_index(index) => first.digest.clone(),
            _ => ContentHash::sha256(raw),
        };
        let destination = self.index_target(reference, &origin, target)?;
        if destination.tag != reference.tag {
            if let Some((existing, _)) =
                self.stored_reference_index(&destination, &origin).await?
            {
                tracing::debug!(destination = %destination, "Using existing reference index");
                return Ok((existing, false, destination));
            }
        }
        let promotion = promote(index, raw, &self.config.annotations);
        let promoted = promotion.was_promoted();
        Ok((promotion.into_index(), promoted, destination))
    }

    /// Reference index for `origin` stored at `destination`, if any.
    async fn stored_reference_index(
        &self,
        destination: &ImageReference,
        origin: &ContentHash,
    ) -> Result<Option<(ImageIndex, Descriptor)>> {
        match self.registry.resolve(destination).await {
            Ok(Resolved {
                document: Document::Index(existing),
                descriptor,
                ..
            }) if is_reference_index(&existing) && &existing.manifests[0].digest == origin => {
                Ok(Some((existing, descriptor)))
            }
            Ok(_) => {
                tracing::warn!(
                    destination = %destination,
                    "Destination holds something else; replacing it"
                );
                Ok(None)
            }
            Err(RefsError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write the artifact's blobs, then the manifest under its own digest.
    async fn push_artifact(
        &self,
        repository: &ImageReference,
        draft: &ArtifactManifest,
    ) -> Result<ImageReference> {
        for blob in draft.blobs()? {
            self.registry.write_blob(repository, &blob.data).await?;
        }
        let manifest = draft.manifest()?;
        let target = repository.with_digest(manifest.descriptor()?.digest);
        self.registry.write_manifest(&target, &manifest).await?;
        Ok(target)
    }

    fn index_target(
        &self,
        subject: &ImageReference,
        origin: &ContentHash,
        target: &IndexTarget,
    ) -> Result<ImageReference> {
        match target {
            IndexTarget::OriginalTag => match subject.tag {
                Some(ref tag) => subject.with_tag(tag.clone()),
                None => Err(RefsError::InvalidReference(format!(
                    "{} has no tag to write the reference index back to",
                    subject
                ))),
            },
            IndexTarget::FallbackTag => subject.with_tag(origin.fallback_tag()),
            IndexTarget::Tag(tag) => subject.with_tag(tag.clone()),
        }
    }

    /// Resolve an index and promote it in memory without writing.
    pub async fn build_reference_index(&self, reference: &ImageReference) -> Result<ReferenceIndexPlan> {
        self.plan_reference_index(reference)
            .await
            .context("build reference index")
    }

    /// Promote an index to a reference index and write it to `target`.
    pub async fn promote_index(
        &self,
        reference: &ImageReference,
        target: &IndexTarget,
    ) -> Result<PromoteOutcome> {
        self.promote_and_write(reference, target)
            .await
            .context("promote")
    }

    /// References attached to a subject.
    ///
    /// Without an explicit filter, a reference index lists entries that
    /// point at its self-reference (the original index), and a plain
    /// index lists every annotated entry. A manifest hosts no reference
    /// index and yields an empty listing.
    pub async fn list_references(
        &self,
        reference: &ImageReference,
        filter: Option<ReferenceFilter>,
    ) -> Result<ReferenceListing> {
        self.resolve_listing(reference, filter)
            .await
            .context("list references")
    }

    async fn plan_reference_index(&self, reference: &ImageReference) -> Result<ReferenceIndexPlan> {
        let resolved = self.registry.resolve(reference).await?;
        let (index, raw, source) = resolved.into_index()?;
        let promotion = promote(&index, &raw, &self.config.annotations);
        let fallback = match promotion.index().manifests.first() {
            Some(origin) => reference.with_tag(origin.digest.fallback_tag())?,
            None => reference.with_tag(source.digest.fallback_tag())?,
        };
        Ok(ReferenceIndexPlan {
            source,
            promotion,
            fallback,
        })
    }

    async fn promote_and_write(
        &self,
        reference: &ImageReference,
        target: &IndexTarget,
    ) -> Result<PromoteOutcome> {
        let plan = self.build_reference_index(reference).await?;
        let Promotion::Promoted(index) = plan.promotion else {
            tracing::info!(reference = %reference, "Already a reference index; skipping");
            return Ok(PromoteOutcome::AlreadyReference {
                index: plan.source,
                location: reference.clone(),
            });
        };
        let written_to = self.index_target(reference, &plan.source.digest, target)?;
        if written_to.tag != reference.tag {
            if let Some((_, existing)) = self
                .stored_reference_index(&written_to, &plan.source.digest)
                .await?
            {
                tracing::info!(target = %written_to, "Reference index already present; skipping");
                return Ok(PromoteOutcome::AlreadyReference {
                    index: existing,
                    location: written_to,
                });
            }
        }
        let descriptor = self.registry.write_index(&written_to, &index).await?;
        tracing::info!(
            source = %plan.source.digest,
            index = %descriptor.digest,
            target = %written_to,
            "Index promoted"
        );
        Ok(PromoteOutcome::Promoted {
            index: descriptor,
            written_to,
        })
    }

    async fn resolve_listing(
        &self,
        reference: &ImageReference,
        filter: Option<ReferenceFilter>,
    ) -> Result<ReferenceListing> {
        let resolved = self.registry.resolve(reference).await?;
        let keys = self.config.annotations.clone();
        Ok(match resolved.document {
            Document::Manifest(_) => ReferenceListing::empty(keys),
            Document::Index(index) => {
                let filter = filter.unwrap_or_else(|| {
                    if is_reference_index(&index) {
                        ReferenceFilter::Subject(index.manifests[0].digest.clone())
                    } else {
                        ReferenceFilter::All
                    }
                });
                ReferenceListing::new(index, filter, keys)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::manifest::{OCI_INDEX_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE};
    use crate::oci::memory::MemoryRegistry;

    const SUBJECT_MANIFEST: &str = r#"{"schemaVersion":2,"mediaType":"application/vnd.oci.image.manifest.v1+json","config":{"mediaType":"application/vnd.oci.image.config.v1+json","digest":"sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a","size":2},"layers":[]}"#;

    fn seed_manifest(registry: &MemoryRegistry, reference: &str) -> (ImageReference, Descriptor) {
        let reference = ImageReference::parse(reference).unwrap();
        registry.put_raw_manifest(&reference, SUBJECT_MANIFEST.as_bytes().to_vec());
        let desc = Descriptor::describe(SUBJECT_MANIFEST.as_bytes(), OCI_MANIFEST_MEDIA_TYPE);
        (reference, desc)
    }

    #[test]
    fn test_artifact_empty_strings_are_absent() {
        let a = Artifact::new(b"x".to_vec(), "text/plain")
            .with_artifact_type("")
            .with_description("");
        assert!(a.artifact_type.is_none());
        assert!(a.description.is_none());
    }

    #[test]
    fn test_build_artifact_shape() {
        let registry = MemoryRegistry::new();
        let config = RefsConfig::default();
        let engine = ReferenceEngine::new(&registry, &config);
        let subject = Descriptor::describe(b"subject", OCI_MANIFEST_MEDIA_TYPE);
        let artifact = Artifact::new(b"sbom".to_vec(), "application/spdx+json").with_artifact_type("sbom");

        let manifest = engine.build_artifact(&subject, &artifact).manifest().unwrap();
        assert_eq!(manifest.layers.len(), 1);
        assert_eq!(manifest.layers[0].media_type, "application/spdx+json");
        assert_eq!(manifest.subject.as_ref().unwrap().digest, subject.digest);
        assert_eq!(
            manifest.annotations.unwrap()["org.opencontainers.artifact.type"],
            "sbom"
        );
    }

    #[tokio::test]
    async fn test_attach_manifest_pushes_by_digest() {
        let registry = MemoryRegistry::new();
        let config = RefsConfig::default();
        let engine = ReferenceEngine::new(&registry, &config);
        let (subject, subject_desc) = seed_manifest(&registry, "localhost:5000/app:v1");

        let outcome = engine
            .attach(&subject, &Artifact::new(b"doc".to_vec(), "text/plain"), &IndexTarget::default())
            .await
            .unwrap();
        match outcome {
            AttachOutcome::Manifest {
                subject: s,
                artifact,
                pushed_to,
            } => {
                assert_eq!(s, subject_desc);
                assert_eq!(pushed_to.digest.as_ref(), Some(&artifact.digest));
                assert!(pushed_to.tag.is_none());
            }
            other => panic!("expected manifest outcome, got {:?}", other),
        }
        // The subject tag is untouched.
        assert_eq!(registry.tag(&subject), Some(subject_desc.digest));
    }

    #[tokio::test]
    async fn test_attach_to_index_rejects_manifest() {
        let registry = MemoryRegistry::new();
        let config = RefsConfig::default();
        let engine = ReferenceEngine::new(&registry, &config);
        let (subject, _) = seed_manifest(&registry, "localhost:5000/app:v1");

        let err = engine
            .attach_to_index(&subject, &Artifact::new(b"x".to_vec(), "text/plain"), &IndexTarget::default())
            .await
            .unwrap_err();
        assert!(matches!(err.root(), RefsError::KindMismatch { .. }));
        assert!(err.to_string().starts_with("attach to index:"));
    }

    #[tokio::test]
    async fn test_attach_empty_index_fails() {
        let registry = MemoryRegistry::new();
        let config = RefsConfig::default();
        let engine = ReferenceEngine::new(&registry, &config);
        let subject = ImageReference::parse("localhost:5000/app:v1").unwrap();
        registry.put_raw_manifest(
            &subject,
            format!(r#"{{"schemaVersion":2,"mediaType":"{}","manifests":[]}}"#, OCI_INDEX_MEDIA_TYPE)
                .into_bytes(),
        );

        let err = engine
            .attach(&subject, &Artifact::new(b"x".to_vec(), "text/plain"), &IndexTarget::default())
            .await
            .unwrap_err();
        assert!(matches!(err.root(), RefsError::EmptyIndex(_)));
        assert_eq!(registry.manifest_count(&subject), 1);
    }

    #[tokio::test]
    async fn test_original_tag_requires_tag() {
        let registry = MemoryRegistry::new();
        let config = RefsConfig::default();
        let engine = ReferenceEngine::new(&registry, &config);
        let subject = ImageReference::parse("localhost:5000/app:v1").unwrap();
        let digest = registry.put_raw_manifest(
            &subject,
            format!(r#"{{"schemaVersion":2,"mediaType":"{}","manifests":[]}}"#, OCI_INDEX_MEDIA_TYPE)
                .into_bytes(),
        );

        let err = engine
            .promote_index(&subject.with_digest(digest), &IndexTarget::OriginalTag)
            .await
            .unwrap_err();
        assert!(matches!(err.root(), RefsError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn test_list_references_on_manifest_is_empty() {
        let registry = MemoryRegistry::new();
        let config = RefsConfig::default();
        let engine = ReferenceEngine::new(&registry, &config);
        let (subject, _) = seed_manifest(&registry, "localhost:5000/app:v1");

        let listing = engine.list_references(&subject, None).await.unwrap();
        assert_eq!(listing.iter().count(), 0);
    }

    #[tokio::test]
    async fn test_resolution_failure_carries_context() {
        let registry = MemoryRegistry::new();
        let config = RefsConfig::default();
        let engine = ReferenceEngine::new(&registry, &config);
        let missing = ImageReference::parse("localhost:5000/missing:v1").unwrap();

        let err = engine.promote_index(&missing, &IndexTarget::OriginalTag).await.unwrap_err();
        assert!(matches!(err.root(), RefsError::NotFound(_)));
        assert!(err.to_string().starts_with("promote: build reference index:"));
    }
}
