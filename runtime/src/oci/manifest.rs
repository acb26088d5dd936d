//! Manifest and index documents.
//!
//! Registry content is parsed once into [`Document`], a tagged union of
//! [`ImageManifest`] and [`ImageIndex`]. Media type strings are kept only
//! so documents serialise back the way they were declared.

use std::collections::BTreeMap;

use a3s_refs_core::error::{RefsError, Result};
use bytes::Bytes;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use super::descriptor::Descriptor;
use super::reference::ImageReference;

pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";
pub const OCI_CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";
pub const DOCKER_MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// Media types accepted when resolving a reference.
pub const ACCEPTED_MEDIA_TYPES: &[&str] = &[
    OCI_MANIFEST_MEDIA_TYPE,
    OCI_INDEX_MEDIA_TYPE,
    DOCKER_MANIFEST_MEDIA_TYPE,
    DOCKER_MANIFEST_LIST_MEDIA_TYPE,
];

pub fn is_index_media_type(media_type: &str) -> bool {
    media_type == OCI_INDEX_MEDIA_TYPE || media_type == DOCKER_MANIFEST_LIST_MEDIA_TYPE
}

pub fn is_manifest_media_type(media_type: &str) -> bool {
    media_type == OCI_MANIFEST_MEDIA_TYPE || media_type == DOCKER_MANIFEST_MEDIA_TYPE
}

fn schema_version_2() -> u32 {
    2
}

/// Single-artifact manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    #[serde(default = "schema_version_2")]
    pub schema_version: u32,
    #[serde(default = "default_manifest_media_type")]
    pub media_type: String,
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

fn default_manifest_media_type() -> String {
    OCI_MANIFEST_MEDIA_TYPE.to_string()
}

impl ImageManifest {
    /// Canonical serialised form. Serialising the same value always
    /// yields the same bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Descriptor of the canonical serialised form.
    pub fn descriptor(&self) -> Result<Descriptor> {
        Ok(Descriptor::describe(&self.to_bytes()?, self.media_type.clone()))
    }
}

/// Collection of manifests and sub-indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    #[serde(default = "schema_version_2")]
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for ImageIndex {
    fn default() -> Self {
        Self {
            schema_version: 2,
            media_type: Some(OCI_INDEX_MEDIA_TYPE.to_string()),
            manifests: Vec::new(),
            annotations: None,
            extra: BTreeMap::new(),
        }
    }
}

impl ImageIndex {
    /// Declared media type, or the OCI index type when absent.
    pub fn effective_media_type(&self) -> &str {
        self.media_type.as_deref().unwrap_or(OCI_INDEX_MEDIA_TYPE)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn descriptor(&self) -> Result<Descriptor> {
        Ok(Descriptor::describe(
            &self.to_bytes()?,
            self.effective_media_type().to_string(),
        ))
    }

    /// Position of the entry with this digest, if listed.
    pub fn position_of(&self, digest: &super::ContentHash) -> Option<usize> {
        self.manifests.iter().position(|d| &d.digest == digest)
    }
}

/// Which kind of document a reference resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Manifest,
    Index,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Manifest => "image manifest",
            DocumentKind::Index => "image index",
        }
    }
}

/// A parsed registry document.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Manifest(ImageManifest),
    Index(ImageIndex),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    schema_version: Option<u32>,
    media_type: Option<String>,
    manifests: Option<IgnoredAny>,
    layers: Option<IgnoredAny>,
    config: Option<IgnoredAny>,
}

impl Document {
    /// Parse raw manifest bytes, deciding the kind from the declared media
    /// type or, when absent, from the document's shape.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(raw)
            .map_err(|e| RefsError::MalformedManifest(format!("not a JSON document: {}", e)))?;

        if let Some(version) = envelope.schema_version {
            if version != 2 {
                return Err(RefsError::MalformedManifest(format!(
                    "unsupported schemaVersion {}",
                    version
                )));
            }
        }

        let kind = match envelope.media_type.as_deref() {
            Some(mt) if is_index_media_type(mt) => DocumentKind::Index,
            Some(mt) if is_manifest_media_type(mt) => DocumentKind::Manifest,
            Some(mt) => {
                return Err(RefsError::MalformedManifest(format!(
                    "unsupported media type '{}'",
                    mt
                )))
            }
            None if envelope.manifests.is_some() => DocumentKind::Index,
            None if envelope.layers.is_some() || envelope.config.is_some() => DocumentKind::Manifest,
            None => {
                return Err(RefsError::MalformedManifest(
                    "document is neither a manifest nor an index".to_string(),
                ))
            }
        };

        let malformed = |e: serde_json::Error| {
            RefsError::MalformedManifest(format!("invalid {}: {}", kind.as_str(), e))
        };
        Ok(match kind {
            DocumentKind::Index => Document::Index(serde_json::from_slice(raw).map_err(malformed)?),
            DocumentKind::Manifest => {
                Document::Manifest(serde_json::from_slice(raw).map_err(malformed)?)
            }
        })
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            Document::Manifest(_) => DocumentKind::Manifest,
            Document::Index(_) => DocumentKind::Index,
        }
    }

    pub fn media_type(&self) -> &str {
        match self {
            Document::Manifest(m) => &m.media_type,
            Document::Index(i) => i.effective_media_type(),
        }
    }
}

/// A reference resolved against a registry.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub reference: ImageReference,
    pub document: Document,
    /// Bytes exactly as fetched
    pub raw: Bytes,
    /// Descriptor of `raw`, never of a re-serialisation
    pub descriptor: Descriptor,
}

impl Resolved {
    pub fn from_raw(reference: ImageReference, raw: impl Into<Bytes>) -> Result<Self> {
        let raw = raw.into();
        let document = Document::parse(&raw)?;
        let descriptor = Descriptor::describe(&raw, document.media_type().to_string());
        Ok(Self {
            reference,
            document,
            raw,
            descriptor,
        })
    }

    pub fn kind(&self) -> DocumentKind {
        self.document.kind()
    }

    /// The resolved index, or a kind mismatch.
    pub fn into_index(self) -> Result<(ImageIndex, Bytes, Descriptor)> {
        match self.document {
            Document::Index(index) => Ok((index, self.raw, self.descriptor)),
            Document::Manifest(_) => Err(RefsError::KindMismatch {
                expected: DocumentKind::Index.as_str(),
                found: DocumentKind::Manifest.as_str(),
            }),
        }
    }
}
