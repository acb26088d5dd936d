//! Copy-on-write manifest and index mutation.
//!
//! Every operation borrows its input and returns a new value; callers
//! chain operations and digest the result once, after the chain.

use std::collections::BTreeMap;

use a3s_refs_core::error::Result;
use bytes::Bytes;
use serde::Serialize;

use super::descriptor::{Blob, Descriptor};
use super::manifest::{ImageIndex, ImageManifest, OCI_CONFIG_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE};

/// A static, uncompressed layer: its bytes are its content.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer(Blob);

impl Layer {
    pub fn new(data: impl Into<Bytes>, media_type: impl Into<String>) -> Self {
        Self(Blob::new(data, media_type))
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.0.descriptor
    }

    pub fn data(&self) -> &Bytes {
        &self.0.data
    }

    pub fn into_blob(self) -> Blob {
        self.0
    }
}

#[derive(Serialize)]
struct RootFs<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    diff_ids: Vec<&'a super::ContentHash>,
}

#[derive(Serialize)]
struct ArtifactConfig<'a> {
    rootfs: RootFs<'a>,
}

/// A manifest under construction, with the blobs it will reference.
///
/// The config blob is derived from the layer list, so the config
/// descriptor always matches the bytes that get uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactManifest {
    media_type: String,
    config_media_type: String,
    layers: Vec<Layer>,
    subject: Option<Descriptor>,
    annotations: BTreeMap<String, String>,
}

impl ArtifactManifest {
    /// Base template: OCI manifest and config types, no layers.
    pub fn empty() -> Self {
        Self {
            media_type: OCI_MANIFEST_MEDIA_TYPE.to_string(),
            config_media_type: OCI_CONFIG_MEDIA_TYPE.to_string(),
            layers: Vec::new(),
            subject: None,
            annotations: BTreeMap::new(),
        }
    }

    pub fn with_annotations<I, K, V>(&self, kv: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut next = self.clone();
        next.annotations
            .extend(kv.into_iter().map(|(k, v)| (k.into(), v.into())));
        next
    }

    pub fn with_media_type(&self, media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            ..self.clone()
        }
    }

    pub fn with_config_media_type(&self, media_type: impl Into<String>) -> Self {
        Self {
            config_media_type: media_type.into(),
            ..self.clone()
        }
    }

    /// Declare the manifest as being about `subject`.
    pub fn with_reference_descriptor(&self, subject: &Descriptor) -> Self {
        Self {
            subject: Some(subject.stripped()),
            ..self.clone()
        }
    }

    pub fn append_layer(&self, layer: Layer) -> Self {
        let mut next = self.clone();
        next.layers.push(layer);
        next
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn subject(&self) -> Option<&Descriptor> {
        self.subject.as_ref()
    }

    /// Config blob for the current layer list.
    pub fn config_blob(&self) -> Result<Blob> {
        let config = ArtifactConfig {
            rootfs: RootFs {
                kind: "layers",
                diff_ids: self.layers.iter().map(|l| &l.descriptor().digest).collect(),
            },
        };
        Ok(Blob::new(serde_json::to_vec(&config)?, self.config_media_type.clone()))
    }

    /// Final manifest value.
    pub fn manifest(&self) -> Result<ImageManifest> {
        Ok(ImageManifest {
            schema_version: 2,
            media_type: self.media_type.clone(),
            config: self.config_blob()?.descriptor,
            layers: self.layers.iter().map(|l| l.descriptor().clone()).collect(),
            subject: self.subject.clone(),
            annotations: if self.annotations.is_empty() {
                None
            } else {
                Some(self.annotations.clone())
            },
        })
    }

    /// Blobs that must exist before the manifest is written: config, then
    /// layers in order.
    pub fn blobs(&self) -> Result<Vec<Blob>> {
        let mut blobs = vec![self.config_blob()?];
        blobs.extend(self.layers.iter().map(|l| l.clone().into_blob()));
        Ok(blobs)
    }
}

impl ImageManifest {
    pub fn with_annotations<I, K, V>(&self, kv: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut annotations = self.annotations.clone().unwrap_or_default();
        annotations.extend(kv.into_iter().map(|(k, v)| (k.into(), v.into())));
        Self {
            annotations: Some(annotations),
            ..self.clone()
        }
    }

    pub fn with_media_type(&self, media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            ..self.clone()
        }
    }

    pub fn with_reference_descriptor(&self, subject: &Descriptor) -> Self {
        Self {
            subject: Some(subject.stripped()),
            ..self.clone()
        }
    }
}

impl ImageIndex {
    pub fn with_annotations<I, K, V>(&self, kv: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut annotations = self.annotations.clone().unwrap_or_default();
        annotations.extend(kv.into_iter().map(|(k, v)| (k.into(), v.into())));
        Self {
            annotations: Some(annotations),
            ..self.clone()
        }
    }

    pub fn with_media_type(&self, media_type: impl Into<String>) -> Self {
        Self {
            media_type: Some(media_type.into()),
            ..self.clone()
        }
    }

    /// Append an entry. Does not check for duplicates; see
    /// [`super::refindex::insert_entry`].
    pub fn append_manifest_entry(&self, descriptor: Descriptor) -> Self {
        let mut next = self.clone();
        next.manifests.push(descriptor);
        next
    }
}
