//! Content descriptors.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::digest::ContentHash;

/// Platform an index entry targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(rename = "os.version", default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(ref variant) = self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}

/// (media type, size, digest) plus optional annotations.
///
/// Fields this crate does not model (`urls`, `artifactType`, ...) are kept
/// in `extra` so entries copied between indexes stay byte-for-byte intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: ContentHash,
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Descriptor {
    /// Describe a payload: size and sha256 of exactly these bytes.
    pub fn describe(data: &[u8], media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            digest: ContentHash::sha256(data),
            size: data.len() as i64,
            annotations: None,
            platform: None,
            extra: BTreeMap::new(),
        }
    }

    /// Same content with annotations merged in (later keys win).
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

    /// Just media type, size and digest; used for `subject` fields.
    pub fn stripped(&self) -> Self {
        Self {
            media_type: self.media_type.clone(),
            digest: self.digest.clone(),
            size: self.size,
            annotations: None,
            platform: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }
}

/// A blob with its descriptor, kept together until it is written.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub descriptor: Descriptor,
    pub data: Bytes,
}

impl Blob {
    pub fn new(data: impl Into<Bytes>, media_type: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            descriptor: Descriptor::describe(&data, media_type),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_is_deterministic() {
        let a = Descriptor::describe(b"logo bytes", "image/png");
        let b = Descriptor::describe(b"logo bytes", "image/png");
        assert_eq!(a, b);
        assert_eq!(a.size, 10);
        assert_eq!(a.digest, ContentHash::sha256(b"logo bytes"));
        assert!(a.annotations.is_none());
    }

    #[test]
    fn test_describe_differs_on_content() {
        let a = Descriptor::describe(b"one", "text/plain");
        let b = Descriptor::describe(b"two", "text/plain");
        assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn test_with_annotations_does_not_touch_input() {
        let base = Descriptor::describe(b"x", "text/plain");
        let annotated = base.with_annotations([("k", "v")]);
        assert!(base.annotations.is_none());
        assert_eq!(annotated.annotation("k"), Some("v"));
        assert_eq!(annotated.digest, base.digest);
    }

    #[test]
    fn test_with_annotations_overwrites() {
        let d = Descriptor::describe(b"x", "text/plain")
            .with_annotations([("k", "old"), ("j", "keep")])
            .with_annotations([("k", "new")]);
        assert_eq!(d.annotation("k"), Some("new"));
        assert_eq!(d.annotation("j"), Some("keep"));
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let json = format!(
            r#"{{"mediaType":"application/vnd.oci.image.manifest.v1+json","digest":"{}","size":7,"platform":{{"architecture":"arm64","os":"linux","variant":"v8"}},"urls":["https://example.com/x"]}}"#,
            ContentHash::sha256(b"x")
        );
        let d: Descriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(d.platform.as_ref().unwrap().to_string(), "linux/arm64/v8");
        assert!(d.extra.contains_key("urls"));
        let back: serde_json::Value = serde_json::to_value(&d).unwrap();
        assert_eq!(back["urls"][0], "https://example.com/x");
    }

    #[test]
    fn test_stripped_drops_annotations_and_platform() {
        let d = Descriptor::describe(b"x", "text/plain").with_annotations([("k", "v")]);
        let s = d.stripped();
        assert!(s.annotations.is_none());
        assert_eq!(s.digest, d.digest);
        assert_eq!(s.size, d.size);
    }

    #[test]
    fn test_blob_tracks_bytes() {
        let blob = Blob::new(b"cat".to_vec(), "image/png");
        assert_eq!(blob.descriptor.size, 3);
        assert_eq!(&blob.data[..], b"cat");
    }
}
