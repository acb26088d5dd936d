//! Reference index graph operations.
//!
//! A reference index is an index whose first entry describes the original
//! index it was promoted from. Artifacts attached to that index are
//! appended behind it, each annotated with the reference triple
//! (type, subject digest, description).
//!
//! ```text
//! before                          after promotion + attach
//! ┌──────────────────┐            ┌──────────────────────────────┐
//! │ index I          │            │ reference index I'           │
//! │  [0] linux/amd64 │            │  [0] I (self, index type)    │
//! │  [1] linux/arm64 │            │  [1] linux/amd64             │
//! └──────────────────┘            │  [2] linux/arm64             │
//!                                 │  [3] artifact → digest(I)    │
//!                                 └──────────────────────────────┘
//! ```
//!
//! Everything here is pure; registry I/O lives in the engine.

use a3s_refs_core::config::ReferenceAnnotationKeys;
use a3s_refs_core::error::{RefsError, Result};

use super::descriptor::Descriptor;
use super::digest::ContentHash;
use super::manifest::{is_index_media_type, ImageIndex};

/// Description written on the self-reference entry.
pub const SELF_REFERENCE_DESCRIPTION: &str = "self";

/// Result of promoting an index.
#[derive(Debug, Clone, PartialEq)]
pub enum Promotion {
    /// A new reference index wrapping the input
    Promoted(ImageIndex),
    /// The input already starts with an index entry; returned unchanged
    AlreadyReference(ImageIndex),
}

impl Promotion {
    pub fn index(&self) -> &ImageIndex {
        match self {
            Promotion::Promoted(index) | Promotion::AlreadyReference(index) => index,
        }
    }

    pub fn into_index(self) -> ImageIndex {
        match self {
            Promotion::Promoted(index) | Promotion::AlreadyReference(index) => index,
        }
    }

    pub fn was_promoted(&self) -> bool {
        matches!(self, Promotion::Promoted(_))
    }
}

/// Whether `index` is already a reference index.
///
/// Only the declared media type of `manifests[0]` is inspected.
pub fn is_reference_index(index: &ImageIndex) -> bool {
    index
        .manifests
        .first()
        .map_or(false, |first| is_index_media_type(&first.media_type))
}

/// Promote `index` (whose as-fetched bytes are `raw`) to a reference index.
///
/// The self-reference is described from `raw`, so it matches what the
/// registry stores rather than a re-serialisation.
pub fn promote(index: &ImageIndex, raw: &[u8], keys: &ReferenceAnnotationKeys) -> Promotion {
    if is_reference_index(index) {
        return Promotion::AlreadyReference(index.clone());
    }

    let self_ref = Descriptor::describe(raw, index.effective_media_type().to_string())
        .with_annotations([(
            keys.reference_description.clone(),
            SELF_REFERENCE_DESCRIPTION.to_string(),
        )]);

    let mut manifests = Vec::with_capacity(index.manifests.len() + 1);
    manifests.push(self_ref);
    manifests.extend(index.manifests.iter().cloned());

    Promotion::Promoted(ImageIndex {
        manifests,
        ..index.clone()
    })
}

/// Append `candidate` unless an entry with the same digest is listed.
pub fn insert_entry(index: &ImageIndex, candidate: Descriptor) -> Result<ImageIndex> {
    if let Some(position) = index.position_of(&candidate.digest) {
        return Err(RefsError::DuplicateAttachment {
            digest: candidate.digest.to_string(),
            position,
        });
    }
    Ok(index.append_manifest_entry(candidate))
}

/// Annotate an artifact descriptor with the reference triple.
pub fn reference_descriptor(
    artifact: &Descriptor,
    keys: &ReferenceAnnotationKeys,
    reference_type: &str,
    subject: &ContentHash,
    description: &str,
) -> Descriptor {
    artifact.with_annotations([
        (keys.reference_type.clone(), reference_type.to_string()),
        (keys.reference_digest.clone(), subject.to_string()),
        (keys.reference_description.clone(), description.to_string()),
    ])
}

/// Which entries a listing yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceFilter {
    /// Entries whose reference digest equals this subject
    Subject(ContentHash),
    /// Every entry carrying a reference digest
    All,
}

/// An attached artifact as seen in a reference index.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEntry {
    /// Position in the index's `manifests`
    pub position: usize,
    pub descriptor: Descriptor,
    pub subject: ContentHash,
    pub reference_type: Option<String>,
    pub description: Option<String>,
}

/// Owned snapshot of an index's references.
#[derive(Debug, Clone)]
pub struct ReferenceListing {
    index: ImageIndex,
    filter: ReferenceFilter,
    keys: ReferenceAnnotationKeys,
}

impl ReferenceListing {
    pub fn new(index: ImageIndex, filter: ReferenceFilter, keys: ReferenceAnnotationKeys) -> Self {
        Self {
            index,
            filter,
            keys,
        }
    }

    /// Listing with nothing in it (subjects that host no reference index).
    pub fn empty(keys: ReferenceAnnotationKeys) -> Self {
        Self::new(ImageIndex::default(), ReferenceFilter::All, keys)
    }

    pub fn filter(&self) -> &ReferenceFilter {
        &self.filter
    }

    /// Lazy iterator over matching entries. Call again to restart.
    pub fn iter(&self) -> References<'_> {
        References {
            entries: self.index.manifests.iter().enumerate(),
            filter: &self.filter,
            keys: &self.keys,
        }
    }
}

/// Iterator returned by [`ReferenceListing::iter`].
#[derive(Debug, Clone)]
pub struct References<'a> {
    entries: std::iter::Enumerate<std::slice::Iter<'a, Descriptor>>,
    filter: &'a ReferenceFilter,
    keys: &'a ReferenceAnnotationKeys,
}

impl<'a> Iterator for References<'a> {
    type Item = ReferenceEntry;

    fn next(&mut self) -> Option<Self::Item> {
        for (position, descriptor) in self.entries.by_ref() {
            // Entries with an unparsable reference digest are not edges.
            let Some(subject) = descriptor
                .annotation(&self.keys.reference_digest)
                .and_then(|d| d.parse::<ContentHash>().ok())
            else {
                continue;
            };
            if let ReferenceFilter::Subject(ref wanted) = self.filter {
                if &subject != wanted {
                    continue;
                }
            }
            return Some(ReferenceEntry {
                position,
                subject,
                reference_type: descriptor
                    .annotation(&self.keys.reference_type)
                    .map(str::to_string),
                description: descriptor
                    .annotation(&self.keys.reference_description)
                    .map(str::to_string),
                descriptor: descriptor.clone(),
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::manifest::{OCI_INDEX_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE};

    fn keys() -> ReferenceAnnotationKeys {
        ReferenceAnnotationKeys::default()
    }

    fn manifest_entry(name: &[u8]) -> Descriptor {
        Descriptor::describe(name, OCI_MANIFEST_MEDIA_TYPE)
    }

    fn index_of(entries: Vec<Descriptor>) -> (ImageIndex, Vec<u8>) {
        let index = ImageIndex {
            manifests: entries,
            ..Default::default()
        };
        let raw = index.to_bytes().unwrap();
        (index, raw)
    }

    #[test]
    fn test_promote_prepends_self_and_keeps_order() {
        let (m0, m1, m2) = (manifest_entry(b"m0"), manifest_entry(b"m1"), manifest_entry(b"m2"));
        let (index, raw) = index_of(vec![m0.clone(), m1.clone(), m2.clone()]);

        let promoted = promote(&index, &raw, &keys());
        assert!(promoted.was_promoted());
        let out = promoted.index();
        assert_eq!(out.manifests.len(), 4);
        assert_eq!(out.manifests[0].digest, ContentHash::sha256(&raw));
        assert_eq!(out.manifests[0].size, raw.len() as i64);
        assert_eq!(out.manifests[0].media_type, OCI_INDEX_MEDIA_TYPE);
        assert_eq!(&out.manifests[1..], &[m0, m1, m2]);
    }

    #[test]
    fn test_promote_two_entries() {
        let (a, b) = (manifest_entry(b"A"), manifest_entry(b"B"));
        let (index, raw) = index_of(vec![a.clone(), b.clone()]);
        let out = promote(&index, &raw, &keys()).into_index();
        assert!(is_index_media_type(&out.manifests[0].media_type));
        assert_eq!(out.manifests[1], a);
        assert_eq!(out.manifests[2], b);
    }

    #[test]
    fn test_promote_empty_index() {
        let (index, raw) = index_of(vec![]);
        let out = promote(&index, &raw, &keys()).into_index();
        assert_eq!(out.manifests.len(), 1);
        assert_eq!(out.manifests[0].digest, ContentHash::sha256(&raw));
    }

    #[test]
    fn test_promote_is_idempotent() {
        for entries in [vec![], vec![manifest_entry(b"A"), manifest_entry(b"B")]] {
            let (index, raw) = index_of(entries);
            let once = promote(&index, &raw, &keys()).into_index();
            let once_raw = once.to_bytes().unwrap();
            let twice = promote(&once, &once_raw, &keys());
            assert!(!twice.was_promoted());
            assert_eq!(twice.index(), &once);
        }
    }

    #[test]
    fn test_self_reference_has_no_type() {
        let (index, raw) = index_of(vec![manifest_entry(b"A")]);
        let out = promote(&index, &raw, &keys()).into_index();
        let self_ref = &out.manifests[0];
        assert!(self_ref.annotation(&keys().reference_type).is_none());
        assert!(self_ref.annotation(&keys().reference_digest).is_none());
        assert_eq!(
            self_ref.annotation(&keys().reference_description),
            Some(SELF_REFERENCE_DESCRIPTION)
        );
    }

    #[test]
    fn test_detection_ignores_annotations() {
        // An annotated manifest in slot 0 does not make an index a reference index.
        let annotated = manifest_entry(b"A").with_annotations([(
            keys().reference_digest,
            ContentHash::sha256(b"x").to_string(),
        )]);
        let (index, _) = index_of(vec![annotated]);
        assert!(!is_reference_index(&index));
    }

    #[test]
    fn test_insert_entry_dedups() {
        let (index, _) = index_of(vec![manifest_entry(b"A")]);
        let candidate = manifest_entry(b"artifact");

        let first = insert_entry(&index, candidate.clone()).unwrap();
        assert_eq!(first.manifests.len(), index.manifests.len() + 1);

        match insert_entry(&first, candidate) {
            Err(RefsError::DuplicateAttachment { position, .. }) => assert_eq!(position, 1),
            other => panic!("expected duplicate, got {:?}", other),
        }
        assert_eq!(first.manifests.len(), 2);
    }

    #[test]
    fn test_insert_entry_matches_by_digest_only() {
        let candidate = manifest_entry(b"artifact");
        let (index, _) = index_of(vec![candidate.with_annotations([("other", "meta")])]);
        assert!(insert_entry(&index, candidate).is_err());
    }

    #[test]
    fn test_reference_descriptor_carries_triple() {
        let subject = ContentHash::sha256(b"subject");
        let d = reference_descriptor(&manifest_entry(b"art"), &keys(), "cat", &subject, "Picture of cat");
        assert_eq!(d.annotation(&keys().reference_type), Some("cat"));
        assert_eq!(d.annotation(&keys().reference_digest), Some(subject.to_string().as_str()));
        assert_eq!(d.annotation(&keys().reference_description), Some("Picture of cat"));
    }

    #[test]
    fn test_listing_filters_by_subject() {
        let s1 = ContentHash::sha256(b"s1");
        let s2 = ContentHash::sha256(b"s2");
        let a = reference_descriptor(&manifest_entry(b"a"), &keys(), "sbom", &s1, "");
        let b = reference_descriptor(&manifest_entry(b"b"), &keys(), "sig", &s2, "");
        let c = reference_descriptor(&manifest_entry(b"c"), &keys(), "cat", &s1, "Cat");
        let (index, _) = index_of(vec![manifest_entry(b"plain"), a, b, c]);

        let listing = ReferenceListing::new(index.clone(), ReferenceFilter::Subject(s1), keys());
        let found: Vec<_> = listing.iter().map(|e| e.position).collect();
        assert_eq!(found, vec![1, 3]);

        let all = ReferenceListing::new(index, ReferenceFilter::All, keys());
        assert_eq!(all.iter().count(), 3);
    }

    #[test]
    fn test_listing_is_restartable() {
        let s = ContentHash::sha256(b"s");
        let a = reference_descriptor(&manifest_entry(b"a"), &keys(), "t", &s, "d");
        let (index, _) = index_of(vec![a]);
        let listing = ReferenceListing::new(index, ReferenceFilter::All, keys());

        let mut iter = listing.iter();
        let snapshot = iter.clone();
        assert_eq!(iter.next().unwrap().reference_type.as_deref(), Some("t"));
        assert!(iter.next().is_none());
        assert_eq!(snapshot.count(), 1);
        assert_eq!(listing.iter().count(), 1);
    }

    #[test]
    fn test_listing_skips_bad_digests() {
        let bogus = manifest_entry(b"a").with_annotations([(keys().reference_digest, "nope")]);
        let (index, _) = index_of(vec![bogus]);
        let listing = ReferenceListing::new(index, ReferenceFilter::All, keys());
        assert_eq!(listing.iter().count(), 0);
    }

    #[test]
    fn test_empty_listing() {
        assert_eq!(ReferenceListing::empty(keys()).iter().count(), 0);
    }
}
