//! OCI reference graph support.
//!
//! Attaches artifacts to images and image indexes in an OCI registry,
//! promotes plain indexes to reference indexes, and lists what has been
//! attached.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      ReferenceEngine                          │
//! │   attach / attach_to_index / promote_index / list_references │
//! └───────────────┬──────────────────────────────┬───────────────┘
//!                 │ pure graph operations        │ I/O
//!      ┌──────────▼──────────┐        ┌──────────▼──────────┐
//!      │ refindex / mutate   │        │  RegistryGateway    │
//!      │ manifest / digest   │        │  Remote | Memory    │
//!      └─────────────────────┘        └─────────────────────┘
//! ```
//!
//! A reference index is an image index whose first entry points at the
//! original index (annotated `reference.description = "self"`) and whose
//! remaining entries are artifacts, each annotated with the digest of
//! the manifest it describes.

pub mod credentials;
mod descriptor;
mod digest;
pub mod engine;
mod manifest;
pub mod memory;
mod mutate;
pub mod reference;
pub mod refindex;
pub mod registry;

pub use credentials::{Credential, CredentialStore};
pub use descriptor::{Blob, Descriptor, Platform};
pub use digest::{Algorithm, ContentHash};
pub use engine::{
    Artifact, AttachOutcome, IndexTarget, PromoteOutcome, ReferenceEngine, ReferenceIndexPlan,
};
pub use manifest::{
    is_index_media_type, is_manifest_media_type, Document, DocumentKind, ImageIndex,
    ImageManifest, Resolved, ACCEPTED_MEDIA_TYPES, DOCKER_MANIFEST_LIST_MEDIA_TYPE,
    DOCKER_MANIFEST_MEDIA_TYPE, OCI_CONFIG_MEDIA_TYPE, OCI_INDEX_MEDIA_TYPE,
    OCI_MANIFEST_MEDIA_TYPE,
};
pub use memory::MemoryRegistry;
pub use mutate::{ArtifactManifest, Layer};
pub use reference::ImageReference;
pub use refindex::{
    insert_entry, is_reference_index, promote, reference_descriptor, Promotion, ReferenceEntry,
    ReferenceFilter, ReferenceListing, References, SELF_REFERENCE_DESCRIPTION,
};
pub use registry::{RegistryAuth, RegistryGateway, RemoteRegistry};
