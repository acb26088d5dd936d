//! A3S Refs Runtime - reference graph engine.
//!
//! Builds, mutates and queries content-addressed manifests and indexes,
//! and attaches artifacts to images through a registry gateway.

#![allow(clippy::result_large_err)]

pub mod oci;

// Re-export common types
pub use oci::{Artifact, AttachOutcome, IndexTarget, PromoteOutcome, ReferenceEngine};
pub use oci::{ContentHash, Descriptor, Document, ImageIndex, ImageManifest, Resolved};
pub use oci::{CredentialStore, ImageReference, MemoryRegistry, RegistryAuth, RegistryGateway, RemoteRegistry};
pub use oci::{ReferenceEntry, ReferenceFilter, ReferenceListing};

/// A3S Refs Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
