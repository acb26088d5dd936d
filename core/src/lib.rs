//! A3S Refs Core - Foundational Types
//!
//! Error taxonomy and configuration shared by the reference graph engine
//! and the command-line surface.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{LogLevel, ReferenceAnnotationKeys, RefsConfig};
pub use error::{RefsError, Result, ResultExt};

/// A3S Refs version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
