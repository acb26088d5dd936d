use thiserror::Error;

/// A3S Refs error types
#[derive(Error, Debug)]
pub enum RefsError {
    /// Malformed image reference string
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Registry unreachable, auth rejected or similar while resolving
    #[error("Failed to resolve {reference}: {message}")]
    ResolutionFailure { reference: String, message: String },

    /// The registry answered but holds no manifest under the reference
    #[error("Manifest not found: {0}")]
    NotFound(String),

    /// Resolved bytes are not a valid manifest or index
    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),

    /// The candidate digest is already listed in the target index
    #[error("Already attached: {digest} is listed at .manifests[{position}]")]
    DuplicateAttachment { digest: String, position: usize },

    /// Attach-to-index requested on an index without entries
    #[error("Index {0} has no entries to attach to")]
    EmptyIndex(String),

    /// Resolved document kind does not fit the operation
    #[error("Expected {expected}, found {found}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Container registry write error
    #[error("Registry error: {registry} - {message}")]
    RegistryError { registry: String, message: String },

    /// Timeout error
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error annotated with the operation that produced it
    #[error("{operation}: {source}")]
    Context {
        operation: String,
        #[source]
        source: Box<RefsError>,
    },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl RefsError {
    /// Strip any operation context and return the underlying error.
    pub fn root(&self) -> &RefsError {
        match self {
            RefsError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error is a user-facing conflict rather than a failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self.root(), RefsError::DuplicateAttachment { .. })
    }
}

impl From<serde_json::Error> for RefsError {
    fn from(err: serde_json::Error) -> Self {
        RefsError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for RefsError {
    fn from(err: serde_yaml::Error) -> Self {
        RefsError::SerializationError(err.to_string())
    }
}

/// Result type alias for A3S Refs operations
pub type Result<T> = std::result::Result<T, RefsError>;

/// Attach the name of the failing operation to an error.
pub trait ResultExt<T> {
    fn context(self, operation: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, operation: impl Into<String>) -> Result<T> {
        self.map_err(|source| RefsError::Context {
            operation: operation.into(),
            source: Box::new(source),
        })
    }
}
