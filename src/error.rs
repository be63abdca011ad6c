//! Error types for fleet-sync.

use std::fmt;
use std::time::Duration;

/// Result type alias for fleet-sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while loading, reconciling or propagating configuration.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Failed to load local settings from a source.
    #[error("Failed to load settings: {0}")]
    Load(String),

    /// Failed to deserialize settings or a snapshot payload.
    #[error("Failed to deserialize configuration: {0}")]
    Deserialization(String),

    /// Settings failed validation.
    #[error("Settings validation failed: {0}")]
    Validation(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration blob exceeded the checksum size limit.
    #[error("Configuration blob of {size} bytes exceeds the {limit} byte limit")]
    BlobTooLarge {
        /// Size of the rejected blob in bytes
        size: usize,
        /// Maximum accepted size in bytes
        limit: usize,
    },

    /// The snapshot store rejected or failed a request.
    #[error("Snapshot store error: {0}")]
    Store(#[from] StoreError),

    /// Publishing to or subscribing on the broadcast bus failed.
    #[error("Broadcast error: {0}")]
    Broadcast(String),

    /// The staging override file could not be applied.
    #[error("Staging override error: {0}")]
    Staging(String),

    /// Generic error for other cases.
    #[error("Sync error: {0}")]
    Other(String),
}

/// Errors returned by a [`SnapshotStore`](crate::store::SnapshotStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or answered with a server error.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The request did not complete within the configured bound.
    #[error("store request timed out after {0:?}")]
    Timeout(Duration),

    /// The store refused this instance's credentials.
    #[error("invalid store credentials: {0}")]
    InvalidCredentials(String),

    /// A POST lost an optimistic concurrency race against another instance.
    #[error("snapshot conflict: expected latest {expected:?}, store has {actual:?}")]
    Conflict {
        /// Checksum this instance believed was latest
        expected: Option<String>,
        /// Checksum the store actually holds as latest
        actual: Option<String>,
    },

    /// The store answered with a body that could not be interpreted.
    #[error("invalid store response: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    /// Whether this error must stop the sync flow instead of degrading to "unchanged".
    pub fn is_fatal_to_sync(&self) -> bool {
        matches!(self, Self::InvalidCredentials(_))
    }
}

/// Validation error for live settings.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Collapse a list of errors, returning `Ok` when it is empty.
    pub fn from_list(mut errors: Vec<ValidationError>) -> std::result::Result<(), Self> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for SyncError {
    fn from(err: ValidationError) -> Self {
        SyncError::Validation(err.to_string())
    }
}
