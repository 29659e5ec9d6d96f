//! Error types for the fixity engine.
//!
//! Checksum mismatches and digest failures are *not* errors at the
//! verifier boundary: they are recorded in the ledger as failed records.
//! Only failures that stop the state machine from advancing surface here.

/// Result type for fixity operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed source error carried by [`Error::StorageIo`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Fixity errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Object is absent from the object store.
    #[error("object not found: {object}")]
    NotFound { object: String },

    /// Object exceeds the configured size cap.
    #[error(
        "max object size exceeded: {object}={size} bytes ({:.2} GiB) max={max} bytes ({:.2} GiB)",
        gib(.size),
        gib(.max)
    )]
    TooLarge { object: String, size: u64, max: u64 },

    /// Stream ended with a different byte count than the object metadata reported.
    #[error("bytes read do not match object size: {object} expected={expected} read={read}")]
    SizeMismatch {
        object: String,
        expected: u64,
        read: u64,
    },

    /// Transient or terminal fault in a storage dependency.
    #[error("storage I/O error in {context}: {source}")]
    StorageIo {
        context: String,
        #[source]
        source: BoxError,
    },

    /// No ledger record exists for the object.
    #[error("checksum record not found: {object}")]
    RecordNotFound { object: String },

    /// Object reference failed validation.
    #[error("invalid object reference: {0}")]
    InvalidObject(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

fn gib(bytes: &u64) -> f64 {
    *bytes as f64 / (1024.0 * 1024.0 * 1024.0)
}

impl Error {
    pub fn not_found(object: impl ToString) -> Self {
        Self::NotFound {
            object: object.to_string(),
        }
    }

    pub fn too_large(object: impl ToString, size: u64, max: u64) -> Self {
        Self::TooLarge {
            object: object.to_string(),
            size,
            max,
        }
    }

    pub fn size_mismatch(object: impl ToString, expected: u64, read: u64) -> Self {
        Self::SizeMismatch {
            object: object.to_string(),
            expected,
            read,
        }
    }

    pub fn record_not_found(object: impl ToString) -> Self {
        Self::RecordNotFound {
            object: object.to_string(),
        }
    }

    pub fn invalid_object(reason: impl Into<String>) -> Self {
        Self::InvalidObject(reason.into())
    }

    /// Wrap a backend failure with the operation it interrupted.
    pub fn storage(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::StorageIo {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Whether re-delivering the unit of work may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StorageIo { .. })
    }
}

/// Extension for mapping backend `anyhow` results into [`Error::StorageIo`].
pub(crate) trait StorageResultExt<T> {
    fn storage_context<C: Into<String>>(self, context: C) -> Result<T>;
}

impl<T> StorageResultExt<T> for anyhow::Result<T> {
    fn storage_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| Error::storage(context, e))
    }
}
