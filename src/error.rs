//! Error types for the export pipeline.
//!
//! Only abort-class failures (I/O, resource exhaustion) and internal
//! accounting violations are returned as [`Error`]. Content-fit warnings and
//! structural-limit overflows are reported through
//! [`ProgressSink`](crate::progress::ProgressSink) and layout continues.

/// Result type alias for export operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort an export.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The output destination could not be created or written
    #[error("Unable to write output '{path}': {reason}")]
    OutputUnwritable {
        /// Output path (or "<stdout>")
        path: String,
        /// Underlying reason
        reason: String,
    },

    /// Object number or offset bookkeeping mismatch in the serializer
    #[error("Internal error: expected object {expected}, found {found}")]
    Internal {
        /// Object number the serializer expected to emit
        expected: u32,
        /// Object number actually being emitted
        found: u32,
    },

    /// Internal invariant violation that is not tied to an object number
    #[error("Internal error: {0}")]
    InternalState(String),

    /// Object allocator ran out of object numbers
    #[error("Too many objects in document (max: {0})")]
    TooManyObjects(u32),

    /// Image could not be re-encoded
    #[error("Image error: {0}")]
    Image(String),

    /// Embedded font program could not be parsed
    #[error("Font error: {0}")]
    Font(String),

    /// Encryption setup failed
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be decoded
    #[error("Configuration decoding error: {0}")]
    Json(#[from] serde_json::Error),
}
