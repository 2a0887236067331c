//! Unified error handling for xrlevel
//!
//! Every fatal condition raised while decoding or encoding a level file is
//! one of these variants. Non-fatal findings are not errors; they travel in
//! [`crate::Diagnostics`] next to the decoded document instead.

use thiserror::Error;

use crate::types::{ChunkRole, CompanionKind};

/// Unified error type for all xrlevel operations
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ==================== Format Errors ====================

    /// Header version outside the known set, or an encode target that
    /// cannot represent the document
    #[error("Unsupported version: {version} ({reason})")]
    UnsupportedVersion {
        version: u32,
        reason: String,
    },

    /// A chunk required by the resolved schema is absent
    #[error("Missing chunk: {role} (tag 0x{tag:X})")]
    MissingChunk {
        role: ChunkRole,
        tag: u32,
    },

    /// A companion geometry file required by the version is absent
    #[error("Missing companion file: {kind}")]
    MissingCompanion {
        kind: CompanionKind,
    },

    /// Payload length is not a multiple of the expected record size
    #[error("Malformed {what} buffer: {len} bytes is not a multiple of {record_size}")]
    MalformedBuffer {
        what: &'static str,
        len: usize,
        record_size: usize,
    },

    /// Cross-reference index out of range
    #[error("Dangling {what} reference: index {index} out of {count}")]
    DanglingReference {
        what: &'static str,
        index: u32,
        count: usize,
    },

    /// Cursor read past the end of a payload
    #[error("Buffer underrun at offset {offset}: requested {requested} bytes, available {available}")]
    BufferUnderrun {
        offset: usize,
        requested: usize,
        available: usize,
    },

    /// Primary and companion file versions disagree
    #[error("Version mismatch: level is v{primary}, companion is v{companion}")]
    VersionMismatch {
        primary: u16,
        companion: u16,
    },

    /// Structurally invalid data that is not covered by a more specific variant
    #[error("Invalid data: {message}")]
    InvalidData {
        message: String,
    },

    // ==================== General Errors ====================

    /// Error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

/// Result type using the unified Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Error::InvalidData {
            message: message.into(),
        }
    }

    /// Create an unsupported version error
    pub fn unsupported_version(version: u32, reason: impl Into<String>) -> Self {
        Error::UnsupportedVersion {
            version,
            reason: reason.into(),
        }
    }

    /// The innermost error, with every context layer peeled off
    pub fn root(&self) -> &Error {
        match self {
            Error::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// The chunk role a `MissingChunk` error refers to, looking through context
    pub fn missing_role(&self) -> Option<ChunkRole> {
        match self.root() {
            Error::MissingChunk { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// Check if this is a format-integrity error (as opposed to I/O)
    pub fn is_format_error(&self) -> bool {
        !matches!(self.root(), Error::Io(_))
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_context() {
        let err = Error::MissingChunk { role: ChunkRole::Sectors, tag: 0x8 };
        let contextualized = err.with_context("decoding level.ltx");

        let text = contextualized.to_string();
        assert!(text.contains("decoding level.ltx"));
        assert!(text.contains("SECTORS"));
    }

    #[test]
    fn test_missing_role_through_context() {
        let err = Error::MissingChunk { role: ChunkRole::Glows, tag: 0x7 }
            .with_context("outer")
            .with_context("outermost");

        assert_eq!(err.missing_role(), Some(ChunkRole::Glows));
        assert!(matches!(err.root(), Error::MissingChunk { .. }));
    }

    #[test]
    fn test_is_format_error() {
        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(!io.is_format_error());
        assert!(Error::invalid_data("bad").is_format_error());
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::VersionMismatch { primary: 14, companion: 13 });
        let with_context = result.context("loading geom");

        let err = with_context.unwrap_err();
        assert!(err.to_string().contains("loading geom"));
        assert!(matches!(err.root(), Error::VersionMismatch { primary: 14, companion: 13 }));
    }
}
