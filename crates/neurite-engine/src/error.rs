//! Error types for the inference engine

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur while loading or evaluating a model
#[derive(Error, Debug)]
pub enum ModelError {
    /// Model source could not be opened
    #[error("failed to open model source: {source}")]
    OpenFile {
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Short read or failed seek
    #[error("short read or bad seek at offset {offset}")]
    ReadFile {
        /// Offset at which the read or seek failed
        offset: u64,
    },

    /// Magic, type byte or byte-order mark mismatch
    #[error("bad file format: {reason}")]
    BadFileFormat {
        /// Why the file was rejected
        reason: String,
    },

    /// Checksum failure or structurally impossible data
    #[error("inconsistent model data: {reason}")]
    InconsistentData {
        /// Why the data is inconsistent
        reason: String,
    },

    /// Arena allocation failed
    #[error("allocation of {bytes} bytes for the model arena failed")]
    MemoryAllocation {
        /// Requested allocation size
        bytes: usize,
    },

    /// Capability disabled at build time or unsupported element width
    #[error("feature not supported: {reason}")]
    FeatureNotSupported {
        /// The missing capability
        reason: String,
    },

    /// Caller-supplied argument does not fit the model
    #[error("bad argument: {reason}")]
    BadArgument {
        /// What was wrong with the argument
        reason: String,
    },
}

impl ModelError {
    /// Create a bad-file-format error
    pub fn bad_format(reason: impl Into<String>) -> Self {
        Self::BadFileFormat {
            reason: reason.into(),
        }
    }

    /// Create an inconsistent-data error
    pub fn inconsistent(reason: impl Into<String>) -> Self {
        Self::InconsistentData {
            reason: reason.into(),
        }
    }

    /// Create a feature-not-supported error
    pub fn not_supported(reason: impl Into<String>) -> Self {
        Self::FeatureNotSupported {
            reason: reason.into(),
        }
    }

    /// Create a bad-argument error
    pub fn bad_argument(reason: impl Into<String>) -> Self {
        Self::BadArgument {
            reason: reason.into(),
        }
    }

    /// Stable numeric code for embedded callers; 0 is reserved for success
    pub fn code(&self) -> u8 {
        match self {
            Self::OpenFile { .. } => 1,
            Self::ReadFile { .. } => 2,
            Self::BadFileFormat { .. } => 3,
            Self::InconsistentData { .. } => 4,
            Self::MemoryAllocation { .. } => 5,
            Self::FeatureNotSupported { .. } => 6,
            Self::BadArgument { .. } => 7,
        }
    }
}
