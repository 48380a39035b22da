//! Folio Error - Unified Error Types
//!
//! Error handling for every Folio operation. Errors are grouped by the stage
//! that raises them: setup (configuration, connectivity), document operations
//! (writes, filters, updates, indexes), aggregation and blob storage.
//!
//! Key Features:
//! - Variants named after the failure a caller has to react to
//! - Fatal vs document-level classification for the driver loop
//! - Conversions from std::io, serde_json and toml errors
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Unified error type for all Folio operations.
#[derive(Error, Debug)]
pub enum FolioError {
    // Setup errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection error: {0}")]
    Connect(String),

    // Document errors
    #[error("write error: {0}")]
    Write(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    #[error("invalid index: {0}")]
    InvalidIndex(String),

    // Aggregation errors
    #[error("pipeline error: {0}")]
    Pipeline(String),

    // Large-object errors
    #[error("blob store error: {0}")]
    BlobStore(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("serialization error: {0}")]
    Serialization(String),
}

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for Folio operations.
pub type Result<T> = std::result::Result<T, FolioError>;

// =============================================================================
// Conversions
// =============================================================================

impl From<serde_json::Error> for FolioError {
    fn from(err: serde_json::Error) -> Self {
        FolioError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for FolioError {
    fn from(err: toml::de::Error) -> Self {
        FolioError::Config(err.to_string())
    }
}

// =============================================================================
// Error Classification
// =============================================================================

impl FolioError {
    /// Returns true if the run cannot continue (no store access is possible).
    pub fn is_fatal(&self) -> bool {
        matches!(self, FolioError::Config(_) | FolioError::Connect(_))
    }

    /// Returns true if the error concerns a single document operation and
    /// independent operations may proceed.
    pub fn is_document_error(&self) -> bool {
        matches!(
            self,
            FolioError::Write(_)
                | FolioError::InvalidFilter(_)
                | FolioError::InvalidUpdate(_)
                | FolioError::InvalidIndex(_)
        )
    }

    /// Short name of the error kind, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            FolioError::Config(_) => "ConfigError",
            FolioError::Connect(_) => "ConnectError",
            FolioError::Write(_) => "WriteError",
            FolioError::InvalidFilter(_) => "FilterError",
            FolioError::InvalidUpdate(_) => "UpdateError",
            FolioError::InvalidIndex(_) => "IndexError",
            FolioError::Pipeline(_) => "PipelineError",
            FolioError::BlobStore(_) => "BlobStoreError",
            FolioError::Io(_) => "IoError",
            FolioError::Serialization(_) => "SerializationError",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
