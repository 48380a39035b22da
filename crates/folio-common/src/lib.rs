//! Folio Common - Shared Types and Utilities
//!
//! Foundational error handling, configuration and helper functions shared by
//! the Folio document layer and its command-line driver.
//!
//! Key Features:
//! - Unified error type with fatal vs document-level classification
//! - Connection descriptor parsing and validation
//! - Layered client configuration (defaults, TOML, environment)
//! - Checksums and human-readable formatting helpers
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod config;
pub mod error;
pub mod utils;

pub use config::{ClientConfig, ConnectionDescriptor};
pub use error::{FolioError, Result};
