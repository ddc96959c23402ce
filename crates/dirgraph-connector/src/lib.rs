//! # Directory Connector Framework
//!
//! Core abstractions for reading identity data out of directory services.
//!
//! The sync pipeline in `dirgraph-ldap` is written against the traits in this
//! crate, never against a concrete protocol client:
//!
//! - [`DirectoryClient`](traits::DirectoryClient) - search, paged search and root DSE reads
//! - [`PageStream`](traits::PageStream) - a lazy sequence of result pages
//! - [`DirectoryRecord`](record::DirectoryRecord) - one raw entry with its attributes
//!
//! ## Crate Organization
//!
//! - [`error`] - Error types with transient/permanent classification
//! - [`record`] - Raw directory records and attribute values
//! - [`traits`] - Client traits and search options
//! - [`config`] - Configuration trait, connection and TLS settings

pub mod config;
pub mod error;
pub mod record;
pub mod traits;

/// Prelude module for convenient imports.
///
/// ```
/// use dirgraph_connector::prelude::*;
/// ```
pub mod prelude {
    // Error handling
    pub use crate::error::{ConnectorError, ConnectorResult};

    // Records
    pub use crate::record::{DirectoryRecord, RawValue};

    // Traits
    pub use crate::traits::{
        BoxedPageStream, DirectoryClient, PageStream, SearchOptions, SearchScope,
    };

    // Configuration
    pub use crate::config::{ConnectionSettings, ConnectorConfig, TlsConfig};
}

// Re-export async_trait for client implementors
pub use async_trait::async_trait;
