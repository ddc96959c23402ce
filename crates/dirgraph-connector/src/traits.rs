//! Directory client traits
//!
//! The sync pipeline only ever talks to a directory through these traits. The
//! protocol exchange, paging controls and timeouts are the client's business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ConnectorResult;
use crate::record::DirectoryRecord;

/// Search scope relative to the base DN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// Only the base entry itself.
    Base,
    /// Immediate children of the base entry.
    #[serde(alias = "one", alias = "one_level")]
    OneLevel,
    /// The base entry and its whole subtree.
    #[default]
    #[serde(alias = "sub")]
    Subtree,
}

impl std::fmt::Display for SearchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchScope::Base => write!(f, "base"),
            SearchScope::OneLevel => write!(f, "onelevel"),
            SearchScope::Subtree => write!(f, "subtree"),
        }
    }
}

/// Parameters for a directory search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Search scope.
    pub scope: SearchScope,
    /// LDAP filter string (RFC 4515).
    pub filter: String,
    /// Attributes to return. Empty means all user attributes.
    pub attributes: Vec<String>,
    /// Page size hint for paginated searches.
    pub page_size: Option<u32>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            scope: SearchScope::Subtree,
            filter: "(objectClass=*)".to_string(),
            attributes: Vec::new(),
            page_size: None,
        }
    }
}

impl SearchOptions {
    /// Create options with the given scope and filter.
    pub fn new(scope: SearchScope, filter: impl Into<String>) -> Self {
        Self {
            scope,
            filter: filter.into(),
            ..Default::default()
        }
    }

    /// Set the attributes to return.
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the page size hint.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

/// A lazy sequence of result pages.
///
/// Each call to [`PageStream::next_page`] fetches at most one page from the
/// server. `Ok(None)` marks the end of the result set.
#[async_trait]
pub trait PageStream: Send {
    /// Fetch the next page of records.
    async fn next_page(&mut self) -> ConnectorResult<Option<Vec<DirectoryRecord>>>;
}

/// Boxed page stream returned by [`DirectoryClient::search_paginated`].
pub type BoxedPageStream = Box<dyn PageStream>;

/// Read access to a directory server.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Get the display name for this client (used in logs).
    fn display_name(&self) -> &str;

    /// Run a search and return every matching record at once.
    ///
    /// Only suitable for small result sets.
    async fn search(
        &self,
        base_dn: &str,
        options: &SearchOptions,
    ) -> ConnectorResult<Vec<DirectoryRecord>>;

    /// Run a search and return the results page by page.
    async fn search_paginated(
        &self,
        base_dn: &str,
        options: &SearchOptions,
    ) -> ConnectorResult<BoxedPageStream>;

    /// Read the directory's self-describing root record (root DSE).
    ///
    /// Returns `Ok(None)` when the server does not expose one.
    async fn root_record(&self) -> ConnectorResult<Option<DirectoryRecord>>;
}
