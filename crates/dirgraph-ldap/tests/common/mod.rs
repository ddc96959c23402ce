//! Common test utilities for dirgraph-ldap integration tests.
//!
//! Provides an in-memory directory client serving canned records page by
//! page, plus record factories for the usual entry shapes.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use dirgraph_connector::error::{ConnectorError, ConnectorResult};
use dirgraph_connector::record::DirectoryRecord;
use dirgraph_connector::traits::{BoxedPageStream, DirectoryClient, PageStream, SearchOptions};

static INIT: Once = Once::new();

/// Initialize logging for tests (once).
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

pub const PEOPLE_DN: &str = "ou=people,dc=example,dc=com";
pub const GROUPS_DN: &str = "ou=groups,dc=example,dc=com";

/// A directory held in memory.
///
/// Records are registered per base DN and served in pages of `page_size`.
pub struct MemoryDirectory {
    root: Option<DirectoryRecord>,
    fail_root: bool,
    entries: HashMap<String, Vec<DirectoryRecord>>,
    failing_bases: HashSet<String>,
    page_size: usize,
    /// Stop answering after this many pages.
    stall_after: Option<usize>,
    pages_requested: Arc<AtomicUsize>,
    root_reads: Arc<AtomicUsize>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            root: None,
            fail_root: false,
            entries: HashMap::new(),
            failing_bases: HashSet::new(),
            page_size: 2,
            stall_after: None,
            pages_requested: Arc::new(AtomicUsize::new(0)),
            root_reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_root(mut self, root: DirectoryRecord) -> Self {
        self.root = Some(root);
        self
    }

    pub fn with_failing_root(mut self) -> Self {
        self.fail_root = true;
        self
    }

    pub fn with_entries(mut self, base_dn: &str, records: Vec<DirectoryRecord>) -> Self {
        self.entries
            .entry(base_dn.to_lowercase())
            .or_default()
            .extend(records);
        self
    }

    pub fn with_failing_base(mut self, base_dn: &str) -> Self {
        self.failing_bases.insert(base_dn.to_lowercase());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn stalling_after(mut self, pages: usize) -> Self {
        self.stall_after = Some(pages);
        self
    }

    /// Counter of `next_page` calls across all searches.
    pub fn pages_requested(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.pages_requested)
    }

    pub fn root_reads(&self) -> usize {
        self.root_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    fn display_name(&self) -> &str {
        "memory"
    }

    async fn search(
        &self,
        base_dn: &str,
        _options: &SearchOptions,
    ) -> ConnectorResult<Vec<DirectoryRecord>> {
        if self.failing_bases.contains(&base_dn.to_lowercase()) {
            return Err(ConnectorError::operation_failed("rc=32 noSuchObject"));
        }
        Ok(self
            .entries
            .get(&base_dn.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn search_paginated(
        &self,
        base_dn: &str,
        options: &SearchOptions,
    ) -> ConnectorResult<BoxedPageStream> {
        let records = self.search(base_dn, options).await?;
        let page_size = options
            .page_size
            .map(|size| size as usize)
            .unwrap_or(self.page_size)
            .max(1);

        let pages: VecDeque<Vec<DirectoryRecord>> = records
            .chunks(page_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        Ok(Box::new(MemoryPageStream {
            pages,
            served: 0,
            stall_after: self.stall_after,
            pages_requested: Arc::clone(&self.pages_requested),
        }))
    }

    async fn root_record(&self) -> ConnectorResult<Option<DirectoryRecord>> {
        self.root_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_root {
            return Err(ConnectorError::connection_failed("connection refused"));
        }
        Ok(self.root.clone())
    }
}

struct MemoryPageStream {
    pages: VecDeque<Vec<DirectoryRecord>>,
    served: usize,
    stall_after: Option<usize>,
    pages_requested: Arc<AtomicUsize>,
}

#[async_trait]
impl PageStream for MemoryPageStream {
    async fn next_page(&mut self) -> ConnectorResult<Option<Vec<DirectoryRecord>>> {
        self.pages_requested.fetch_add(1, Ordering::SeqCst);
        if self.stall_after.is_some_and(|limit| self.served >= limit) {
            std::future::pending::<()>().await;
        }
        self.served += 1;
        Ok(self.pages.pop_front())
    }
}

/// A person entry below [`PEOPLE_DN`].
pub fn person(uid: &str) -> DirectoryRecord {
    DirectoryRecord::new(format!("uid={uid},{PEOPLE_DN}"))
        .with("uid", uid)
        .with("cn", format!("{uid} cn"))
        .with("mail", format!("{uid}@example.com"))
}

/// A group entry below [`GROUPS_DN`].
pub fn group(cn: &str) -> DirectoryRecord {
    DirectoryRecord::new(format!("cn={cn},{GROUPS_DN}")).with("cn", cn)
}

pub fn person_dn(uid: &str) -> String {
    format!("uid={uid},{PEOPLE_DN}")
}

pub fn group_dn(cn: &str) -> String {
    format!("cn={cn},{GROUPS_DN}")
}
