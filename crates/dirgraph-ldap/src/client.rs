//! ldap3-backed directory client

use async_trait::async_trait;
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::{
    Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, Scope, SearchEntry, SearchStream,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use dirgraph_connector::config::ConnectorConfig;
use dirgraph_connector::error::{ConnectorError, ConnectorResult};
use dirgraph_connector::record::{DirectoryRecord, RawValue};
use dirgraph_connector::traits::{
    BoxedPageStream, DirectoryClient, PageStream, SearchOptions, SearchScope,
};

use crate::config::LdapConfig;
use crate::vendor::DETECTION_ATTRIBUTES;

const LDAP_INVALID_CREDENTIALS: u32 = 49;

/// Directory client speaking LDAP through `ldap3`.
pub struct LdapClient {
    config: LdapConfig,

    display_name: String,

    /// Cached LDAP connection (lazily initialized).
    connection: Arc<RwLock<Option<Ldap>>>,

    disposed: Arc<RwLock<bool>>,
}

impl LdapClient {
    /// Create a client. No connection is made until the first request.
    pub fn new(config: LdapConfig) -> ConnectorResult<Self> {
        config.validate()?;
        config.tls.validate_security();

        let display_name = format!("LDAP: {}", config.host);

        Ok(Self {
            config,
            display_name,
            connection: Arc::new(RwLock::new(None)),
            disposed: Arc::new(RwLock::new(false)),
        })
    }

    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    /// Get an LDAP connection, creating one if necessary.
    async fn get_connection(&self) -> ConnectorResult<Ldap> {
        if *self.disposed.read().await {
            return Err(ConnectorError::Disposed);
        }

        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

        let mut conn_guard = self.connection.write().await;
        if let Some(ref conn) = *conn_guard {
            return Ok(conn.clone());
        }

        let conn = self.create_connection().await?;
        *conn_guard = Some(conn.clone());
        Ok(conn)
    }

    async fn create_connection(&self) -> ConnectorResult<Ldap> {
        let url = self.config.url();
        debug!(url = %url, starttls = self.config.use_starttls, "Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.config.connection.connection_timeout())
            .set_starttls(self.config.use_starttls)
            .set_no_tls_verify(!self.config.tls.verify_certificate);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| {
                ConnectorError::connection_failed_with_source(
                    format!("Failed to connect to LDAP server at {url}"),
                    e,
                )
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        if let Some(bind_dn) = &self.config.bind_dn {
            let bind_password = self.config.bind_password.as_deref().unwrap_or("");
            debug!(bind_dn = %bind_dn, "Performing LDAP bind");

            let result = ldap
                .with_timeout(self.config.connection.operation_timeout())
                .simple_bind(bind_dn, bind_password)
                .await
                .map_err(|e| {
                    ConnectorError::connection_failed_with_source(
                        format!("LDAP bind failed for {bind_dn}"),
                        e,
                    )
                })?;

            if result.rc == LDAP_INVALID_CREDENTIALS {
                return Err(ConnectorError::AuthenticationFailed);
            }
            if result.rc != 0 {
                return Err(ConnectorError::connection_failed(format!(
                    "LDAP bind failed with code {}: {}",
                    result.rc, result.text
                )));
            }
        }

        info!(host = %self.config.host, "LDAP connection established");
        Ok(ldap)
    }

    /// Unbind and drop the cached connection. Later requests fail.
    pub async fn dispose(&self) -> ConnectorResult<()> {
        *self.disposed.write().await = true;

        let mut conn_guard = self.connection.write().await;
        if let Some(mut ldap) = conn_guard.take() {
            if let Err(e) = ldap.unbind().await {
                warn!(error = %e, "Error during LDAP unbind");
            }
        }

        info!(client = %self.display_name, "LDAP client disposed");
        Ok(())
    }

    fn operation_error(&self, context: &str, error: LdapError) -> ConnectorError {
        map_ldap_error(context, error, self.config.connection.operation_timeout_secs)
    }

    fn requested_attributes(options: &SearchOptions) -> Vec<String> {
        if options.attributes.is_empty() {
            vec!["*".to_string()]
        } else {
            options.attributes.clone()
        }
    }
}

/// Classify an ldap3 failure. Broken transports are network errors so callers
/// can tell them apart from rejected operations.
fn map_ldap_error(context: &str, error: LdapError, timeout_secs: u64) -> ConnectorError {
    match error {
        LdapError::Timeout { .. } => ConnectorError::ConnectionTimeout { timeout_secs },
        LdapError::Io { .. } | LdapError::EndOfStream => {
            ConnectorError::network_with_source(context.to_string(), error)
        }
        other => ConnectorError::operation_failed_with_source(context.to_string(), other),
    }
}

/// Page size for the paged results control, which carries a signed 32-bit size.
fn paged_results_size(page_size: u32) -> i32 {
    i32::try_from(page_size).unwrap_or(i32::MAX)
}

fn ldap_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

/// Convert an ldap3 entry into a raw record.
fn entry_to_record(entry: SearchEntry) -> DirectoryRecord {
    let mut attributes: HashMap<String, Vec<RawValue>> = HashMap::new();

    for (name, values) in entry.attrs {
        attributes
            .entry(name)
            .or_default()
            .extend(values.into_iter().map(RawValue::Text));
    }

    for (name, values) in entry.bin_attrs {
        attributes
            .entry(name)
            .or_default()
            .extend(values.into_iter().map(RawValue::Binary));
    }

    DirectoryRecord::from_parts(entry.dn, attributes)
}

fn check_result(result: LdapResult, context: &str) -> ConnectorResult<()> {
    result.success().map(|_| ()).map_err(|e| {
        ConnectorError::operation_failed_with_source(context.to_string(), e)
    })
}

#[async_trait]
impl DirectoryClient for LdapClient {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    #[instrument(skip(self, options), fields(filter = %options.filter, scope = %options.scope))]
    async fn search(
        &self,
        base_dn: &str,
        options: &SearchOptions,
    ) -> ConnectorResult<Vec<DirectoryRecord>> {
        let mut ldap = self.get_connection().await?;

        let result = ldap
            .with_timeout(self.config.connection.operation_timeout())
            .search(
                base_dn,
                ldap_scope(options.scope),
                &options.filter,
                Self::requested_attributes(options),
            )
            .await
            .map_err(|e| self.operation_error("LDAP search failed", e))?;

        let (entries, _) = result.success().map_err(|e| {
            ConnectorError::operation_failed_with_source("LDAP search failed", e)
        })?;

        let records: Vec<DirectoryRecord> = entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(entry_to_record)
            .collect();

        debug!(count = records.len(), "LDAP search completed");
        Ok(records)
    }

    #[instrument(skip(self, options), fields(filter = %options.filter, scope = %options.scope))]
    async fn search_paginated(
        &self,
        base_dn: &str,
        options: &SearchOptions,
    ) -> ConnectorResult<BoxedPageStream> {
        let mut ldap = self.get_connection().await?;
        let page_size = options.page_size.unwrap_or(self.config.page_size).max(1);

        let adapters: Vec<Box<dyn Adapter<'static, String, Vec<String>>>> = vec![
            Box::new(EntriesOnly::new()),
            Box::new(PagedResults::new(paged_results_size(page_size))),
        ];

        let search = ldap
            .with_timeout(self.config.connection.operation_timeout())
            .streaming_search_with(
                adapters,
                base_dn,
                ldap_scope(options.scope),
                &options.filter,
                Self::requested_attributes(options),
            )
            .await
            .map_err(|e| self.operation_error("LDAP paged search failed", e))?;

        debug!(page_size, "Started paged LDAP search");

        Ok(Box::new(LdapPageStream {
            search: Some(search),
            page_size: page_size as usize,
            timeout_secs: self.config.connection.operation_timeout_secs,
        }))
    }

    #[instrument(skip(self))]
    async fn root_record(&self) -> ConnectorResult<Option<DirectoryRecord>> {
        let mut ldap = self.get_connection().await?;

        let result = ldap
            .with_timeout(self.config.connection.operation_timeout())
            .search("", Scope::Base, "(objectClass=*)", DETECTION_ATTRIBUTES.to_vec())
            .await
            .map_err(|e| self.operation_error("Root DSE read failed", e))?;

        let (entries, _) = result.success().map_err(|e| {
            ConnectorError::operation_failed_with_source("Root DSE read failed", e)
        })?;

        Ok(entries
            .into_iter()
            .next()
            .map(|entry| entry_to_record(SearchEntry::construct(entry))))
    }
}

/// Regroups a streamed paged search into pages.
struct LdapPageStream {
    search: Option<SearchStream<'static, String, Vec<String>>>,
    page_size: usize,
    timeout_secs: u64,
}

#[async_trait]
impl PageStream for LdapPageStream {
    async fn next_page(&mut self) -> ConnectorResult<Option<Vec<DirectoryRecord>>> {
        let Some(search) = self.search.as_mut() else {
            return Ok(None);
        };

        let timeout_secs = self.timeout_secs;
        let mut page = Vec::with_capacity(self.page_size);
        let mut finished = None;

        while page.len() < self.page_size {
            let entry = search
                .next()
                .await
                .map_err(|e| map_ldap_error("LDAP paged search failed", e, timeout_secs))?;

            match entry {
                Some(entry) => page.push(entry_to_record(SearchEntry::construct(entry))),
                None => {
                    finished = Some(search.finish().await);
                    break;
                }
            }
        }

        if let Some(result) = finished {
            self.search = None;
            check_result(result, "LDAP paged search failed")?;
        }

        if page.is_empty() {
            Ok(None)
        } else {
            Ok(Some(page))
        }
    }
}

impl std::fmt::Debug for LdapClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapClient")
            .field("display_name", &self.display_name)
            .field("config", &self.config.redacted())
            .finish()
    }
}
