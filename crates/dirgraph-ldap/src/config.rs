//! LDAP sync configuration
//!
//! Connection settings for the ldap3 client plus the per-kind query
//! definitions that drive a sync run. Everything here is plain serde data and
//! can be loaded from YAML.

use serde::{Deserialize, Serialize};
use std::path::Path;

use dirgraph_connector::config::{ConnectionSettings, ConnectorConfig, TlsConfig};
use dirgraph_connector::error::{ConnectorError, ConnectorResult};
use dirgraph_connector::traits::{SearchOptions, SearchScope};

use crate::error::{SyncError, SyncResult};

/// Configuration for the ldap3-backed directory client.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// LDAP server hostname or IP address.
    pub host: String,

    /// LDAP server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Use LDAPS.
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on plain LDAP connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Bind DN. Anonymous when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_dn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub tls: TlsConfig,

    /// Page size used when a query does not set its own.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("connection", &self.connection)
            .field("tls", &self.tls)
            .field("page_size", &self.page_size)
            .finish()
    }
}

fn default_ldap_port() -> u16 {
    389
}

fn default_page_size() -> u32 {
    500
}

impl LdapConfig {
    /// Create a config for an anonymous plain LDAP connection.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            use_ssl: false,
            use_starttls: false,
            bind_dn: None,
            bind_password: None,
            connection: ConnectionSettings::default(),
            tls: TlsConfig::default(),
            page_size: default_page_size(),
        }
    }

    /// Bind with the given credentials.
    pub fn with_credentials(
        mut self,
        bind_dn: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.bind_dn = Some(bind_dn.into());
        self.bind_password = Some(password.into());
        self
    }

    /// Enable LDAPS.
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self.port = 636;
        self
    }

    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.use_starttls = true;
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Get the LDAP URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

impl ConnectorConfig for LdapConfig {
    fn validate(&self) -> ConnectorResult<()> {
        if self.host.trim().is_empty() {
            return Err(ConnectorError::invalid_configuration("host is required"));
        }

        if self.use_ssl && self.use_starttls {
            return Err(ConnectorError::invalid_configuration(
                "cannot use both SSL and STARTTLS",
            ));
        }

        if self.page_size == 0 {
            return Err(ConnectorError::invalid_configuration(
                "page_size must be greater than zero",
            ));
        }

        if self.bind_password.is_some() && self.bind_dn.is_none() {
            return Err(ConnectorError::invalid_configuration(
                "bind_password is set without bind_dn",
            ));
        }

        Ok(())
    }

    fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.bind_password.is_some() {
            config.bind_password = Some("***REDACTED***".to_string());
        }
        config
    }
}

fn default_filter() -> String {
    "(objectClass=*)".to_string()
}

fn default_attributes() -> Vec<String> {
    vec!["*".to_string(), "+".to_string()]
}

/// Search parameters of one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    #[serde(default)]
    pub scope: SearchScope,

    #[serde(default = "default_filter")]
    pub filter: String,

    /// Requested attributes. `*` and `+` select all user and operational ones.
    #[serde(default = "default_attributes")]
    pub attributes: Vec<String>,

    /// Overrides the connection's page size for this query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            scope: SearchScope::default(),
            filter: default_filter(),
            attributes: default_attributes(),
            page_size: None,
        }
    }
}

impl QueryOptions {
    /// Client search options for this query.
    pub fn search_options(&self) -> SearchOptions {
        let options = SearchOptions::new(self.scope, self.filter.clone())
            .with_attributes(self.attributes.iter().cloned());
        match self.page_size {
            Some(size) => options.with_page_size(size),
            None => options,
        }
    }
}

fn user_rdn() -> String {
    "uid".to_string()
}

fn group_rdn() -> String {
    "cn".to_string()
}

fn description_attribute() -> String {
    "description".to_string()
}

fn display_name_attribute() -> String {
    "cn".to_string()
}

fn email_attribute() -> String {
    "mail".to_string()
}

fn member_of_attribute() -> String {
    "memberOf".to_string()
}

fn members_attribute() -> String {
    "member".to_string()
}

fn group_type_attribute() -> String {
    "groupType".to_string()
}

/// Physical attribute names for user fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAttributeMap {
    #[serde(default = "user_rdn")]
    pub rdn: String,

    /// Entity name. Falls back to `rdn`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default = "description_attribute")]
    pub description: String,

    #[serde(default = "display_name_attribute")]
    pub display_name: String,

    #[serde(default = "email_attribute")]
    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    #[serde(default = "member_of_attribute")]
    pub member_of: String,
}

impl Default for UserAttributeMap {
    fn default() -> Self {
        Self {
            rdn: user_rdn(),
            name: None,
            description: description_attribute(),
            display_name: display_name_attribute(),
            email: email_attribute(),
            picture: None,
            member_of: member_of_attribute(),
        }
    }
}

impl UserAttributeMap {
    /// Attribute the entity name is read from.
    pub fn name_attribute(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.rdn)
    }
}

/// Physical attribute names for group fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupAttributeMap {
    #[serde(default = "group_rdn")]
    pub rdn: String,

    /// Entity name. Falls back to `rdn`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default = "description_attribute")]
    pub description: String,

    #[serde(rename = "type", default = "group_type_attribute")]
    pub group_type: String,

    #[serde(default = "display_name_attribute")]
    pub display_name: String,

    #[serde(default = "email_attribute")]
    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    /// Parent groups of this group.
    #[serde(default = "member_of_attribute")]
    pub member_of: String,

    /// Users and groups contained in this group.
    #[serde(default = "members_attribute")]
    pub members: String,
}

impl Default for GroupAttributeMap {
    fn default() -> Self {
        Self {
            rdn: group_rdn(),
            name: None,
            description: description_attribute(),
            group_type: group_type_attribute(),
            display_name: display_name_attribute(),
            email: email_attribute(),
            picture: None,
            member_of: member_of_attribute(),
            members: members_attribute(),
        }
    }
}

impl GroupAttributeMap {
    /// Attribute the entity name is read from.
    pub fn name_attribute(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.rdn)
    }
}

/// Static values written into every entity a query produces.
///
/// Keys are dotted paths into the serialized entity, e.g.
/// `metadata.namespace` or `spec.profile.email`. Everything after
/// `metadata.annotations.` is one annotation key, so keys containing dots
/// such as `dirgraph.io/team` can be set.
pub type Overrides = serde_json::Map<String, serde_json::Value>;

const ANNOTATIONS_PATH: &str = "metadata.annotations.";

/// Split an override path into object keys.
pub(crate) fn override_path_segments(path: &str) -> Vec<&str> {
    match path.strip_prefix(ANNOTATIONS_PATH) {
        Some(key) => vec!["metadata", "annotations", key],
        None => path.split('.').collect(),
    }
}

/// One user query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQueryConfig {
    /// Base DN to search below.
    pub dn: String,

    #[serde(default)]
    pub options: QueryOptions,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub set: Overrides,

    #[serde(default)]
    pub map: UserAttributeMap,
}

impl UserQueryConfig {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            options: QueryOptions::default(),
            set: Overrides::new(),
            map: UserAttributeMap::default(),
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.options.filter = filter.into();
        self
    }

    /// Add a static override.
    pub fn with_override(mut self, path: impl Into<String>, value: serde_json::Value) -> Self {
        self.set.insert(path.into(), value);
        self
    }
}

/// One group query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupQueryConfig {
    /// Base DN to search below.
    pub dn: String,

    #[serde(default)]
    pub options: QueryOptions,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub set: Overrides,

    #[serde(default)]
    pub map: GroupAttributeMap,
}

impl GroupQueryConfig {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            options: QueryOptions::default(),
            set: Overrides::new(),
            map: GroupAttributeMap::default(),
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.options.filter = filter.into();
        self
    }

    /// Add a static override.
    pub fn with_override(mut self, path: impl Into<String>, value: serde_json::Value) -> Self {
        self.set.insert(path.into(), value);
        self
    }
}

/// The queries of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrgSyncConfig {
    #[serde(default)]
    pub users: Vec<UserQueryConfig>,

    #[serde(default)]
    pub groups: Vec<GroupQueryConfig>,
}

impl OrgSyncConfig {
    pub fn new(users: Vec<UserQueryConfig>, groups: Vec<GroupQueryConfig>) -> Self {
        Self { users, groups }
    }

    /// Check that every query is usable.
    pub fn validate(&self) -> SyncResult<()> {
        for (index, query) in self.users.iter().enumerate() {
            validate_query("users", index, &query.dn, &query.options, &query.set)?;
            validate_attribute("users", index, "rdn", &query.map.rdn)?;
            validate_attribute("users", index, "name", query.map.name_attribute())?;
        }

        for (index, query) in self.groups.iter().enumerate() {
            validate_query("groups", index, &query.dn, &query.options, &query.set)?;
            validate_attribute("groups", index, "rdn", &query.map.rdn)?;
            validate_attribute("groups", index, "name", query.map.name_attribute())?;
        }

        Ok(())
    }
}

fn validate_query(
    kind: &str,
    index: usize,
    dn: &str,
    options: &QueryOptions,
    set: &Overrides,
) -> SyncResult<()> {
    if dn.trim().is_empty() {
        return Err(SyncError::configuration(format!(
            "{kind}[{index}]: base dn is required"
        )));
    }

    if options.filter.trim().is_empty() {
        return Err(SyncError::configuration(format!(
            "{kind}[{index}]: filter must not be empty"
        )));
    }

    if options.page_size == Some(0) {
        return Err(SyncError::configuration(format!(
            "{kind}[{index}]: page size must be greater than zero"
        )));
    }

    for path in set.keys() {
        if override_path_segments(path).into_iter().any(str::is_empty) {
            return Err(SyncError::configuration(format!(
                "{kind}[{index}]: invalid override path '{path}'"
            )));
        }
    }

    Ok(())
}

fn validate_attribute(kind: &str, index: usize, field: &str, attribute: &str) -> SyncResult<()> {
    if attribute.trim().is_empty() {
        return Err(SyncError::configuration(format!(
            "{kind}[{index}]: map.{field} must name an attribute"
        )));
    }
    Ok(())
}

/// A complete configuration file: how to connect and what to read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapOrgConfig {
    pub connection: LdapConfig,

    #[serde(default)]
    pub users: Vec<UserQueryConfig>,

    #[serde(default)]
    pub groups: Vec<GroupQueryConfig>,
}

impl LdapOrgConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> SyncResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| SyncError::configuration(format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        self.connection
            .validate()
            .map_err(|e| SyncError::configuration(e.to_string()))?;
        self.sync_config().validate()
    }

    /// The query part of this configuration.
    pub fn sync_config(&self) -> OrgSyncConfig {
        OrgSyncConfig::new(self.users.clone(), self.groups.clone())
    }
}
