//! # LDAP Organisation Sync
//!
//! Reads users and groups out of an LDAP directory and turns them into a
//! typed entity graph with resolved group membership and group hierarchy.
//!
//! ## Features
//!
//! - Vendor detection (Active Directory, FreeIPA, Æ-DIR, LLDAP, generic LDAPv3)
//! - Vendor-aware attribute decoding (binary GUIDs, photos)
//! - Declarative attribute maps with static overrides
//! - Custom record transformers
//! - Paged, streaming retrieval with per-page concurrent transformation
//! - Relation resolution by DN or unique id
//! - Progress reporting and cancellation
//!
//! ## Example
//!
//! ```ignore
//! use dirgraph_ldap::{LdapClient, LdapConfig, LdapDirectory, LdapOrgReader, OrgSyncConfig};
//! use dirgraph_ldap::config::{GroupQueryConfig, UserQueryConfig};
//!
//! let client = LdapClient::new(
//!     LdapConfig::new("ldap.example.com")
//!         .with_credentials("cn=reader,dc=example,dc=com", "secret")
//!         .with_starttls(),
//! )?;
//! let directory = LdapDirectory::new(client);
//!
//! let reader = LdapOrgReader::new(OrgSyncConfig::new(
//!     vec![UserQueryConfig::new("ou=people,dc=example,dc=com")],
//!     vec![GroupQueryConfig::new("ou=groups,dc=example,dc=com")],
//! ))?;
//!
//! let output = reader.read(&directory).await?;
//! println!("{} users", output.graph.users.len());
//! ```

pub mod client;
pub mod config;
pub mod decoder;
pub mod directory;
pub mod entity;
pub mod error;
pub mod ingest;
pub mod membership;
pub mod progress;
pub mod resolve;
pub mod sync;
pub mod transform;
pub mod vendor;

// Re-exports
pub use client::LdapClient;
pub use config::{LdapConfig, LdapOrgConfig, OrgSyncConfig};
pub use directory::LdapDirectory;
pub use entity::{Entity, EntityKind, EntityRef, GroupEntity, UserEntity};
pub use error::{SyncError, SyncResult};
pub use progress::{SyncPhase, SyncProgress};
pub use resolve::resolve_relations;
pub use sync::{LdapOrgReader, ResolvedGraph, SyncOutput, SyncStatistics};
pub use transform::{default_group_transformer, default_user_transformer, RecordTransformer};
pub use vendor::LdapVendor;
