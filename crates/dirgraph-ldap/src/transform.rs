//! Record to entity transformation.
//!
//! The default transformers map a raw record through the query's attribute
//! map, attach identity annotations and apply the query's static overrides.
//! Callers can replace them with their own [`RecordTransformer`] and still
//! reuse [`default_user_transformer`] / [`default_group_transformer`] inside it.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use dirgraph_connector::record::DirectoryRecord;

use crate::config::{override_path_segments, GroupQueryConfig, Overrides, UserQueryConfig};
use crate::entity::{
    EntityKind, GroupEntity, Profile, UserEntity, LDAP_DN_ANNOTATION, LDAP_RDN_ANNOTATION,
    LDAP_UUID_ANNOTATION, UNKNOWN_GROUP_TYPE,
};
use crate::error::{SyncError, SyncResult};
use crate::vendor::LdapVendor;

/// Turns one raw record into an entity.
///
/// Returning `Ok(None)` drops the record without failing the run. An entity
/// with a blank name fails the run with `MissingAttribute`.
#[async_trait]
pub trait RecordTransformer<Q, E>: Send + Sync
where
    Q: Send + Sync + 'static,
    E: Send + 'static,
{
    async fn transform(
        &self,
        vendor: LdapVendor,
        config: &Q,
        record: &DirectoryRecord,
    ) -> SyncResult<Option<E>>;
}

/// Shared user transformer.
pub type UserTransformer = Arc<dyn RecordTransformer<UserQueryConfig, UserEntity>>;

/// Shared group transformer.
pub type GroupTransformer = Arc<dyn RecordTransformer<GroupQueryConfig, GroupEntity>>;

/// Transformer applying [`default_user_transformer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultUserTransformer;

#[async_trait]
impl RecordTransformer<UserQueryConfig, UserEntity> for DefaultUserTransformer {
    async fn transform(
        &self,
        vendor: LdapVendor,
        config: &UserQueryConfig,
        record: &DirectoryRecord,
    ) -> SyncResult<Option<UserEntity>> {
        default_user_transformer(vendor, config, record).map(Some)
    }
}

/// Transformer applying [`default_group_transformer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultGroupTransformer;

#[async_trait]
impl RecordTransformer<GroupQueryConfig, GroupEntity> for DefaultGroupTransformer {
    async fn transform(
        &self,
        vendor: LdapVendor,
        config: &GroupQueryConfig,
        record: &DirectoryRecord,
    ) -> SyncResult<Option<GroupEntity>> {
        default_group_transformer(vendor, config, record).map(Some)
    }
}

/// Map a record to a user.
///
/// # Errors
///
/// `MissingAttribute` when the mapped name is absent or blank, `Transform`
/// when an override produces an invalid entity.
pub fn default_user_transformer(
    vendor: LdapVendor,
    config: &UserQueryConfig,
    record: &DirectoryRecord,
) -> SyncResult<UserEntity> {
    let map = &config.map;
    let name_attribute = map.name_attribute();
    let name = required_name(EntityKind::User, vendor, record, name_attribute)?;

    let mut entity = UserEntity::new(name);
    entity.metadata.description = first_value(vendor, record, &map.description);
    entity.metadata.annotations = identity_annotations(vendor, record, &map.rdn);
    entity.spec.profile = Profile {
        display_name: first_value(vendor, record, &map.display_name),
        email: first_value(vendor, record, &map.email),
        picture: map
            .picture
            .as_deref()
            .and_then(|attribute| first_value(vendor, record, attribute)),
    };

    let entity: UserEntity = apply_overrides(entity, &config.set, EntityKind::User, record.dn())?;
    ensure_named(EntityKind::User, &entity.metadata.name, name_attribute, record)?;
    Ok(entity)
}

/// Map a record to a group.
///
/// # Errors
///
/// `MissingAttribute` when the mapped name is absent or blank, `Transform`
/// when an override produces an invalid entity.
pub fn default_group_transformer(
    vendor: LdapVendor,
    config: &GroupQueryConfig,
    record: &DirectoryRecord,
) -> SyncResult<GroupEntity> {
    let map = &config.map;
    let name_attribute = map.name_attribute();
    let name = required_name(EntityKind::Group, vendor, record, name_attribute)?;

    let mut entity = GroupEntity::new(name);
    entity.metadata.description = first_value(vendor, record, &map.description);
    entity.metadata.annotations = identity_annotations(vendor, record, &map.rdn);
    entity.spec.group_type = first_value(vendor, record, &map.group_type)
        .unwrap_or_else(|| UNKNOWN_GROUP_TYPE.to_string());
    entity.spec.profile = Profile {
        display_name: first_value(vendor, record, &map.display_name),
        email: first_value(vendor, record, &map.email),
        picture: map
            .picture
            .as_deref()
            .and_then(|attribute| first_value(vendor, record, attribute)),
    };

    let entity: GroupEntity =
        apply_overrides(entity, &config.set, EntityKind::Group, record.dn())?;
    ensure_named(EntityKind::Group, &entity.metadata.name, name_attribute, record)?;
    Ok(entity)
}

/// The DN a record is known under: the vendor DN attribute, else the record key.
pub fn record_dn(vendor: LdapVendor, record: &DirectoryRecord) -> String {
    first_value(vendor, record, vendor.dn_attribute()).unwrap_or_else(|| record.dn().to_string())
}

fn first_value(vendor: LdapVendor, record: &DirectoryRecord, attribute: &str) -> Option<String> {
    vendor
        .decode_string_attribute(record, attribute)
        .into_iter()
        .find(|value| !value.trim().is_empty())
}

fn required_name(
    kind: EntityKind,
    vendor: LdapVendor,
    record: &DirectoryRecord,
    attribute: &str,
) -> SyncResult<String> {
    first_value(vendor, record, attribute)
        .map(|name| name.trim().to_string())
        .ok_or_else(|| SyncError::MissingAttribute {
            kind,
            attribute: attribute.to_string(),
            dn: record.dn().to_string(),
        })
}

fn ensure_named(
    kind: EntityKind,
    name: &str,
    attribute: &str,
    record: &DirectoryRecord,
) -> SyncResult<()> {
    if name.trim().is_empty() {
        return Err(SyncError::MissingAttribute {
            kind,
            attribute: attribute.to_string(),
            dn: record.dn().to_string(),
        });
    }
    Ok(())
}

fn identity_annotations(
    vendor: LdapVendor,
    record: &DirectoryRecord,
    rdn_attribute: &str,
) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();

    let dn = record_dn(vendor, record);
    if !dn.is_empty() {
        annotations.insert(LDAP_DN_ANNOTATION.to_string(), dn);
    }
    if let Some(rdn) = first_value(vendor, record, rdn_attribute) {
        annotations.insert(LDAP_RDN_ANNOTATION.to_string(), rdn);
    }
    if let Some(uuid) = first_value(vendor, record, vendor.uuid_attribute()) {
        annotations.insert(LDAP_UUID_ANNOTATION.to_string(), uuid);
    }

    annotations
}

/// Write each override into the serialized entity and read it back.
fn apply_overrides<E>(entity: E, set: &Overrides, kind: EntityKind, dn: &str) -> SyncResult<E>
where
    E: Serialize + DeserializeOwned,
{
    if set.is_empty() {
        return Ok(entity);
    }

    let mut value =
        serde_json::to_value(&entity).map_err(|e| SyncError::transform(kind, dn, e.to_string()))?;

    for (path, override_value) in set {
        set_path(&mut value, path, override_value.clone())
            .map_err(|message| SyncError::transform(kind, dn, message))?;
    }

    serde_json::from_value(value)
        .map_err(|e| SyncError::transform(kind, dn, format!("invalid override result: {e}")))
}

fn set_path(target: &mut Value, path: &str, value: Value) -> Result<(), String> {
    let mut current = target;
    let mut segments = override_path_segments(path).into_iter().peekable();

    while let Some(segment) = segments.next() {
        let object = current
            .as_object_mut()
            .ok_or_else(|| format!("override '{path}' does not address an object field"))?;

        if segments.peek().is_none() {
            object.insert(segment.to_string(), value);
            return Ok(());
        }

        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    Err(format!("override path '{path}' is empty"))
}
