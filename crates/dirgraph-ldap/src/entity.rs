//! Normalized entity records produced by a sync run.
//!
//! Users and groups share the same metadata block. Relations between them are
//! expressed as canonical entity references of the form `kind:namespace/name`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Namespace assigned to entities unless an override says otherwise.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Annotation holding the entry's distinguished name.
pub const LDAP_DN_ANNOTATION: &str = "dirgraph.io/ldap-dn";

/// Annotation holding the entry's relative distinguished name value.
pub const LDAP_RDN_ANNOTATION: &str = "dirgraph.io/ldap-rdn";

/// Annotation holding the entry's vendor-specific unique id.
pub const LDAP_UUID_ANNOTATION: &str = "dirgraph.io/ldap-uuid";

/// Group type used when the mapped type attribute is absent.
pub const UNKNOWN_GROUP_TYPE: &str = "unknown";

/// The kind of an entity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Group,
}

impl EntityKind {
    /// Lowercase name used in entity references.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Group => "group",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical reference to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub namespace: String,
    pub name: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.kind, self.namespace, self.name)
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Metadata shared by every entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMetadata {
    /// Stable entity name. Never empty on emitted entities.
    pub name: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl EntityMetadata {
    /// Create metadata in the default namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: default_namespace(),
            description: None,
            annotations: BTreeMap::new(),
        }
    }

    /// Get an annotation value.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

/// Optional profile fields. Absent fields are omitted, never defaulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl Profile {
    /// Whether no profile field is set.
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.email.is_none() && self.picture.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSpec {
    #[serde(default)]
    pub profile: Profile,

    /// Resolved group references.
    #[serde(default)]
    pub member_of: Vec<String>,
}

/// A user entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntity {
    pub metadata: EntityMetadata,
    pub spec: UserSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSpec {
    #[serde(rename = "type")]
    pub group_type: String,

    #[serde(default)]
    pub profile: Profile,

    /// Resolved parent group reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Resolved child group references.
    #[serde(default)]
    pub children: Vec<String>,
}

impl Default for GroupSpec {
    fn default() -> Self {
        Self {
            group_type: UNKNOWN_GROUP_TYPE.to_string(),
            profile: Profile::default(),
            parent: None,
            children: Vec::new(),
        }
    }
}

/// A group entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntity {
    pub metadata: EntityMetadata,
    pub spec: GroupSpec,
}

/// Identity accessors shared by users and groups.
pub trait Entity {
    const KIND: EntityKind;

    fn metadata(&self) -> &EntityMetadata;

    /// Canonical reference to this entity.
    fn entity_ref(&self) -> EntityRef {
        let metadata = self.metadata();
        EntityRef::new(Self::KIND, &metadata.namespace, &metadata.name)
    }

    /// The DN annotation, if set.
    fn dn(&self) -> Option<&str> {
        self.metadata().annotation(LDAP_DN_ANNOTATION)
    }

    /// The unique id annotation, if set.
    fn uuid(&self) -> Option<&str> {
        self.metadata().annotation(LDAP_UUID_ANNOTATION)
    }
}

impl Entity for UserEntity {
    const KIND: EntityKind = EntityKind::User;

    fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }
}

impl Entity for GroupEntity {
    const KIND: EntityKind = EntityKind::Group;

    fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }
}

impl UserEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: EntityMetadata::new(name),
            spec: UserSpec::default(),
        }
    }
}

impl GroupEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: EntityMetadata::new(name),
            spec: GroupSpec::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ref_format() {
        let user = UserEntity::new("jdoe");
        assert_eq!(user.entity_ref().to_string(), "user:default/jdoe");

        let mut group = GroupEntity::new("team1");
        group.metadata.namespace = "corp".to_string();
        assert_eq!(group.entity_ref().to_string(), "group:corp/team1");
    }

    #[test]
    fn test_empty_profile_serializes_as_empty_object() {
        let user = UserEntity::new("jdoe");
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["spec"]["profile"], serde_json::json!({}));
        assert_eq!(json["spec"]["memberOf"], serde_json::json!([]));
        assert!(json["metadata"].get("description").is_none());
    }

    #[test]
    fn test_group_spec_serialization() {
        let mut group = GroupEntity::new("team1");
        group.spec.parent = Some("group:default/org".to_string());
        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(json["spec"]["type"], "unknown");
        assert_eq!(json["spec"]["parent"], "group:default/org");

        let parsed: GroupEntity = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, group);
    }

    #[test]
    fn test_namespace_defaults_on_deserialize() {
        let metadata: EntityMetadata = serde_json::from_str(r#"{"name":"x"}"#).unwrap();
        assert_eq!(metadata.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_identity_annotations() {
        let mut user = UserEntity::new("jdoe");
        assert_eq!(user.dn(), None);
        user.metadata.annotations.insert(
            LDAP_DN_ANNOTATION.to_string(),
            "uid=jdoe,dc=example,dc=com".to_string(),
        );
        user.metadata
            .annotations
            .insert(LDAP_UUID_ANNOTATION.to_string(), "1234".to_string());
        assert_eq!(user.dn(), Some("uid=jdoe,dc=example,dc=com"));
        assert_eq!(user.uuid(), Some("1234"));
    }
}
