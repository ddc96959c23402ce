//! Directory server vendor detection.
//!
//! Different server families expose the entry DN and a stable unique id under
//! different attribute names, and encode some attributes differently. The
//! vendor is detected once per directory handle from the root DSE.

use serde::{Deserialize, Serialize};

use dirgraph_connector::record::DirectoryRecord;

use crate::decoder::decode_attribute;

/// Root DSE attributes inspected during detection.
pub const DETECTION_ATTRIBUTES: [&str; 4] =
    ["forestFunctionality", "ipaDomainLevel", "aeRoot", "vendorName"];

/// How binary photo attributes are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoPolicy {
    /// Render as a `data:` URL.
    DataUrl,
    /// Drop the value.
    Omit,
}

/// A known directory server family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LdapVendor {
    /// Generic LDAPv3 server (OpenLDAP and friends).
    #[default]
    Default,
    /// Microsoft Active Directory.
    ActiveDirectory,
    /// FreeIPA / Red Hat IdM.
    FreeIpa,
    /// Æ-DIR.
    AeDir,
    /// LLDAP.
    Lldap,
}

impl LdapVendor {
    /// Pick the vendor from the root DSE.
    ///
    /// An absent root record selects [`LdapVendor::Default`].
    pub fn detect(root: Option<&DirectoryRecord>) -> Self {
        let Some(root) = root else {
            return LdapVendor::Default;
        };

        if root.has("forestFunctionality") {
            LdapVendor::ActiveDirectory
        } else if root.has("ipaDomainLevel") {
            LdapVendor::FreeIpa
        } else if root.has("aeRoot") {
            LdapVendor::AeDir
        } else if root
            .get_strings("vendorName")
            .iter()
            .any(|name| name.trim().eq_ignore_ascii_case("LLDAP"))
        {
            LdapVendor::Lldap
        } else {
            LdapVendor::Default
        }
    }

    /// Short identifier used in logs and statistics.
    pub fn name(&self) -> &'static str {
        match self {
            LdapVendor::Default => "default",
            LdapVendor::ActiveDirectory => "activeDirectory",
            LdapVendor::FreeIpa => "freeIpa",
            LdapVendor::AeDir => "aeDir",
            LdapVendor::Lldap => "lldap",
        }
    }

    /// Attribute carrying the entry's distinguished name.
    pub fn dn_attribute(&self) -> &'static str {
        match self {
            LdapVendor::Default | LdapVendor::AeDir => "entryDN",
            LdapVendor::ActiveDirectory => "distinguishedName",
            LdapVendor::FreeIpa | LdapVendor::Lldap => "dn",
        }
    }

    /// Attribute carrying the entry's stable unique id.
    pub fn uuid_attribute(&self) -> &'static str {
        match self {
            LdapVendor::Default | LdapVendor::AeDir => "entryUUID",
            LdapVendor::ActiveDirectory => "objectGUID",
            LdapVendor::FreeIpa => "ipaUniqueID",
            LdapVendor::Lldap => "uuid",
        }
    }

    pub fn photo_policy(&self) -> PhotoPolicy {
        match self {
            LdapVendor::FreeIpa | LdapVendor::Lldap => PhotoPolicy::Omit,
            _ => PhotoPolicy::DataUrl,
        }
    }

    /// Whether the unique id attribute is a binary GUID.
    pub fn has_binary_guid(&self) -> bool {
        matches!(self, LdapVendor::ActiveDirectory)
    }

    /// Decode the string values of an attribute using this vendor's rules.
    pub fn decode_string_attribute(&self, record: &DirectoryRecord, attribute: &str) -> Vec<String> {
        decode_attribute(*self, record, attribute)
    }
}

impl std::fmt::Display for LdapVendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_without_root_record() {
        assert_eq!(LdapVendor::detect(None), LdapVendor::Default);
    }

    #[test]
    fn test_detect_active_directory() {
        let root = DirectoryRecord::new("")
            .with("forestFunctionality", "7")
            .with("vendorName", "Microsoft");
        assert_eq!(LdapVendor::detect(Some(&root)), LdapVendor::ActiveDirectory);
    }

    #[test]
    fn test_detect_freeipa() {
        let root = DirectoryRecord::new("").with("ipaDomainLevel", "1");
        assert_eq!(LdapVendor::detect(Some(&root)), LdapVendor::FreeIpa);
    }

    #[test]
    fn test_detect_aedir() {
        let root = DirectoryRecord::new("").with("aeRoot", "ae-dir");
        assert_eq!(LdapVendor::detect(Some(&root)), LdapVendor::AeDir);
    }

    #[test]
    fn test_detect_lldap_by_vendor_name() {
        let root = DirectoryRecord::new("").with("vendorName", "LLDAP");
        assert_eq!(LdapVendor::detect(Some(&root)), LdapVendor::Lldap);

        let root = DirectoryRecord::new("").with("vendorname", "lldap");
        assert_eq!(LdapVendor::detect(Some(&root)), LdapVendor::Lldap);
    }

    #[test]
    fn test_detect_unknown_vendor_name_is_default() {
        let root = DirectoryRecord::new("").with("vendorName", "OpenLDAP Foundation");
        assert_eq!(LdapVendor::detect(Some(&root)), LdapVendor::Default);
    }

    #[test]
    fn test_detect_precedence_active_directory_first() {
        let root = DirectoryRecord::new("")
            .with("ipaDomainLevel", "1")
            .with("forestFunctionality", "7");
        assert_eq!(LdapVendor::detect(Some(&root)), LdapVendor::ActiveDirectory);
    }

    #[test]
    fn test_vendor_attribute_table() {
        assert_eq!(LdapVendor::Default.dn_attribute(), "entryDN");
        assert_eq!(LdapVendor::Default.uuid_attribute(), "entryUUID");
        assert_eq!(
            LdapVendor::ActiveDirectory.dn_attribute(),
            "distinguishedName"
        );
        assert_eq!(LdapVendor::ActiveDirectory.uuid_attribute(), "objectGUID");
        assert_eq!(LdapVendor::FreeIpa.dn_attribute(), "dn");
        assert_eq!(LdapVendor::FreeIpa.uuid_attribute(), "ipaUniqueID");
        assert_eq!(LdapVendor::AeDir.uuid_attribute(), "entryUUID");
        assert_eq!(LdapVendor::Lldap.uuid_attribute(), "uuid");
    }

    #[test]
    fn test_vendor_names() {
        assert_eq!(LdapVendor::ActiveDirectory.to_string(), "activeDirectory");
        assert_eq!(LdapVendor::Lldap.name(), "lldap");
    }
}
