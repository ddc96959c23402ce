//! Directory record model
//!
//! A [`DirectoryRecord`] is one entry as returned by a directory search: its
//! distinguished name plus every attribute with one or more raw values.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single raw attribute value.
///
/// Directory servers return most values as UTF-8 text, but some attributes
/// (GUIDs, photos, certificates) arrive as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// A UTF-8 text value.
    Text(String),
    /// Binary data.
    Binary(Vec<u8>),
}

impl RawValue {
    /// Get as text if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            RawValue::Binary(_) => None,
        }
    }

    /// Get the raw bytes of the value, regardless of its representation.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RawValue::Text(s) => s.as_bytes(),
            RawValue::Binary(b) => b,
        }
    }

    /// Check if this is a binary value.
    pub fn is_binary(&self) -> bool {
        matches!(self, RawValue::Binary(_))
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<Vec<u8>> for RawValue {
    fn from(bytes: Vec<u8>) -> Self {
        RawValue::Binary(bytes)
    }
}

/// A raw record as returned by the directory client.
///
/// Attribute names are stored as the server sent them. Lookups try an exact
/// match first and then fall back to an ASCII case-insensitive match, since
/// LDAP attribute descriptions are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    /// Distinguished name of the entry.
    dn: String,
    /// Map of attribute name to raw value(s).
    attributes: HashMap<String, Vec<RawValue>>,
}

impl DirectoryRecord {
    /// Create a new record with no attributes.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    /// Create a record from already collected attributes.
    pub fn from_parts(dn: impl Into<String>, attributes: HashMap<String, Vec<RawValue>>) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }

    /// The distinguished name this record was returned under.
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Append a value to an attribute.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<RawValue>) {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    /// Append a value using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.push(name, value);
        self
    }

    /// Set all values of an attribute using builder pattern.
    pub fn with_values<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<RawValue>,
    {
        self.attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Get the raw values of an attribute.
    pub fn get(&self, name: &str) -> Option<&[RawValue]> {
        if let Some(values) = self.attributes.get(name) {
            return Some(values);
        }
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    /// Get the text values of an attribute, skipping binary values.
    pub fn get_strings(&self, name: &str) -> Vec<&str> {
        self.get(name)
            .map(|values| values.iter().filter_map(RawValue::as_text).collect())
            .unwrap_or_default()
    }

    /// Get the first text value of an attribute.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.iter().find_map(RawValue::as_text))
    }

    /// Check if an attribute exists (with at least one value).
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some_and(|values| !values.is_empty())
    }

    /// Get all attribute names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(|s| s.as_str())
    }

    /// Get the number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the record carries no attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}
