//! Sync pipeline error types

use thiserror::Error;

use dirgraph_connector::error::ConnectorError;

use crate::entity::EntityKind;

/// Result type alias using `SyncError`.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Query or attribute map configuration is malformed.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The directory vendor could not be determined.
    #[error("vendor detection failed: {source}")]
    VendorDetection {
        #[source]
        source: ConnectorError,
    },

    /// A record lacks the attribute its entity name is mapped from.
    #[error("{kind} entry '{dn}' is missing required attribute '{attribute}'")]
    MissingAttribute {
        kind: EntityKind,
        attribute: String,
        dn: String,
    },

    /// A record could not be turned into an entity.
    #[error("failed to transform {kind} entry '{dn}': {message}")]
    Transform {
        kind: EntityKind,
        dn: String,
        message: String,
    },

    /// The directory client failed while searching below a base DN.
    #[error("search below '{base_dn}' failed: {source}")]
    Retrieval {
        base_dn: String,
        #[source]
        source: ConnectorError,
    },

    /// The accumulated entities cannot be resolved into a consistent graph.
    #[error("relation resolution failed: {message}")]
    Resolution { message: String },

    /// The run was cancelled before it completed.
    #[error("sync run cancelled")]
    Cancelled,

    /// Unexpected internal failure (e.g. a panicked transform task).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::Configuration { .. } => "CONFIGURATION_ERROR",
            SyncError::VendorDetection { .. } => "VENDOR_DETECTION_ERROR",
            SyncError::MissingAttribute { .. } => "MISSING_ATTRIBUTE",
            SyncError::Transform { .. } => "TRANSFORM_ERROR",
            SyncError::Retrieval { .. } => "RETRIEVAL_ERROR",
            SyncError::Resolution { .. } => "RESOLUTION_ERROR",
            SyncError::Cancelled => "CANCELLED",
            SyncError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        SyncError::Configuration {
            message: message.into(),
        }
    }

    /// Wrap a client error with the base DN that was being searched.
    pub fn retrieval(base_dn: impl Into<String>, source: ConnectorError) -> Self {
        SyncError::Retrieval {
            base_dn: base_dn.into(),
            source,
        }
    }

    /// Create a transform error.
    pub fn transform(kind: EntityKind, dn: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Transform {
            kind,
            dn: dn.into(),
            message: message.into(),
        }
    }

    /// Create a resolution error.
    pub fn resolution(message: impl Into<String>) -> Self {
        SyncError::Resolution {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        SyncError::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_attribute_names_everything() {
        let err = SyncError::MissingAttribute {
            kind: EntityKind::User,
            attribute: "uid".to_string(),
            dn: "cn=nobody,dc=example,dc=com".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("user"));
        assert!(message.contains("'uid'"));
        assert!(message.contains("cn=nobody,dc=example,dc=com"));
        assert_eq!(err.error_code(), "MISSING_ATTRIBUTE");
    }

    #[test]
    fn test_retrieval_error_carries_base_dn() {
        let err = SyncError::retrieval(
            "ou=people,dc=example,dc=com",
            ConnectorError::operation_failed("rc=32 noSuchObject"),
        );
        assert_eq!(
            err.to_string(),
            "search below 'ou=people,dc=example,dc=com' failed: operation failed: rc=32 noSuchObject"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(SyncError::Cancelled.error_code(), "CANCELLED");
        assert_eq!(
            SyncError::configuration("bad").error_code(),
            "CONFIGURATION_ERROR"
        );
        assert_eq!(
            SyncError::resolution("ambiguous").error_code(),
            "RESOLUTION_ERROR"
        );
        assert_eq!(
            SyncError::VendorDetection {
                source: ConnectorError::AuthenticationFailed
            }
            .error_code(),
            "VENDOR_DETECTION_ERROR"
        );
    }
}
