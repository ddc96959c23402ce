//! CLI error types and exit codes

use thiserror::Error;

use dirgraph_connector::error::ConnectorError;
use dirgraph_ldap::SyncError;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: General error
/// - 2: Configuration error
/// - 3: Directory connection or search error
/// - 4: Entry or graph error
/// - 130: Cancelled
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Directory error: {0}")]
    Directory(#[from] ConnectorError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            CliError::Directory(_) => 3,
            CliError::Sync(err) => match err {
                SyncError::Configuration { .. } => 2,
                SyncError::VendorDetection { .. } | SyncError::Retrieval { .. } => 3,
                SyncError::MissingAttribute { .. }
                | SyncError::Transform { .. }
                | SyncError::Resolution { .. } => 4,
                SyncError::Cancelled => 130,
                SyncError::Internal { .. } => 1,
            },
            CliError::Encode(_) | CliError::Io(_) => 1,
        }
    }

    /// Print the error to stderr.
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {}", suggestion);
            } else {
                eprintln!("\nSuggestion: {}", suggestion);
            }
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Directory(ConnectorError::AuthenticationFailed) => {
                Some("Check bind_dn and set DIRGRAPH_BIND_PASSWORD.")
            }
            CliError::Sync(SyncError::MissingAttribute { .. }) => {
                Some("Narrow the query filter or map the entity name to another attribute.")
            }
            CliError::Sync(SyncError::VendorDetection { .. }) => {
                Some("Check that the server is reachable and allows reading the root DSE.")
            }
            _ => None,
        }
    }
}
