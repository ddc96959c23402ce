//! Subcommands and the helpers they share.

pub mod detect;
pub mod sync;

use clap::Args;
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use dirgraph_ldap::{LdapClient, LdapDirectory, LdapOrgConfig};

use crate::error::{CliError, CliResult};

/// Options every directory command takes.
#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Path to the YAML sync configuration
    #[arg(short, long)]
    pub config: PathBuf,

    /// Bind password, replacing the one in the configuration file
    #[arg(long, env = "DIRGRAPH_BIND_PASSWORD", hide_env_values = true)]
    pub bind_password: Option<String>,
}

impl ConnectionArgs {
    /// Load and validate the configuration file.
    pub fn load(&self) -> CliResult<LdapOrgConfig> {
        let mut config = LdapOrgConfig::from_file(&self.config)
            .map_err(|e| CliError::Config(format!("{}: {e}", self.config.display())))?;

        if let Some(password) = &self.bind_password {
            if config.connection.bind_dn.is_none() {
                return Err(CliError::Config(
                    "a bind password was given but the configuration has no bind_dn".to_string(),
                ));
            }
            config.connection.bind_password = Some(password.clone());
        }

        Ok(config)
    }
}

/// Build a directory handle for the configured server.
pub fn connect(config: &LdapOrgConfig) -> CliResult<LdapDirectory<LdapClient>> {
    let client = LdapClient::new(config.connection.clone())?;
    info!(url = %config.connection.url(), "Using directory");
    Ok(LdapDirectory::new(client))
}

/// Cancel `token` on Ctrl+C or SIGTERM.
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, cancelling sync"),
            _ = terminate => info!("Received SIGTERM, cancelling sync"),
            _ = token.cancelled() => return,
        }
        token.cancel();
    });
}
