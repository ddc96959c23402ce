//! `dirgraph sync`

use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

use dirgraph_ldap::{LdapOrgReader, SyncOutput};

use super::{cancel_on_signal, connect, ConnectionArgs};
use crate::error::CliResult;

#[derive(Debug, Args)]
pub struct SyncArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Write the result to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write compact JSON
    #[arg(long)]
    pub compact: bool,
}

pub async fn execute(args: SyncArgs) -> CliResult<()> {
    let config = args.connection.load()?;
    let directory = connect(&config)?;

    let reader = LdapOrgReader::new(config.sync_config())?;
    cancel_on_signal(reader.cancellation_token());

    let result = reader.read(&directory).await;

    if let Err(e) = directory.client().dispose().await {
        warn!(error = %e, "Failed to close directory connection");
    }

    let output = result?;
    let encoded = encode(&output, args.compact)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, encoded)?;
            info!(path = %path.display(), "Wrote sync output");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&encoded)?;
            stdout.write_all(b"\n")?;
        }
    }

    Ok(())
}

fn encode(output: &SyncOutput, compact: bool) -> CliResult<Vec<u8>> {
    let encoded = if compact {
        serde_json::to_vec(output)?
    } else {
        serde_json::to_vec_pretty(output)?
    };
    Ok(encoded)
}
