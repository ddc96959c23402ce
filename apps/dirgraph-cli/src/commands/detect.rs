//! `dirgraph detect`

use clap::Args;
use tracing::warn;

use super::{connect, ConnectionArgs};
use crate::error::CliResult;

#[derive(Debug, Args)]
pub struct DetectArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

pub async fn execute(args: DetectArgs) -> CliResult<()> {
    let config = args.connection.load()?;
    let directory = connect(&config)?;

    let vendor = directory.vendor().await;

    if let Err(e) = directory.client().dispose().await {
        warn!(error = %e, "Failed to close directory connection");
    }

    println!("{}", vendor?);
    Ok(())
}
