//! dirgraph CLI - run LDAP organisation syncs from the command line
//!
//! - `sync` reads users and groups and writes the resolved graph as JSON
//! - `detect` connects and prints the detected directory vendor

use clap::{Parser, Subcommand};

mod commands;
mod error;
mod logging;

use error::CliResult;
use logging::LogFormat;

/// dirgraph - LDAP directory to entity graph sync
#[derive(Parser)]
#[command(name = "dirgraph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log filter directive, used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info,dirgraph_ldap=debug")]
    log_filter: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read users and groups and write the resolved graph
    Sync(commands::sync::SyncArgs),

    /// Print the detected directory vendor
    Detect(commands::detect::DetectArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_filter, cli.log_format);

    match run(cli.command).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(command: Commands) -> CliResult<()> {
    match command {
        Commands::Sync(args) => commands::sync::execute(args).await,
        Commands::Detect(args) => commands::detect::execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sync_command() {
        let cli = Cli::try_parse_from([
            "dirgraph",
            "sync",
            "--config",
            "org.yaml",
            "--output",
            "graph.json",
            "--compact",
        ])
        .unwrap();

        match cli.command {
            Commands::Sync(args) => {
                assert_eq!(args.connection.config.to_str(), Some("org.yaml"));
                assert_eq!(args.output.as_deref().and_then(|p| p.to_str()), Some("graph.json"));
                assert!(args.compact);
            }
            Commands::Detect(_) => panic!("expected sync"),
        }
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_parse_global_log_options() {
        let cli = Cli::try_parse_from([
            "dirgraph",
            "detect",
            "--config",
            "org.yaml",
            "--log-format",
            "json",
            "--log-filter",
            "warn",
        ])
        .unwrap();

        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.log_filter, "warn");
        assert!(matches!(cli.command, Commands::Detect(_)));
    }

    #[test]
    fn test_config_is_required() {
        assert!(Cli::try_parse_from(["dirgraph", "sync"]).is_err());
    }
}
