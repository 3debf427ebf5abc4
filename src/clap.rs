// =============================================================================
// Matrixon Relations - Command Line Interface
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Contributors: Matrixon Development Team
// License: Apache 2.0 / MIT
//
// Description:
//   Argument parsing for the matrixon-relations binary: serve the relations
//   API or apply the database migrations and exit.
//
// =============================================================================

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Matrixon Relations - event relations and annotation aggregation service
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[clap(about, version, name = "matrixon-relations")]
pub struct Args {
    /// Path to configuration file
    #[clap(short, long, env = "MATRIXON_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log filter override (e.g. `debug` or `matrixon_db=trace`)
    #[clap(short, long, global = true)]
    pub log_level: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Serve the relations API
    Start {
        /// Address to bind to, overrides `address` from the config
        #[clap(long)]
        address: Option<String>,

        /// Port to bind to, overrides `port` from the config
        #[clap(long)]
        port: Option<u16>,
    },

    /// Apply pending database migrations and exit
    Migrate,
}

/// Parse commandline arguments into structured data
pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_start_with_overrides() {
        let args = Args::try_parse_from([
            "matrixon-relations",
            "--config",
            "matrixon.toml",
            "start",
            "--address",
            "0.0.0.0",
            "--port",
            "9000",
        ])
        .unwrap();

        assert_eq!(args.config, Some(PathBuf::from("matrixon.toml")));
        assert_eq!(
            args.command,
            Commands::Start {
                address: Some("0.0.0.0".to_owned()),
                port: Some(9000),
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["matrixon-relations", "migrate", "--log-level", "debug"]).unwrap();
        assert_eq!(args.command, Commands::Migrate);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }
}
