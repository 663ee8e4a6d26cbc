use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "descriptor-orm")]
#[command(version, about = "Deploy and inspect descriptor-defined SQLite databases")]
pub struct Cli {
    /// Directory holding the descriptor documents
    #[arg(short, long, global = true, default_value = ".")]
    pub descriptors: PathBuf,

    /// Application descriptor, relative to the descriptor directory
    #[arg(short, long, global = true, default_value = "ApplicationDescriptor.json")]
    pub application: String,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or upgrade every configured database
    Deploy {
        /// Directory for database files (defaults to the platform data directory)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Directory for databases marked external_storage
        #[arg(long)]
        external_dir: Option<PathBuf>,
    },

    /// Print the schema statements in creation order
    Ddl {
        /// Only this database
        #[arg(long)]
        database: Option<String>,
    },

    /// List the mapped entities of every database
    ListEntities,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_arguments() {
        let cli = Cli::parse_from([
            "descriptor-orm",
            "deploy",
            "--descriptors",
            "conf",
            "--data-dir",
            "/tmp/data",
            "-vv",
        ]);
        assert_eq!(cli.descriptors, PathBuf::from("conf"));
        assert_eq!(cli.application, "ApplicationDescriptor.json");
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Deploy { data_dir, external_dir } => {
                assert_eq!(data_dir, Some(PathBuf::from("/tmp/data")));
                assert_eq!(external_dir, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
