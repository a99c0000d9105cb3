//! Command-line surface of the `inkrag` binary

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "inkrag",
    version,
    about = "Hybrid keyword and vector retrieval over a writing project",
    long_about = "inkrag chunks a project's markdown and text documents, indexes them for BM25 \
                  keyword and vector similarity search, and returns ranked context trimmed to a \
                  language model's token budget."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/inkrag/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index every document in a project and report what was ingested
    Index {
        /// Project root directory
        project: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Index a project, then run a ranked query against it
    Query {
        /// Project root directory
        project: PathBuf,

        /// Search query text
        query: String,

        /// Number of chunks to return
        #[arg(short = 'n', long, default_value = "3")]
        limit: usize,

        /// Rank by vector similarity only, skipping BM25 fusion
        #[arg(long)]
        vector_only: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Index a project, then build token-budgeted context for a query
    Context {
        /// Project root directory
        project: PathBuf,

        /// Search query text
        query: String,

        /// Number of chunks to retrieve before trimming
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,

        /// Model context window in tokens (defaults to the configured one)
        #[arg(short = 'w', long)]
        context_window: Option<usize>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Report which files an indexing pass picks up
    ///
    /// The project is indexed in memory first, so every readable document
    /// reports `indexed`. Files under excluded directories, unreadable or
    /// missing files report `not_indexed`; other extensions are not documents.
    Status {
        /// Project root directory
        project: PathBuf,

        /// Files to check, relative to the project root
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show how a single document is split into chunks
    Chunk {
        /// Document to chunk
        file: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Check a configuration file and report every problem
    Validate {
        /// File to check (defaults to --config or the standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Write a configuration file with default values
    Init {
        /// Replace an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the default configuration file location
    Path,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_query() {
        let cli = Cli::try_parse_from([
            "inkrag", "query", "./novel", "storm at sea", "-n", "4", "--vector-only",
        ])
        .unwrap();

        match cli.command {
            Commands::Query {
                limit, vector_only, ..
            } => {
                assert_eq!(limit, 4);
                assert!(vector_only);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_status_requires_files() {
        assert!(Cli::try_parse_from(["inkrag", "status", "./novel"]).is_err());

        let cli = Cli::try_parse_from(["inkrag", "status", "./novel", "ch1.md", "ch2.md"]).unwrap();
        match cli.command {
            Commands::Status { files, .. } => assert_eq!(files.len(), 2),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
