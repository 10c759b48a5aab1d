//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "fshdkb",
    version,
    about = "FSHD knowledge base retrieval engine",
    long_about = "Searches the FSHD medical knowledge base with several related queries at once, \
                  merges and deduplicates the hits, and returns a source-diversified set of \
                  passages as JSON. Also runs as an HTTP service and loads documents into the \
                  collection."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/fshdkb/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search with a single question and print the JSON result
    Ask {
        /// Question to search for
        question: String,

        /// Expand the question into related queries first
        #[arg(short, long)]
        expand: bool,
    },

    /// Multi-query search from a JSON payload (or @file.json)
    Multi {
        /// `{"question": ..., "queries": [...], "top_k": 8, ...}` or `@path`
        payload: String,
    },

    /// Run the HTTP service
    Serve {
        /// Bind address (defaults to service.host)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (defaults to service.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Load a document tree into the collection
    Ingest {
        /// Knowledge base root folder
        root: PathBuf,

        /// Ignore saved progress and process every document again
        #[arg(long)]
        fresh: bool,
    },

    /// Show collection size and language/category distribution
    Stats,

    /// Print the queries a question expands to
    Expand {
        question: String,

        /// Maximum number of queries (defaults to search.max_queries)
        #[arg(short = 'n', long)]
        max_queries: Option<usize>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration (file, defaults and env overrides merged)
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
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
    fn parses_multi_payload() {
        let cli = Cli::try_parse_from(["fshdkb", "multi", r#"{"question":"FSHD"}"#]).unwrap();
        assert!(matches!(cli.command, Commands::Multi { .. }));
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["fshdkb", "ask", "FSHD 会遗传吗", "--expand", "-v"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Ask { question, expand } => {
                assert_eq!(question, "FSHD 会遗传吗");
                assert!(expand);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
