//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "mnemo",
    version,
    about = "Local-first retrieval and question answering over document collections",
    long_about = "Mnemo manages embedded document collections behind pluggable embedding and \
                  storage backends, retrieves with semantic, hybrid, MMR, contextual, and \
                  multi-query strategies, and answers questions over a collection with an \
                  optional LLM backend and extractive fallback."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/mnemo/config.toml)
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
    /// Manage collections
    Collection {
        #[command(subcommand)]
        action: CollectionAction,
    },

    /// Ingest files into a collection
    Ingest {
        /// Target collection
        collection: String,

        /// Files or directories to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Store oversized files whole instead of chunking them
        #[arg(long)]
        no_chunk: bool,

        /// Print the ingestion report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search a collection
    Query {
        /// Collection to search
        collection: String,

        /// Search query text
        query: String,

        /// Retrieval strategy: semantic, hybrid, mmr, contextual, multi-query
        #[arg(short, long)]
        strategy: Option<String>,

        /// Maximum number of results to return
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum similarity score in [0, 1]
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Boost results that overlap the query keywords
        #[arg(long)]
        rerank: bool,

        /// Drop near-duplicate results
        #[arg(long)]
        diversify: bool,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Ask a question over a collection
    Ask {
        /// Collection to answer from
        collection: String,

        /// Question to ask
        question: String,

        /// Retrieval strategy: semantic, hybrid, mmr, contextual, multi-query
        #[arg(short, long)]
        strategy: Option<String>,

        /// Number of context sources to retrieve
        #[arg(short, long)]
        limit: Option<usize>,

        /// Force extractive answers (disable the LLM even if configured)
        #[arg(long)]
        offline: bool,

        /// Answer without recording or consulting conversation history
        #[arg(long)]
        no_history: bool,

        /// List the sources under the answer
        #[arg(long)]
        sources: bool,

        /// Show the full response in JSON format
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
pub enum CollectionAction {
    /// Create a collection bound to the configured embedding provider
    Create {
        /// Collection name
        name: String,
    },

    /// List collections
    List {
        /// Show collections in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show statistics for one collection
    Stats {
        /// Collection name
        name: String,

        /// Show statistics in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Delete a collection and all its documents
    Delete {
        /// Collection name
        name: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
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
