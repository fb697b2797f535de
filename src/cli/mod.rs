//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// docembed - chunk, embed and search documents
#[derive(Parser, Debug)]
#[command(name = "docembed", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.docembed/data/docembed.db)
    #[arg(long, global = true, env = "DOCEMBED_DB")]
    pub db: Option<PathBuf>,

    /// Owner UUID every record and job is scoped to
    #[arg(long, global = true, env = "DOCEMBED_OWNER")]
    pub owner: Option<String>,

    /// Output as JSON (for agent integration)
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chunk, embed and store text or files
    Ingest {
        #[command(subcommand)]
        command: IngestCommands,
    },

    /// Find the records most similar to a query
    Search(SearchArgs),

    /// List stored records
    List {
        /// Maximum records to return
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show one record
    Show {
        /// Record ID
        id: String,
    },

    /// Update a record's name, description or metadata
    Update(UpdateArgs),

    /// Delete a record
    Delete {
        /// Record ID
        id: String,
    },

    /// Searches that returned a record, newest first
    Usage {
        /// Record ID
        id: String,

        /// Maximum rows to return
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Audit trail of a record, newest first
    History {
        /// Record ID
        id: String,

        /// Maximum events to return
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Per-agent retrieval settings
    #[command(name = "agent-settings")]
    AgentSettings {
        #[command(subcommand)]
        command: AgentSettingsCommands,
    },

    /// Ingestion job tracking
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Preview chunk boundaries for a file without embedding it
    Chunk {
        /// File to chunk
        file: PathBuf,

        #[command(flatten)]
        chunking: ChunkArgs,
    },

    /// Embedding provider configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Test provider connectivity
    Test {
        /// Text to embed
        #[arg(default_value = "Hello, world!")]
        text: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Ingest Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum IngestCommands {
    /// Ingest pasted text (reads stdin when no text is given)
    Text {
        /// Text to ingest
        text: Option<String>,

        #[command(flatten)]
        common: IngestArgs,
    },

    /// Ingest one or more files as a single job
    File {
        /// Files to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        common: IngestArgs,
    },
}

/// Options shared by every ingest command.
#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// Collection name stored on every record
    #[arg(short, long)]
    pub name: String,

    /// Description stored on every record
    #[arg(short, long)]
    pub description: Option<String>,

    /// Extra metadata as a JSON object, copied into every chunk
    #[arg(short, long)]
    pub metadata: Option<String>,

    /// Parallel embedding calls (default from config, else 1)
    #[arg(long)]
    pub concurrency: Option<usize>,

    #[command(flatten)]
    pub chunking: ChunkArgs,
}

/// Chunker overrides.
#[derive(Args, Debug, Clone, Copy)]
pub struct ChunkArgs {
    /// Characters per chunk (default from config, else 1000)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Characters shared by consecutive chunks (default from config, else 200)
    #[arg(long)]
    pub chunk_overlap: Option<usize>,
}

// ============================================================================
// Search / Update
// ============================================================================

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Query text
    pub query: String,

    /// Maximum results (default from agent settings, else 5)
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Minimum cosine similarity, -1.0 to 1.0 (default from agent settings, else 0.7)
    #[arg(short, long, allow_negative_numbers = true)]
    pub threshold: Option<f32>,

    /// Agent searching on the owner's behalf; selects its saved settings
    #[arg(long)]
    pub agent: Option<String>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Record ID
    pub id: String,

    /// New collection name
    #[arg(short, long)]
    pub name: Option<String>,

    /// New description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Replacement metadata as a JSON object (must keep "content")
    #[arg(short, long)]
    pub metadata: Option<String>,
}

// ============================================================================
// Job Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum JobCommands {
    /// Show a job
    Show {
        /// Job ID
        id: String,
    },

    /// List jobs, newest first
    List {
        /// Filter by status (processing, completed, failed)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum jobs to return
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Audit trail of a job, newest first
    History {
        /// Job ID
        id: String,
    },

    /// Fail processing jobs that stopped making progress
    Reap {
        /// Seconds without progress before a job counts as abandoned
        #[arg(long, default_value_t = 3600)]
        max_age_secs: u64,
    },
}

// ============================================================================
// Agent Settings Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum AgentSettingsCommands {
    /// Show an agent's saved settings
    Get {
        /// Agent ID
        agent: String,
    },

    /// Create or change an agent's settings
    Set {
        /// Agent ID
        agent: String,

        /// Allow searches for this agent (true or false)
        #[arg(long)]
        enabled: Option<bool>,

        /// Default maximum results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Default minimum cosine similarity (-1.0 to 1.0)
        #[arg(short, long, allow_negative_numbers = true)]
        threshold: Option<f32>,
    },
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show saved and effective settings
    Show,

    /// Save provider settings to ~/.docembed/config.json
    Set {
        /// Provider (openai, ollama, hash)
        #[arg(short, long)]
        provider: Option<String>,

        /// Model id
        #[arg(short, long)]
        model: Option<String>,

        /// Provider base URL
        #[arg(short, long)]
        endpoint: Option<String>,

        /// API key (OpenAI)
        #[arg(long)]
        api_key: Option<String>,

        /// Default characters per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Default chunk overlap
        #[arg(long)]
        chunk_overlap: Option<usize>,

        /// Default parallel embedding calls
        #[arg(long)]
        concurrency: Option<usize>,

        /// Per-call provider timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Remove saved provider settings
    Reset,
}
