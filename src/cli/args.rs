//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--uri <url>`: Service endpoint
//! - `--page-size <n>`: Records requested per page
//! - `--json`: Structured output on stdout
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand, ValueEnum};

use crate::core::model::ReferenceKind;

/// lakeref - branches, tags and commits on a versioned data lake catalog
#[derive(Parser, Debug)]
#[command(name = "lakeref")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Service endpoint, e.g. http://localhost:19120/api/v2
    #[arg(long, global = true, value_name = "URL")]
    pub uri: Option<String>,

    /// Records requested per page
    #[arg(long, global = true, value_name = "N")]
    pub page_size: Option<u32>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List branches and tags
    #[command(
        name = "refs",
        after_help = "\
EXAMPLES:
    lakeref refs
    lakeref refs --filter \"refType == 'TAG'\"
    lakeref refs --json"
    )]
    Refs {
        /// Filter expression evaluated by the service
        #[arg(long)]
        filter: Option<String>,
    },

    /// Show one reference and its current hash
    #[command(name = "show")]
    Show {
        /// Reference name
        name: String,
    },

    /// Create a branch or tag
    #[command(
        name = "create",
        long_about = "Create a branch or tag.\n\n\
            The new reference starts where --from points: a name (its current \
            head), name@hash, or @hash. Without --from it starts at the \
            default branch.",
        after_help = "\
EXAMPLES:
    lakeref create branch etl
    lakeref create tag v1 --from main@2e1cfa82b035c26c"
    )]
    Create {
        #[arg(value_enum)]
        kind: KindArg,
        name: String,
        /// Where the new reference starts
        #[arg(long, value_name = "REF")]
        from: Option<String>,
    },

    /// Move a branch or tag to another commit
    #[command(name = "assign")]
    Assign {
        #[arg(value_enum)]
        kind: KindArg,
        name: String,
        /// Hash the reference must currently be at
        #[arg(long, value_name = "HASH")]
        expected: String,
        /// Target commit: a name, name@hash or @hash
        #[arg(long, value_name = "REF")]
        to: String,
    },

    /// Delete a branch or tag
    #[command(name = "delete")]
    Delete {
        #[arg(value_enum)]
        kind: KindArg,
        name: String,
        /// Hash the reference must currently be at
        #[arg(long, value_name = "HASH")]
        expected: String,
    },

    /// Show commit history, newest first
    #[command(
        name = "log",
        after_help = "\
EXAMPLES:
    lakeref log
    lakeref log etl -n 5
    lakeref log main --until 2e1cfa82b035c26c"
    )]
    Log {
        /// Reference (defaults to the default branch)
        reference: Option<String>,
        /// Show at most N commits
        #[arg(short = 'n', long = "max-count", value_name = "N")]
        max_count: Option<usize>,
        /// Stop after this commit (inclusive)
        #[arg(long, value_name = "HASH")]
        until: Option<String>,
        /// Filter expression evaluated by the service
        #[arg(long)]
        filter: Option<String>,
    },

    /// Show keys whose content differs between two references
    #[command(
        name = "diff",
        long_about = "Show keys whose content differs between two references.\n\n\
            Each side is a name (its current head), name@hash or @hash. \
            Lines are marked + (only in TO), - (only in FROM) or ~ (changed).",
        after_help = "\
EXAMPLES:
    lakeref diff main etl
    lakeref diff main@2e1cfa82b035c26c main"
    )]
    Diff {
        /// Base side
        from: String,
        /// Compared side
        to: String,
    },

    /// List content keys
    #[command(name = "contents")]
    Contents {
        /// Reference (defaults to the default branch)
        reference: Option<String>,
        /// Only keys under this namespace
        #[arg(long, value_name = "KEY")]
        prefix: Option<String>,
    },

    /// Print content objects
    #[command(
        name = "get",
        after_help = "\
EXAMPLES:
    lakeref get main db.orders
    lakeref get @2e1cfa82b035c26c db.orders db.users"
    )]
    Get {
        /// Reference to read from
        reference: String,
        /// Content keys, elements separated by '.'
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Commit puts and deletes to a branch
    #[command(
        name = "commit",
        long_about = "Commit puts and deletes to a branch.\n\n\
            The commit is applied only if the branch is still at --expected. \
            Content is given as JSON, e.g. \
            '{\"type\":\"ICEBERG_TABLE\",\"metadataLocation\":\"s3://t/v1.json\",\"snapshotId\":1}'. \
            To update an existing key, include its current \"id\".",
        after_help = "\
EXAMPLES:
    lakeref commit main --expected 2e1cfa82 -m 'add orders' \\
        --put 'db.orders={\"type\":\"ICEBERG_TABLE\",\"metadataLocation\":\"s3://o\",\"snapshotId\":1}'
    lakeref commit main --expected 8f2a91cc -m 'drop tmp' --delete db.tmp"
    )]
    Commit {
        branch: String,
        /// Hash the branch must currently be at
        #[arg(long, value_name = "HASH")]
        expected: String,
        /// Commit message
        #[arg(short, long)]
        message: String,
        /// Commit author
        #[arg(long)]
        author: Option<String>,
        /// KEY=JSON content to store
        #[arg(long = "put", value_name = "KEY=JSON")]
        puts: Vec<String>,
        /// Key to delete
        #[arg(long = "delete", value_name = "KEY")]
        deletes: Vec<String>,
    },

    /// Merge a reference into a branch
    #[command(name = "merge")]
    Merge {
        /// Source: a name, name@hash or @hash
        from: String,
        /// Target branch
        #[arg(long, value_name = "BRANCH")]
        into: String,
        /// Hash the target must currently be at
        #[arg(long, value_name = "HASH")]
        expected: String,
        /// Merge commit message
        #[arg(short, long)]
        message: Option<String>,
        /// Check for conflicts without applying
        #[arg(long)]
        dry_run: bool,
    },

    /// Replay commits onto a branch
    #[command(
        name = "transplant",
        long_about = "Replay commits onto a branch, in the order given.\n\n\
            Commits are applied one at a time. If one fails after others \
            were applied, the applied commits stay and are reported.",
        after_help = "\
EXAMPLES:
    lakeref transplant 8f2a91cc 3d77e0aa --from etl --into main --expected 2e1cfa82"
    )]
    Transplant {
        /// Commits to replay
        #[arg(required = true, value_name = "HASH")]
        hashes: Vec<String>,
        /// Branch the commits come from
        #[arg(long, value_name = "REF")]
        from: String,
        /// Target branch
        #[arg(long, value_name = "BRANCH")]
        into: String,
        /// Hash the target must currently be at
        #[arg(long, value_name = "HASH")]
        expected: String,
        /// Message for every replayed commit
        #[arg(short, long)]
        message: Option<String>,
        /// Check every commit applies without applying
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        after_help = "\
EXAMPLES:
    lakeref completion bash > ~/.local/share/bash-completion/completions/lakeref
    lakeref completion zsh > ~/.zfunc/_lakeref"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Reference kind on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindArg {
    Branch,
    Tag,
}

impl From<KindArg> for ReferenceKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Branch => ReferenceKind::Branch,
            KindArg::Tag => ReferenceKind::Tag,
        }
    }
}

/// Supported shells for completion
#[derive(ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}
