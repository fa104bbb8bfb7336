use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "docgit",
    about = "A transactional document database stored as a Git object graph",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the database (a bare git repository)
    #[arg(short, long, global = true, default_value = ".docgit")]
    pub database: PathBuf,

    /// Branch a new database starts with
    #[arg(long, global = true, default_value = "master")]
    pub branch_default: String,

    /// Name recorded as author of new commits
    #[arg(long, global = true, default_value = "docgit")]
    pub author: String,

    /// Email recorded as author of new commits
    #[arg(long, global = true, default_value = "docgit@localhost")]
    pub email: String,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print one document
    Get(GetArgs),
    /// List documents under a prefix
    Ls(LsArgs),
    /// Store a document (content from --content, --file or stdin)
    Save(SaveArgs),
    /// Delete a document
    Rm(RmArgs),
    /// List, create, or delete branches
    Branch(BranchArgs),
    /// Create or delete tags
    Tag(TagArgs),
    /// Merge one branch into another
    Merge(MergeArgs),
    /// Replay one branch's commits onto another
    Rebase(MergeArgs),
    /// Show changed documents between two refs
    Diff(DiffArgs),
    /// Show commits reachable from one ref but not another
    Log(LogArgs),
}

#[derive(Args)]
pub struct GetArgs {
    pub branch: String,
    pub key: String,
}

#[derive(Args)]
pub struct LsArgs {
    pub branch: String,
    #[arg(default_value = "")]
    pub prefix: String,
    #[arg(long, default_value = "0")]
    pub start: usize,
    #[arg(long)]
    pub page_size: Option<usize>,
}

#[derive(Args)]
pub struct SaveArgs {
    pub branch: String,
    pub key: String,
    #[arg(short, long)]
    pub message: Option<String>,
    #[arg(long, conflicts_with = "file")]
    pub content: Option<String>,
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct RmArgs {
    pub branch: String,
    pub key: String,
    #[arg(short, long)]
    pub message: Option<String>,
}

#[derive(Args)]
pub struct BranchArgs {
    #[command(subcommand)]
    pub action: BranchAction,
}

#[derive(Subcommand)]
pub enum BranchAction {
    /// List branches and their heads
    List,
    /// Create a branch from a branch, tag or commit
    Create {
        name: String,
        #[arg(long, default_value = "master")]
        from: String,
    },
    /// Delete a branch and abort its open transactions
    Delete { name: String },
}

#[derive(Args)]
pub struct TagArgs {
    #[command(subcommand)]
    pub action: TagAction,
}

#[derive(Subcommand)]
pub enum TagAction {
    /// Tag a branch, tag or commit
    Create { name: String, target: String },
    /// Delete a tag (the commit stays)
    Delete { name: String },
}

#[derive(Args)]
pub struct MergeArgs {
    pub source: String,
    pub target: String,
    #[arg(short, long)]
    pub message: Option<String>,
}

#[derive(Args)]
pub struct DiffArgs {
    pub from: String,
    pub to: String,
}

#[derive(Args)]
pub struct LogArgs {
    pub from: String,
    pub to: String,
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
    #[arg(long)]
    pub oneline: bool,
}
