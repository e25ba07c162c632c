use crate::merge::ConflictPolicy;
use crate::util::Granularity;
use crate::walker::MergePolicy;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "locflow")]
#[command(about = "Lines-of-code evolution by language and author, with mergeable snapshots")]
#[command(version)]
pub struct Cli {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone)]
pub struct CommonArgs {
    #[arg(long, help = "Path to git repository (repeatable, scanned in parallel)")]
    pub repo: Vec<PathBuf>,

    #[arg(long, help = "Directory holding the diff cache (default: <repo>/.locflow)")]
    pub cache: Option<PathBuf>,

    #[arg(long, help = "Do not read or write the diff cache")]
    pub no_cache: bool,

    #[arg(long, help = "Path to locflow.toml (defaults to the first repository's)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Start from this date (RFC3339, YYYY-MM-DD, or natural language), or a commit when scanning one repository")]
    pub since: Option<String>,

    #[arg(long, help = "End at this date (RFC3339, YYYY-MM-DD, or natural language), or a commit when scanning one repository")]
    pub until: Option<String>,
}

#[derive(Args, Clone)]
pub struct ScanArgs {
    #[arg(long, help = "Snapshot to resume from; updated in place unless --output is given")]
    pub snapshot: Option<PathBuf>,

    #[arg(long, short = 'o', help = "Write the resulting snapshot here")]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, help = "Period size for new snapshots")]
    pub granularity: Option<Granularity>,

    #[arg(long, value_enum, help = "How merge commits are diffed")]
    pub merge_policy: Option<MergePolicy>,

    #[arg(long, help = "Stop after folding this many new commits per repository")]
    pub limit: Option<usize>,

    #[arg(long, help = "Output the snapshot as JSON")]
    pub json: bool,

    #[arg(long, help = "Output period rows as NDJSON")]
    pub ndjson: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fold repository history into a snapshot
    Scan(ScanArgs),
    /// Combine snapshots into one
    Merge {
        #[arg(required = true, num_args = 1.., help = "Snapshot files, in precedence order")]
        files: Vec<PathBuf>,

        #[arg(long, short = 'o', help = "Write the merged snapshot here")]
        output: Option<PathBuf>,

        #[arg(long, value_enum, help = "Which input wins a disagreement (default: from config, else first-input)")]
        conflict_policy: Option<ConflictPolicy>,

        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
    /// Print the period table or event log of a snapshot
    Report {
        #[arg(help = "Snapshot file")]
        snapshot: PathBuf,

        #[arg(long, help = "List per-commit events instead of period totals")]
        events: bool,

        #[arg(long, help = "Output as JSON")]
        json: bool,

        #[arg(long, help = "Output as NDJSON")]
        ndjson: bool,
    },
}

impl Cli {
    pub fn execute(self) -> Result<()> {
        match self.command {
            Commands::Scan(args) => crate::scan::exec(self.common, args),
            Commands::Merge {
                files,
                output,
                conflict_policy,
                json,
            } => crate::merge::exec(self.common, files, output, conflict_policy, json),
            Commands::Report {
                snapshot,
                events,
                json,
                ndjson,
            } => crate::report::exec(&snapshot, events, json, ndjson),
        }
    }
}
