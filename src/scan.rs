use crate::aggregate::{malformed_diagnostic, Aggregator, FoldOutcome};
use crate::cache::Cache;
use crate::cli::{CommonArgs, ScanArgs};
use crate::config::Config;
use crate::error::{LocError, Result};
use crate::git::repo::parse_date;
use crate::git::{CachedAccess, GitAccess, GitRepo};
use crate::merge::{merge_with, ConflictPolicy};
use crate::model::{DateRange, Diagnostic};
use crate::report::{output_summary, summary};
use crate::snapshot::Snapshot;
use crate::walker::{CancelToken, CommitWalker, MergePolicy, TraversalOrder};
use anyhow::Context;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub order: TraversalOrder,
    pub merge_policy: MergePolicy,
    pub range: DateRange,
    /// Stop after this many newly folded commits per repository.
    pub limit: Option<usize>,
    pub cancel: CancelToken,
    /// Precedence when per-repository results disagree about a commit.
    pub conflict_policy: ConflictPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub folded: usize,
    pub replayed: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Folds one repository's history into `snapshot`, which the caller owns.
///
/// Malformed commits become diagnostics and the walk continues. An access
/// layer failure ends the walk with an error; everything folded before it
/// stays in `snapshot`.
pub fn scan_repository<A: GitAccess + ?Sized>(
    access: &A,
    aggregator: &Aggregator,
    snapshot: &mut Snapshot,
    options: &ScanOptions,
    label: &str,
    progress: &ProgressBar,
) -> Result<ScanStats> {
    let walker = CommitWalker::new(access)
        .order(options.order)
        .merge_policy(options.merge_policy)
        .range(options.range.clone())
        .with_checkpoint(snapshot.processed_commit_ids().map(str::to_string))
        .cancel_token(options.cancel.clone());

    let mut stats = ScanStats::default();
    for record in walker {
        let record = record?;
        match aggregator.fold(snapshot, &record) {
            Ok(FoldOutcome::Applied) => {
                stats.folded += 1;
                progress.inc(1);
            }
            Ok(FoldOutcome::AlreadyProcessed) => stats.replayed += 1,
            Err(e) if e.is_recoverable() => {
                warn!(repository = label, commit = %record.commit_id, error = %e, "skipping commit");
                stats
                    .diagnostics
                    .push(malformed_diagnostic(Some(label), &record.commit_id, e));
            }
            Err(e) => return Err(e),
        }

        if options.limit.is_some_and(|limit| stats.folded >= limit) {
            info!(repository = label, folded = stats.folded, "commit limit reached");
            break;
        }
    }

    Ok(stats)
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryScan {
    pub repository: String,
    pub folded: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub snapshot: Snapshot,
    pub repositories: Vec<RepositoryScan>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ScanReport {
    pub fn all_failed(&self) -> bool {
        !self.repositories.is_empty() && self.repositories.iter().all(|r| r.error.is_some())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
}

/// Scans every repository in parallel, each from its own copy of `base`,
/// then merges `base` and the results in that order under
/// `options.conflict_policy`.
pub fn scan_all(
    repos: &[PathBuf],
    base: &Snapshot,
    aggregator: &Aggregator,
    options: &ScanOptions,
    cache: &CacheOptions,
    show_progress: bool,
) -> ScanReport {
    let multi = if show_progress {
        MultiProgress::new()
    } else {
        MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden())
    };

    let outcomes: Vec<(Snapshot, RepositoryScan, Vec<Diagnostic>)> = repos
        .par_iter()
        .map(|path| {
            let label = path.display().to_string();
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {prefix} {pos} commits {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_prefix(label.clone());

            let mut snapshot = base.clone();
            let result = scan_one(path, cache, aggregator, &mut snapshot, options, &label, &pb);
            match result {
                Ok(stats) => {
                    pb.finish_with_message("done");
                    info!(repository = %label, folded = stats.folded, "scan finished");
                    let scan = RepositoryScan {
                        repository: label,
                        folded: stats.folded,
                        error: None,
                    };
                    (snapshot, scan, stats.diagnostics)
                }
                Err(e) => {
                    pb.abandon_with_message("failed");
                    warn!(repository = %label, error = %e, "scan aborted");
                    let folded = snapshot.len().saturating_sub(base.len());
                    let diagnostic = Diagnostic::RepositoryFailed {
                        repository: label.clone(),
                        error: e.to_string(),
                    };
                    let scan = RepositoryScan {
                        repository: label,
                        folded,
                        error: Some(e.to_string()),
                    };
                    (snapshot, scan, vec![diagnostic])
                }
            }
        })
        .collect();

    let mut inputs = Vec::with_capacity(outcomes.len() + 1);
    inputs.push(base.clone());
    let mut repositories = Vec::with_capacity(outcomes.len());
    let mut diagnostics = Vec::new();
    for (snapshot, scan, mut diags) in outcomes {
        inputs.push(snapshot);
        repositories.push(scan);
        diagnostics.append(&mut diags);
    }

    let merged = merge_with(&inputs, options.conflict_policy);
    diagnostics.extend(merged.diagnostics());

    ScanReport {
        snapshot: merged.snapshot,
        repositories,
        diagnostics,
    }
}

/// A bound that is not a date would be resolved in one repository only.
fn names_revision(bound: Option<&str>) -> bool {
    bound.is_some_and(|b| matches!(parse_date(b), Ok(None)))
}

fn scan_one(
    path: &Path,
    cache: &CacheOptions,
    aggregator: &Aggregator,
    snapshot: &mut Snapshot,
    options: &ScanOptions,
    label: &str,
    progress: &ProgressBar,
) -> Result<ScanStats> {
    let repo = GitRepo::open(Some(path))?;
    if cache.enabled {
        let cache = Cache::new(cache.dir.as_deref(), repo.path())?;
        let access = CachedAccess::new(repo, cache);
        scan_repository(&access, aggregator, snapshot, options, label, progress)
    } else {
        scan_repository(&repo, aggregator, snapshot, options, label, progress)
    }
}

pub fn exec(common: CommonArgs, args: ScanArgs) -> anyhow::Result<()> {
    let repos = if common.repo.is_empty() {
        vec![std::env::current_dir()?]
    } else {
        common.repo.clone()
    };

    let config = Config::discover(common.config.as_deref(), repos.first().map(PathBuf::as_path))
        .context("Failed to load configuration")?;
    let aggregator = config.aggregator().context("Invalid configuration")?;

    let range = if common.since.is_some() || common.until.is_some() {
        if repos.len() > 1 && (names_revision(common.since.as_deref()) || names_revision(common.until.as_deref())) {
            return Err(LocError::Config(
                "--since/--until must be dates when scanning more than one repository".to_string(),
            )
            .into());
        }
        GitRepo::open(repos.first())
            .and_then(|repo| repo.resolve_range(common.since.as_deref(), common.until.as_deref()))
            .context("Failed to resolve date range")?
    } else {
        DateRange::new()
    };

    // A resumed snapshot keeps its own granularity unless the command line
    // asks for a different one.
    let base = match &args.snapshot {
        Some(path) if path.exists() => {
            let loaded = Snapshot::load(path)
                .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
            if let Some(requested) = args.granularity.filter(|g| *g != loaded.granularity()) {
                return Err(LocError::Config(format!(
                    "Snapshot {} uses {} periods but {} was requested",
                    path.display(),
                    loaded.granularity(),
                    requested
                ))
                .into());
            }
            info!(commits = loaded.len(), "resuming from snapshot");
            loaded
        }
        _ => Snapshot::new(args.granularity.unwrap_or(config.granularity)),
    };

    let options = ScanOptions {
        order: TraversalOrder::ParentFirst,
        merge_policy: args.merge_policy.unwrap_or(config.merge_policy),
        range,
        limit: args.limit,
        cancel: CancelToken::new(),
        conflict_policy: config.conflict_policy,
    };
    let cache = CacheOptions {
        enabled: !common.no_cache,
        dir: common.cache.clone(),
    };

    let machine_output = args.json || args.ndjson;
    let report = scan_all(&repos, &base, &aggregator, &options, &cache, !machine_output);

    for diagnostic in &report.diagnostics {
        eprintln!("{} {diagnostic}", style("warning:").yellow().bold());
    }
    if report.all_failed() {
        anyhow::bail!("No repository could be scanned");
    }

    if let Some(path) = args.output.as_ref().or(args.snapshot.as_ref()) {
        report
            .snapshot
            .save(path)
            .with_context(|| format!("Failed to write snapshot to {}", path.display()))?;
        info!(path = %path.display(), "snapshot written");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.snapshot)?);
    } else if args.ndjson {
        crate::report::output_ndjson(&crate::report::period_table(&report.snapshot))?;
    } else {
        output_summary(&summary(&report.snapshot));
    }

    Ok(())
}
