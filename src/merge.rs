//! Combining independently built snapshots.
//!
//! Each input's ledger says what every commit it folded contributed. The
//! merged ledger keeps one attribution per commit id, chosen by input
//! precedence, and the counters are rebuilt from it, so a commit shared by
//! several inputs is summed once. Inputs that disagree about a shared commit
//! are reported as [`Conflict`]s.

use crate::cli::CommonArgs;
use crate::config::Config;
use crate::model::{Attribution, Diagnostic};
use crate::snapshot::Snapshot;
use crate::util::Granularity;
use anyhow::Context;
use console::style;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Which input wins when inputs attribute the same commit differently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    #[default]
    FirstInput,
    LastInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub input: usize,
    pub attribution: Attribution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub commit_id: String,
    pub kept: Provenance,
    pub rejected: Vec<Provenance>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub snapshot: Snapshot,
    pub conflicts: Vec<Conflict>,
    /// Commits left out because adding them would overflow the counters.
    pub overflowed: Vec<String>,
}

impl MergeResult {
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.conflicts
            .iter()
            .map(|c| {
                let mut inputs: Vec<usize> = std::iter::once(c.kept.input)
                    .chain(c.rejected.iter().map(|r| r.input))
                    .collect();
                inputs.sort_unstable();
                Diagnostic::MergeConflict {
                    commit_id: c.commit_id.clone(),
                    inputs,
                }
            })
            .chain(self.overflowed.iter().map(|commit_id| Diagnostic::MalformedCommit {
                repository: None,
                commit_id: commit_id.clone(),
                reason: "line counts overflow the merged counters".to_string(),
            }))
            .collect()
    }
}

pub fn merge(snapshots: &[Snapshot]) -> MergeResult {
    merge_with(snapshots, ConflictPolicy::FirstInput)
}

pub fn merge_with(snapshots: &[Snapshot], policy: ConflictPolicy) -> MergeResult {
    let granularity = Granularity::coarsest(snapshots.iter().map(Snapshot::granularity)).unwrap_or_default();
    if snapshots.iter().any(|s| s.granularity() != granularity) {
        info!(%granularity, "inputs use different granularities, merging at the coarsest");
    }

    let precedence: Vec<usize> = match policy {
        ConflictPolicy::FirstInput => (0..snapshots.len()).collect(),
        ConflictPolicy::LastInput => (0..snapshots.len()).rev().collect(),
    };

    let mut kept: BTreeMap<&str, (usize, &Attribution)> = BTreeMap::new();
    let mut rejected: BTreeMap<&str, Vec<(usize, &Attribution)>> = BTreeMap::new();

    for input in precedence {
        for (commit_id, attribution) in snapshots[input].attributions() {
            let commit_id = commit_id.as_str();
            match kept.get(commit_id) {
                None => {
                    kept.insert(commit_id, (input, attribution));
                }
                Some((_, winner)) if *winner != attribution => {
                    rejected.entry(commit_id).or_default().push((input, attribution));
                }
                Some(_) => {}
            }
        }
    }

    let conflicts: Vec<Conflict> = rejected
        .into_iter()
        .map(|(commit_id, mut losers)| {
            losers.sort_by_key(|(input, _)| *input);
            let (input, attribution) = kept[commit_id];
            Conflict {
                commit_id: commit_id.to_string(),
                kept: Provenance {
                    input,
                    attribution: attribution.clone(),
                },
                rejected: losers
                    .into_iter()
                    .map(|(input, attribution)| Provenance {
                        input,
                        attribution: attribution.clone(),
                    })
                    .collect(),
            }
        })
        .collect();

    if !conflicts.is_empty() {
        warn!(count = conflicts.len(), ?policy, "resolved conflicting attributions by precedence");
    }

    let ledger: BTreeMap<String, Attribution> = kept
        .into_iter()
        .map(|(commit_id, (_, attribution))| (commit_id.to_string(), attribution.clone()))
        .collect();
    let version = snapshots.iter().map(Snapshot::version).max().map_or(0, |v| v + 1);

    let (snapshot, overflowed) = Snapshot::from_ledger_skipping_overflow(granularity, version, ledger);
    if !overflowed.is_empty() {
        warn!(count = overflowed.len(), "left out commits that overflow the merged counters");
    }

    MergeResult {
        snapshot,
        conflicts,
        overflowed,
    }
}

pub fn exec(
    common: CommonArgs,
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    policy: Option<ConflictPolicy>,
    json: bool,
) -> anyhow::Result<()> {
    let policy = match policy {
        Some(policy) => policy,
        None => {
            Config::discover(common.config.as_deref(), common.repo.first().map(PathBuf::as_path))
                .context("Failed to load configuration")?
                .conflict_policy
        }
    };

    let snapshots = inputs
        .iter()
        .map(|path| Snapshot::load(path).with_context(|| format!("Failed to load snapshot {}", path.display())))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let result = merge_with(&snapshots, policy);
    info!(
        inputs = snapshots.len(),
        commits = result.snapshot.len(),
        conflicts = result.conflicts.len(),
        "merged snapshots"
    );

    if let Some(path) = &output {
        result
            .snapshot
            .save(path)
            .with_context(|| format!("Failed to write merged snapshot to {}", path.display()))?;
    }

    if json {
        if output.is_none() {
            println!("{}", serde_json::to_string_pretty(&result.snapshot)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&result.conflicts)?);
        }
    } else {
        output_conflicts(&result.conflicts, &inputs);
        if output.is_none() {
            crate::report::output_summary(&crate::report::summary(&result.snapshot));
        }
    }

    for diagnostic in result.diagnostics() {
        eprintln!("{} {diagnostic}", style("warning:").yellow().bold());
    }

    Ok(())
}

fn output_conflicts(conflicts: &[Conflict], inputs: &[PathBuf]) {
    if conflicts.is_empty() {
        println!("{}", style("No conflicting attributions").green());
        return;
    }

    println!(
        "{:<12} {:<30} {:<30} {:>10}",
        style("Commit").bold(),
        style("Kept").bold(),
        style("Rejected").bold(),
        style("Kept from").bold()
    );
    println!("{}", "─".repeat(86));
    for c in conflicts {
        let short: String = c.commit_id.chars().take(10).collect();
        let rejected = c
            .rejected
            .iter()
            .map(|r| r.attribution.identity.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let from = inputs
            .get(c.kept.input)
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| c.kept.input.to_string());
        println!(
            "{:<12} {:<30} {:<30} {:>10}",
            short,
            c.kept.attribution.identity.to_string(),
            rejected,
            from
        );
    }
}
