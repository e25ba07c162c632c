use crate::classify::Classifier;
use crate::error::{LocError, Result};
use crate::identity::IdentityResolver;
use crate::model::{Attribution, CommitRecord, Counter, Diagnostic};
use crate::snapshot::Snapshot;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    Applied,
    AlreadyProcessed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthorFilter {
    #[default]
    All,
    /// Commits whose author matches no identity rule are recorded as
    /// processed but contribute nothing.
    MatchedOnly,
}

/// Folds commit records into snapshots. Holds only immutable configuration,
/// so one aggregator can serve any number of snapshots and threads.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    classifier: Classifier,
    resolver: IdentityResolver,
    author_filter: AuthorFilter,
}

impl Aggregator {
    pub fn new(classifier: Classifier, resolver: IdentityResolver) -> Self {
        Self {
            classifier,
            resolver,
            author_filter: AuthorFilter::All,
        }
    }

    pub fn with_author_filter(mut self, author_filter: AuthorFilter) -> Self {
        self.author_filter = author_filter;
        self
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// The contribution `commit` would make, without touching any snapshot.
    pub fn attribute(&self, commit: &CommitRecord) -> Result<Attribution> {
        let timestamp = commit
            .timestamp
            .ok_or_else(|| LocError::malformed(&commit.commit_id, "missing timestamp"))?;

        let resolution = self.resolver.resolution(&commit.raw_author);
        let mut languages: BTreeMap<String, Counter> = BTreeMap::new();

        if resolution.matched || self.author_filter == AuthorFilter::All {
            for delta in &commit.file_deltas {
                if self.classifier.is_excluded(&delta.path) {
                    continue;
                }
                let language = self.classifier.classify(&delta.path);
                let (added, removed) = if delta.is_binary {
                    (0, 0)
                } else {
                    (delta.lines_added, delta.lines_removed)
                };
                languages
                    .entry(language.to_string())
                    .or_default()
                    .record(added, removed)
                    .ok_or_else(|| LocError::malformed(&commit.commit_id, "line counts overflow"))?;
            }
        }

        Ok(Attribution {
            timestamp,
            identity: resolution.identity,
            languages,
        })
    }

    /// Folds one commit into `snapshot`. Replays are no-ops; a malformed
    /// record is rejected and leaves `snapshot` untouched.
    pub fn fold(&self, snapshot: &mut Snapshot, commit: &CommitRecord) -> Result<FoldOutcome> {
        if commit.commit_id.trim().is_empty() {
            return Err(LocError::malformed("<empty>", "missing commit id"));
        }
        if snapshot.is_processed(&commit.commit_id) {
            debug!(commit = %commit.commit_id, "commit already folded, skipping");
            return Ok(FoldOutcome::AlreadyProcessed);
        }

        let attribution = self.attribute(commit)?;
        snapshot
            .apply(commit.commit_id.clone(), attribution)
            .map_err(|e| match e {
                LocError::CounterOverflow { commit_id } => {
                    LocError::malformed(commit_id, "line counts overflow the snapshot counters")
                }
                other => other,
            })?;
        Ok(FoldOutcome::Applied)
    }

    /// Pure form of [`Aggregator::fold`]: returns the folded copy and leaves
    /// the input alone.
    pub fn folded(&self, snapshot: &Snapshot, commit: &CommitRecord) -> Result<Snapshot> {
        let mut next = snapshot.clone();
        self.fold(&mut next, commit)?;
        Ok(next)
    }

    /// Folds a whole stream, stepping over malformed records. Returns one
    /// diagnostic per rejected commit.
    pub fn fold_all<'c, I>(&self, snapshot: &mut Snapshot, commits: I) -> Vec<Diagnostic>
    where
        I: IntoIterator<Item = &'c CommitRecord>,
    {
        let mut diagnostics = Vec::new();
        for commit in commits {
            if let Err(e) = self.fold(snapshot, commit) {
                warn!(commit = %commit.commit_id, error = %e, "rejected commit");
                diagnostics.push(malformed_diagnostic(None, &commit.commit_id, e));
            }
        }
        diagnostics
    }
}

pub(crate) fn malformed_diagnostic(repository: Option<&str>, commit_id: &str, error: LocError) -> Diagnostic {
    let (commit_id, reason) = match error {
        LocError::MalformedCommit { commit_id, reason } => (commit_id, reason),
        other => (commit_id.to_string(), other.to_string()),
    };
    Diagnostic::MalformedCommit {
        repository: repository.map(str::to_string),
        commit_id,
        reason,
    }
}
