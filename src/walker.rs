//! Ordered, deduplicated stream of commit records.
//!
//! Metadata for the whole history is listed once, up front, because a
//! parent-first order cannot be known before every commit has been seen.
//! Diffs are the expensive part and are requested one commit at a time as
//! the stream is consumed, so folding starts before the history is fully
//! diffed and stopping early saves the remaining work.

use crate::classify::extract_delta;
use crate::error::Result;
use crate::git::GitAccess;
use crate::model::{CommitRecord, DateRange, FileDelta, RawCommit};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TraversalOrder {
    /// Topological, oldest ancestor first.
    #[default]
    ParentFirst,
    ChildFirst,
}

/// How merge commits are diffed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// Diff against the first parent only.
    #[default]
    FirstParent,
    /// Record the merge with no file changes.
    Ignore,
}

/// Shared stop flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct CommitWalker<'a, A: GitAccess + ?Sized> {
    access: &'a A,
    order: TraversalOrder,
    merge_policy: MergePolicy,
    range: DateRange,
    checkpoint: HashSet<String>,
    cancel: CancelToken,
    queue: Option<VecDeque<RawCommit>>,
    listed: HashSet<String>,
    seen: HashSet<String>,
    done: bool,
}

impl<'a, A: GitAccess + ?Sized> CommitWalker<'a, A> {
    pub fn new(access: &'a A) -> Self {
        Self {
            access,
            order: TraversalOrder::default(),
            merge_policy: MergePolicy::default(),
            range: DateRange::default(),
            checkpoint: HashSet::new(),
            cancel: CancelToken::new(),
            queue: None,
            listed: HashSet::new(),
            seen: HashSet::new(),
            done: false,
        }
    }

    pub fn order(mut self, order: TraversalOrder) -> Self {
        self.order = order;
        self
    }

    pub fn merge_policy(mut self, merge_policy: MergePolicy) -> Self {
        self.merge_policy = merge_policy;
        self
    }

    pub fn range(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    /// Commits already folded elsewhere; they are skipped without diffing.
    pub fn with_checkpoint<I, S>(mut self, processed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.checkpoint.extend(processed.into_iter().map(Into::into));
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn plan(&mut self) -> Result<VecDeque<RawCommit>> {
        let commits = self.access.list_commits()?;
        self.listed = commits.iter().map(|c| c.id.clone()).collect();

        let mut ordered = topological_order(commits);
        if self.order == TraversalOrder::ChildFirst {
            ordered.reverse();
        }
        debug!(
            count = ordered.len(),
            checkpointed = self.checkpoint.len(),
            "planned commit walk"
        );
        Ok(ordered.into())
    }

    fn build(&self, raw: RawCommit) -> Result<CommitRecord> {
        let timestamp = raw.timestamp.and_then(|secs| DateTime::from_timestamp(secs, 0));

        // Records without a timestamp are rejected downstream, so their diff
        // is never worth fetching.
        let skip_diff = timestamp.is_none()
            || (raw.parent_ids.len() > 1 && self.merge_policy == MergePolicy::Ignore);

        let file_deltas = if skip_diff {
            Vec::new()
        } else {
            let parent = raw
                .parent_ids
                .first()
                .map(String::as_str)
                .filter(|p| self.listed.contains(*p));
            self.access
                .diff(&raw.id, parent)?
                .iter()
                .map(|diff| {
                    let (lines_added, lines_removed) = extract_delta(diff);
                    FileDelta {
                        path: diff.path.clone(),
                        lines_added,
                        lines_removed,
                        is_binary: diff.is_binary(),
                    }
                })
                .collect()
        };

        Ok(CommitRecord {
            commit_id: raw.id,
            timestamp,
            raw_author: raw.author,
            parent_ids: raw.parent_ids,
            file_deltas,
        })
    }
}

impl<A: GitAccess + ?Sized> Iterator for CommitWalker<'_, A> {
    type Item = Result<CommitRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.queue.is_none() {
            match self.plan() {
                Ok(queue) => self.queue = Some(queue),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        loop {
            if self.cancel.is_cancelled() {
                info!("commit walk cancelled");
                self.done = true;
                return None;
            }

            let raw = match self.queue.as_mut().and_then(VecDeque::pop_front) {
                Some(raw) => raw,
                None => {
                    self.done = true;
                    return None;
                }
            };

            if !self.seen.insert(raw.id.clone()) || self.checkpoint.contains(&raw.id) {
                continue;
            }
            if let Some(ts) = raw.timestamp.and_then(|secs| DateTime::from_timestamp(secs, 0)) {
                if !self.range.contains(&ts) {
                    continue;
                }
            }

            let result = self.build(raw);
            if result.is_err() {
                self.done = true;
            }
            return Some(result);
        }
    }
}

/// Kahn's algorithm over the listed commits. Ready commits are released
/// oldest first, ties broken by id, so the order is deterministic. Parents
/// that are not listed do not constrain anything.
pub fn topological_order(commits: Vec<RawCommit>) -> Vec<RawCommit> {
    let mut unique: Vec<RawCommit> = Vec::with_capacity(commits.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for commit in commits {
        if !index.contains_key(&commit.id) {
            index.insert(commit.id.clone(), unique.len());
            unique.push(commit);
        }
    }

    let mut pending_parents = vec![0usize; unique.len()];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); unique.len()];
    for (i, commit) in unique.iter().enumerate() {
        let parents: HashSet<usize> = commit
            .parent_ids
            .iter()
            .filter_map(|p| index.get(p).copied())
            .filter(|&p| p != i)
            .collect();
        pending_parents[i] = parents.len();
        for p in parents {
            children[p].push(i);
        }
    }

    let sort_key = |i: usize| (unique[i].timestamp.unwrap_or(i64::MIN), unique[i].id.clone(), i);
    let mut ready: BinaryHeap<Reverse<(i64, String, usize)>> = (0..unique.len())
        .filter(|&i| pending_parents[i] == 0)
        .map(|i| Reverse(sort_key(i)))
        .collect();

    let mut emitted = vec![false; unique.len()];
    let mut order: Vec<usize> = Vec::with_capacity(unique.len());
    while let Some(Reverse((_, _, i))) = ready.pop() {
        emitted[i] = true;
        order.push(i);
        for &child in &children[i] {
            pending_parents[child] -= 1;
            if pending_parents[child] == 0 {
                ready.push(Reverse(sort_key(child)));
            }
        }
    }

    if order.len() < unique.len() {
        // Only reachable with a corrupt listing; git history is acyclic.
        warn!(
            stranded = unique.len() - order.len(),
            "commit listing contains a parent cycle, appending remaining commits by time"
        );
        let mut rest: Vec<usize> = (0..unique.len()).filter(|&i| !emitted[i]).collect();
        rest.sort_by_key(|&i| sort_key(i));
        order.extend(rest);
    }

    let mut slots: Vec<Option<RawCommit>> = unique.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}
