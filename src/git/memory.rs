use super::GitAccess;
use crate::error::{LocError, Result};
use crate::model::{RawAuthor, RawCommit, RawFileDiff};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// A repository held entirely in memory. Diffs are stored per commit
/// against its first parent.
#[derive(Debug, Default)]
pub struct MemoryRepo {
    commits: Vec<RawCommit>,
    diffs: HashMap<String, Vec<RawFileDiff>>,
    failing: HashSet<String>,
    requests: Mutex<Vec<String>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_commit(mut self, commit: RawCommit, diffs: Vec<RawFileDiff>) -> Self {
        self.diffs.insert(commit.id.clone(), diffs);
        self.commits.push(commit);
        self
    }

    /// Shorthand: `author` in `Name <email>` form, `timestamp` in epoch
    /// seconds.
    pub fn commit(self, id: &str, author: &str, timestamp: i64, parents: &[&str], diffs: Vec<RawFileDiff>) -> Self {
        let commit = RawCommit {
            id: id.to_string(),
            author: RawAuthor::parse(author),
            timestamp: Some(timestamp),
            parent_ids: parents.iter().map(|p| p.to_string()).collect(),
        };
        self.with_commit(commit, diffs)
    }

    /// Makes every diff request for `commit_id` fail as an I/O error would.
    pub fn fail_diff(mut self, commit_id: &str) -> Self {
        self.failing.insert(commit_id.to_string());
        self
    }

    /// Commit ids whose diffs were requested, in request order.
    pub fn diff_requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl GitAccess for MemoryRepo {
    fn list_commits(&self) -> Result<Vec<RawCommit>> {
        Ok(self.commits.clone())
    }

    fn diff(&self, commit_id: &str, _parent_id: Option<&str>) -> Result<Vec<RawFileDiff>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(commit_id.to_string());
        }
        if self.failing.contains(commit_id) {
            return Err(LocError::GitRepo(format!("could not read diff for {commit_id}")));
        }
        self.diffs
            .get(commit_id)
            .cloned()
            .ok_or_else(|| LocError::GitRepo(format!("unknown commit {commit_id}")))
    }
}
