use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawAuthor {
    pub name: String,
    pub email: String,
}

impl RawAuthor {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Parses the `Name <email>` form. Anything without angle brackets is
    /// taken as a bare name.
    pub fn parse(raw: &str) -> Self {
        match (raw.find('<'), raw.rfind('>')) {
            (Some(open), Some(close)) if open < close => Self {
                name: raw[..open].trim().to_string(),
                email: raw[open + 1..close].trim().to_string(),
            },
            _ => Self {
                name: raw.trim().to_string(),
                email: String::new(),
            },
        }
    }
}

impl fmt::Display for RawAuthor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Commit metadata as listed by a git access layer, before any diffing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCommit {
    pub id: String,
    pub author: RawAuthor,
    /// Seconds since the epoch; `None` when the upstream object carried no
    /// usable time.
    pub timestamp: Option<i64>,
    pub parent_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffBody {
    Binary,
    Counted { added: u64, removed: u64 },
    Unified(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFileDiff {
    pub path: String,
    pub body: DiffBody,
}

impl RawFileDiff {
    pub fn counted(path: impl Into<String>, added: u64, removed: u64) -> Self {
        Self {
            path: path.into(),
            body: DiffBody::Counted { added, removed },
        }
    }

    pub fn binary(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            body: DiffBody::Binary,
        }
    }

    pub fn unified(path: impl Into<String>, patch: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            body: DiffBody::Unified(patch.into()),
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.body, DiffBody::Binary)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDelta {
    pub path: String,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub is_binary: bool,
}

/// One commit, normalized for folding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub commit_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub raw_author: RawAuthor,
    pub parent_ids: Vec<String>,
    pub file_deltas: Vec<FileDelta>,
}

impl CommitRecord {
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }
}

/// Canonical contributor key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Added/removed line counts plus the number of file deltas folded in.
/// `net` is derived, so it always equals `added - removed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub added: u64,
    pub removed: u64,
    pub files: u64,
}

impl Counter {
    pub fn new(added: u64, removed: u64, files: u64) -> Self {
        Self {
            added,
            removed,
            files,
        }
    }

    pub fn net(&self) -> i64 {
        let net = i128::from(self.added) - i128::from(self.removed);
        net.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    /// Sum of both counters, or `None` if any field would overflow.
    pub fn checked_add(&self, other: &Counter) -> Option<Counter> {
        Some(Counter {
            added: self.added.checked_add(other.added)?,
            removed: self.removed.checked_add(other.removed)?,
            files: self.files.checked_add(other.files)?,
        })
    }

    /// Adds one file delta. Returns `None`, leaving `self` unchanged, on
    /// overflow.
    pub fn record(&mut self, added: u64, removed: u64) -> Option<()> {
        *self = self.checked_add(&Counter::new(added, removed, 1))?;
        Some(())
    }

    /// Saturating sum, for views over counters whose total is already known
    /// to fit.
    pub fn absorb(&mut self, other: &Counter) {
        self.added = self.added.saturating_add(other.added);
        self.removed = self.removed.saturating_add(other.removed);
        self.files = self.files.saturating_add(other.files);
    }

    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.files == 0
    }
}

/// What a single commit contributed, as recorded in a snapshot's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub timestamp: DateTime<Utc>,
    pub identity: Identity,
    pub languages: BTreeMap<String, Counter>,
}

/// Recoverable problems reported next to a still-usable result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    MalformedCommit {
        repository: Option<String>,
        commit_id: String,
        reason: String,
    },
    MergeConflict {
        commit_id: String,
        inputs: Vec<usize>,
    },
    RepositoryFailed {
        repository: String,
        error: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MalformedCommit {
                repository,
                commit_id,
                reason,
            } => match repository {
                Some(repo) => write!(f, "{repo}: skipped malformed commit {commit_id}: {reason}"),
                None => write!(f, "skipped malformed commit {commit_id}: {reason}"),
            },
            Diagnostic::MergeConflict { commit_id, inputs } => write!(
                f,
                "conflicting attribution for commit {commit_id} across inputs {inputs:?}"
            ),
            Diagnostic::RepositoryFailed { repository, error } => {
                write!(f, "{repository}: scan aborted: {error}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DateRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new() -> Self {
        Self { since: None, until: None }
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        if let Some(since) = self.since {
            if timestamp < &since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if timestamp > &until {
                return false;
            }
        }
        true
    }

    pub fn is_unbounded(&self) -> bool {
        self.since.is_none() && self.until.is_none()
    }
}

impl Default for DateRange {
    fn default() -> Self {
        Self::new()
    }
}
