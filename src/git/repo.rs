use super::GitAccess;
use crate::error::{LocError, Result};
use crate::model::{DateRange, RawAuthor, RawCommit, RawFileDiff};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use gix::object::tree::diff::ChangeDetached;
use gix::{discover, ObjectId, Repository};
use similar::{ChangeTag, TextDiff};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Bytes inspected for a NUL when deciding whether a blob is binary.
const BINARY_SNIFF_LEN: usize = 8192;

pub struct GitRepo {
    repo: Repository,
    path: PathBuf,
}

impl GitRepo {
    /// Open a repository at `path`, or current dir if `None`
    pub fn open<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let repo_path = match path {
            Some(p) => p.as_ref().to_path_buf(),
            None => std::env::current_dir()?,
        };

        let repo = discover(&repo_path)?;
        let path = repo.workdir().unwrap_or_else(|| repo.path()).to_path_buf();
        debug!(path = %path.display(), "opened repository");

        Ok(Self { repo, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn resolve_range(&self, since: Option<&str>, until: Option<&str>) -> Result<DateRange> {
        let since_dt = since.map(|s| self.parse_commit_or_date(s)).transpose()?;
        let until_dt = until.map(|u| self.parse_commit_or_date(u)).transpose()?;

        if let (Some(s), Some(u)) = (since_dt, until_dt) {
            if s > u {
                return Err(LocError::InvalidDate(format!(
                    "Invalid range: since ({s}) is after until ({u})"
                )));
            }
        }

        let mut range = DateRange::new();
        if let Some(s) = since_dt {
            range = range.with_since(s);
        }
        if let Some(u) = until_dt {
            range = range.with_until(u);
        }
        Ok(range)
    }

    fn parse_commit_or_date(&self, input: &str) -> Result<DateTime<Utc>> {
        if let Some(dt) = parse_date(input)? {
            return Ok(dt);
        }

        // Fallback to Git ref
        let id = self
            .repo
            .rev_parse_single(input)
            .map_err(|e| LocError::Parse(format!("Invalid commit or date '{input}': {e}")))?;

        let commit = id
            .object()?
            .try_into_commit()
            .map_err(|_| LocError::Parse(format!("Not a commit: {input}")))?;

        let secs = commit.time()?.seconds;
        DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| LocError::InvalidDate(format!("Invalid timestamp: {secs}")))
    }

    fn handle_change(&self, change: ChangeDetached, files: &mut Vec<RawFileDiff>) -> Result<()> {
        match change {
            ChangeDetached::Addition {
                id,
                location,
                entry_mode,
                ..
            } => {
                if !is_blob(entry_mode) {
                    return Ok(());
                }
                let obj = self.repo.find_object(id)?;
                files.push(if is_binary(&obj.data) {
                    RawFileDiff::binary(location.to_string())
                } else {
                    RawFileDiff::counted(location.to_string(), count_lines(&obj.data), 0)
                });
            }
            ChangeDetached::Deletion {
                id,
                location,
                entry_mode,
                ..
            } => {
                if !is_blob(entry_mode) {
                    return Ok(());
                }
                let obj = self.repo.find_object(id)?;
                files.push(if is_binary(&obj.data) {
                    RawFileDiff::binary(location.to_string())
                } else {
                    RawFileDiff::counted(location.to_string(), 0, count_lines(&obj.data))
                });
            }
            ChangeDetached::Modification {
                previous_id,
                id,
                location,
                entry_mode,
                ..
            } => {
                if !is_blob(entry_mode) {
                    return Ok(());
                }
                let old_obj = self.repo.find_object(previous_id)?;
                let new_obj = self.repo.find_object(id)?;
                files.push(if is_binary(&old_obj.data) || is_binary(&new_obj.data) {
                    RawFileDiff::binary(location.to_string())
                } else {
                    let (added, removed) = line_diff(&old_obj.data, &new_obj.data);
                    RawFileDiff::counted(location.to_string(), added, removed)
                });
            }
            ChangeDetached::Rewrite {
                source_id,
                id,
                location,
                entry_mode,
                copy,
                ..
            } => {
                if !is_blob(entry_mode) {
                    return Ok(());
                }
                let old_obj = self.repo.find_object(source_id)?;
                let new_obj = self.repo.find_object(id)?;
                // A rename carries its content edits; a copy is a new file.
                files.push(if is_binary(&old_obj.data) || is_binary(&new_obj.data) {
                    RawFileDiff::binary(location.to_string())
                } else if copy {
                    RawFileDiff::counted(location.to_string(), count_lines(&new_obj.data), 0)
                } else {
                    let (added, removed) = line_diff(&old_obj.data, &new_obj.data);
                    RawFileDiff::counted(location.to_string(), added, removed)
                });
            }
        }
        Ok(())
    }
}

impl GitAccess for GitRepo {
    /// Every commit reachable from HEAD. Parents whose objects are absent
    /// (shallow clones) are left out of the listing.
    fn list_commits(&self) -> Result<Vec<RawCommit>> {
        let mut head = self.repo.head()?;
        let head_commit = head.peel_to_commit_in_place()?;

        let mut commits = Vec::new();
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut stack: Vec<ObjectId> = vec![head_commit.id];

        while let Some(commit_id) = stack.pop() {
            if !seen.insert(commit_id) {
                continue;
            }

            let Some(object) = self.repo.try_find_object(commit_id)? else {
                debug!(commit = %commit_id, "commit object missing, treating as history boundary");
                continue;
            };
            let commit = object
                .try_into_commit()
                .map_err(|e| LocError::GitRepo(format!("{commit_id} is not a commit: {e}")))?;

            let author = commit.author()?;
            let parents: Vec<ObjectId> = commit.parent_ids().map(|id| id.detach()).collect();
            let timestamp = commit.time().ok().map(|t| t.seconds);

            commits.push(RawCommit {
                id: commit_id.to_string(),
                author: RawAuthor::new(author.name.to_string(), author.email.to_string()),
                timestamp,
                parent_ids: parents.iter().map(|id| id.to_string()).collect(),
            });

            stack.extend(parents);
        }

        debug!(count = commits.len(), "listed commits");
        Ok(commits)
    }

    fn diff(&self, commit_id: &str, parent_id: Option<&str>) -> Result<Vec<RawFileDiff>> {
        let commit_tree = self.repo.find_commit(parse_object_id(commit_id)?)?.tree()?;
        let parent_tree = match parent_id {
            Some(parent) => Some(self.repo.find_commit(parse_object_id(parent)?)?.tree()?),
            None => None,
        };

        let changes: Vec<ChangeDetached> =
            self.repo
                .diff_tree_to_tree(parent_tree.as_ref(), Some(&commit_tree), None)?;

        let mut files = Vec::new();
        for change in changes {
            self.handle_change(change, &mut files)?;
        }
        Ok(files)
    }
}

fn parse_object_id(hex: &str) -> Result<ObjectId> {
    ObjectId::from_hex(hex.as_bytes()).map_err(|e| LocError::Parse(format!("Invalid commit ID '{hex}': {e}")))
}

fn is_binary(data: &[u8]) -> bool {
    data.iter().take(BINARY_SNIFF_LEN).any(|&b| b == 0)
}

fn count_lines(data: &[u8]) -> u64 {
    String::from_utf8_lossy(data).lines().count() as u64
}

fn line_diff(old: &[u8], new: &[u8]) -> (u64, u64) {
    let old_text = String::from_utf8_lossy(old);
    let new_text = String::from_utf8_lossy(new);
    let diff = TextDiff::from_lines(&*old_text, &*new_text);

    let mut added = 0u64;
    let mut removed = 0u64;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => added += 1,
            ChangeTag::Delete => removed += 1,
            ChangeTag::Equal => {}
        }
    }
    (added, removed)
}

/// Dates that need no repository: RFC 3339, `YYYY-MM-DD`, `N days ago`
/// style phrases and humantime durations such as `90d`. `Ok(None)` means
/// the input may still be a git revision.
/// Trees are walked into and submodule commits live in another repository.
fn is_blob(mode: gix::objs::tree::EntryMode) -> bool {
    !(mode.is_tree() || mode.is_commit())
}

pub fn parse_date(input: &str) -> Result<Option<DateTime<Utc>>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(datetime) = date.and_hms_opt(0, 0, 0) {
            return Ok(Some(Utc.from_utc_datetime(&datetime)));
        }
    }

    if let Some(duration) = parse_natural_duration(input) {
        let target = SystemTime::now()
            .checked_sub(duration)
            .ok_or_else(|| LocError::InvalidDate(format!("Duration overflow for '{input}'")))?;
        return Ok(Some(DateTime::<Utc>::from(target)));
    }

    Ok(None)
}

fn parse_natural_duration(input: &str) -> Option<Duration> {
    let input = input.trim().to_lowercase();

    for (suffix, unit_secs) in [
        (" days ago", 86400),
        (" weeks ago", 7 * 86400),
        (" months ago", 30 * 86400),
    ] {
        if let Some(n) = input.strip_suffix(suffix) {
            if let Ok(n) = n.trim().parse::<u64>() {
                return Some(Duration::from_secs(n * unit_secs));
            }
        }
    }

    // "-90d", "90d", "2weeks"
    humantime::parse_duration(input.trim_start_matches('-')).ok()
}
