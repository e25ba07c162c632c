//! Git access layer: commit metadata listing and per-commit diffs.

pub mod cached;
pub mod memory;
pub mod repo;

pub use cached::CachedAccess;
pub use memory::MemoryRepo;
pub use repo::GitRepo;

use crate::error::Result;
use crate::model::{RawCommit, RawFileDiff};

pub trait GitAccess {
    /// Metadata for every commit reachable from the starting point, in no
    /// particular order. Listing must be cheap next to diffing.
    fn list_commits(&self) -> Result<Vec<RawCommit>>;

    /// File diffs of `commit_id` against `parent_id`, or against the empty
    /// tree when `parent_id` is `None`.
    fn diff(&self, commit_id: &str, parent_id: Option<&str>) -> Result<Vec<RawFileDiff>>;
}

impl<T: GitAccess + ?Sized> GitAccess for &T {
    fn list_commits(&self) -> Result<Vec<RawCommit>> {
        (**self).list_commits()
    }

    fn diff(&self, commit_id: &str, parent_id: Option<&str>) -> Result<Vec<RawFileDiff>> {
        (**self).diff(commit_id, parent_id)
    }
}
