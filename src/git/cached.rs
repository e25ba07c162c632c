use super::GitAccess;
use crate::cache::Cache;
use crate::error::Result;
use crate::model::{RawCommit, RawFileDiff};
use std::cell::RefCell;
use tracing::debug;

/// Serves diffs from the cache and stores the ones it has to compute.
/// Listing always goes to the inner layer.
pub struct CachedAccess<A> {
    inner: A,
    cache: RefCell<Cache>,
}

impl<A: GitAccess> CachedAccess<A> {
    pub fn new(inner: A, cache: Cache) -> Self {
        Self {
            inner,
            cache: RefCell::new(cache),
        }
    }

    pub fn into_inner(self) -> (A, Cache) {
        (self.inner, self.cache.into_inner())
    }
}

impl<A: GitAccess> GitAccess for CachedAccess<A> {
    fn list_commits(&self) -> Result<Vec<RawCommit>> {
        self.inner.list_commits()
    }

    fn diff(&self, commit_id: &str, parent_id: Option<&str>) -> Result<Vec<RawFileDiff>> {
        if let Some(files) = self.cache.borrow().get_diffs(commit_id, parent_id)? {
            debug!(commit = commit_id, "diff served from cache");
            return Ok(files);
        }

        let files = self.inner.diff(commit_id, parent_id)?;
        self.cache.borrow_mut().store_diffs(commit_id, parent_id, &files)?;
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::MemoryRepo;

    #[test]
    fn second_request_skips_inner_layer() {
        let repo = MemoryRepo::new().commit("c1", "A <a@x.com>", 0, &[], vec![RawFileDiff::counted("a.rs", 3, 0)]);
        let access = CachedAccess::new(repo, Cache::in_memory().unwrap());

        let first = access.diff("c1", None).unwrap();
        let second = access.diff("c1", None).unwrap();
        assert_eq!(first, second);

        let (repo, cache) = access.into_inner();
        assert_eq!(repo.diff_requests(), vec!["c1".to_string()]);
        assert_eq!(cache.diff_count().unwrap(), 1);
    }

    #[test]
    fn failed_diff_is_not_cached() {
        let repo = MemoryRepo::new()
            .commit("c1", "A <a@x.com>", 0, &[], vec![RawFileDiff::counted("a.rs", 3, 0)])
            .fail_diff("c1");
        let access = CachedAccess::new(repo, Cache::in_memory().unwrap());

        assert!(access.diff("c1", None).is_err());
        assert!(access.diff("c1", None).is_err());

        let (repo, cache) = access.into_inner();
        assert_eq!(repo.diff_requests().len(), 2);
        assert_eq!(cache.diff_count().unwrap(), 0);
    }
}
