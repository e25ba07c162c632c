use chrono::{TimeZone, Utc};
use locflow::git::MemoryRepo;
use locflow::model::{DateRange, RawAuthor, RawCommit, RawFileDiff};
use locflow::walker::topological_order;
use locflow::{CancelToken, CommitWalker, MergePolicy, TraversalOrder};
use pretty_assertions::assert_eq;

const DAY: i64 = 86_400;
const T0: i64 = 1_704_067_200; // 2024-01-01

/// c1 ── c2 ── c4 (merge)
///   └── c3 ──┘
fn branchy() -> MemoryRepo {
    MemoryRepo::new()
        .commit("c4", "A <a@x.com>", T0 + 4 * DAY, &["c2", "c3"], vec![RawFileDiff::counted("main.go", 7, 0)])
        .commit("c3", "B <b@x.com>", T0 + DAY, &["c1"], vec![RawFileDiff::counted("feat.go", 5, 0)])
        .commit("c2", "A <a@x.com>", T0 + 2 * DAY, &["c1"], vec![RawFileDiff::counted("main.go", 3, 1)])
        .commit("c1", "A <a@x.com>", T0, &[], vec![RawFileDiff::counted("main.go", 10, 0)])
}

fn ids<I: IntoIterator<Item = locflow::Result<locflow::model::CommitRecord>>>(walk: I) -> Vec<String> {
    walk.into_iter().map(|r| r.unwrap().commit_id).collect()
}

#[test]
fn parents_come_before_children() {
    let repo = branchy();
    let order = ids(CommitWalker::new(&repo));
    assert_eq!(order, vec!["c1", "c3", "c2", "c4"]);
}

#[test]
fn child_first_reverses_the_walk() {
    let repo = branchy();
    let order = ids(CommitWalker::new(&repo).order(TraversalOrder::ChildFirst));
    assert_eq!(order, vec!["c4", "c2", "c3", "c1"]);
}

#[test]
fn merge_commits_diff_against_first_parent() {
    let repo = branchy();
    let records: Vec<_> = CommitWalker::new(&repo).map(Result::unwrap).collect();
    let merge = records.iter().find(|r| r.commit_id == "c4").unwrap();

    assert!(merge.is_merge());
    assert_eq!(merge.file_deltas.len(), 1);
    assert_eq!(merge.file_deltas[0].lines_added, 7);
}

#[test]
fn ignored_merges_carry_no_changes_and_are_not_diffed() {
    let repo = branchy();
    let records: Vec<_> = CommitWalker::new(&repo)
        .merge_policy(MergePolicy::Ignore)
        .map(Result::unwrap)
        .collect();

    let merge = records.iter().find(|r| r.commit_id == "c4").unwrap();
    assert!(merge.file_deltas.is_empty());
    assert!(!repo.diff_requests().contains(&"c4".to_string()));
}

#[test]
fn duplicate_listings_are_visited_once() {
    let c = RawCommit {
        id: "dup".to_string(),
        author: RawAuthor::new("A", "a@x.com"),
        timestamp: Some(T0),
        parent_ids: vec![],
    };
    let repo = MemoryRepo::new()
        .with_commit(c.clone(), vec![RawFileDiff::counted("a.rs", 1, 0)])
        .with_commit(c, vec![RawFileDiff::counted("a.rs", 1, 0)]);

    assert_eq!(ids(CommitWalker::new(&repo)), vec!["dup"]);
}

#[test]
fn checkpointed_commits_are_neither_yielded_nor_diffed() {
    let repo = branchy();
    let order = ids(CommitWalker::new(&repo).with_checkpoint(["c1", "c3"]));

    assert_eq!(order, vec!["c2", "c4"]);
    assert_eq!(repo.diff_requests(), vec!["c2".to_string(), "c4".to_string()]);
}

#[test]
fn diffs_are_fetched_as_the_walk_is_consumed() {
    let repo = branchy();
    let mut walker = CommitWalker::new(&repo);
    walker.next().unwrap().unwrap();
    assert_eq!(repo.diff_requests(), vec!["c1".to_string()]);
}

#[test]
fn cancellation_stops_further_requests() {
    let repo = branchy();
    let cancel = CancelToken::new();
    let mut walker = CommitWalker::new(&repo).cancel_token(cancel.clone());

    assert_eq!(walker.next().unwrap().unwrap().commit_id, "c1");
    cancel.cancel();
    assert!(walker.next().is_none());
    assert_eq!(repo.diff_requests().len(), 1);
}

#[test]
fn io_error_ends_the_stream() {
    let repo = branchy().fail_diff("c3");
    let results: Vec<_> = CommitWalker::new(&repo).collect();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().commit_id, "c1");
    assert!(results[1].is_err());
}

#[test]
fn missing_parents_are_treated_as_roots() {
    // Shallow clone: c2's parent was never fetched.
    let repo = MemoryRepo::new()
        .commit("c3", "A <a@x.com>", T0 + 2 * DAY, &["c2"], vec![RawFileDiff::counted("a.rs", 1, 0)])
        .commit("c2", "A <a@x.com>", T0 + DAY, &["gone"], vec![RawFileDiff::counted("a.rs", 4, 0)]);

    assert_eq!(ids(CommitWalker::new(&repo)), vec!["c2", "c3"]);
}

#[test]
fn date_range_filters_by_commit_time() {
    let repo = branchy();
    let range = DateRange::new()
        .with_since(Utc.timestamp_opt(T0 + DAY, 0).unwrap())
        .with_until(Utc.timestamp_opt(T0 + 2 * DAY, 0).unwrap());

    assert_eq!(ids(CommitWalker::new(&repo).range(range)), vec!["c3", "c2"]);
}

#[test]
fn commits_without_time_are_yielded_undiffed() {
    let c = RawCommit {
        id: "notime".to_string(),
        author: RawAuthor::new("A", "a@x.com"),
        timestamp: None,
        parent_ids: vec![],
    };
    let repo = MemoryRepo::new().with_commit(c, vec![RawFileDiff::counted("a.rs", 1, 0)]);

    let records: Vec<_> = CommitWalker::new(&repo).map(Result::unwrap).collect();
    assert_eq!(records.len(), 1);
    assert!(records[0].timestamp.is_none());
    assert!(repo.diff_requests().is_empty());
}

#[test]
fn equal_timestamps_break_ties_by_id() {
    let commits = ["b", "a", "c"]
        .iter()
        .map(|id| RawCommit {
            id: id.to_string(),
            author: RawAuthor::new("A", "a@x.com"),
            timestamp: Some(T0),
            parent_ids: vec![],
        })
        .collect();

    let order: Vec<_> = topological_order(commits).into_iter().map(|c| c.id).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
}
