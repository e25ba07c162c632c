use indicatif::ProgressBar;
use locflow::git::MemoryRepo;
use locflow::model::{Diagnostic, RawAuthor, RawCommit, RawFileDiff};
use locflow::scan::{scan_all, scan_repository, CacheOptions, ScanOptions};
use locflow::{Aggregator, Snapshot};
use pretty_assertions::assert_eq;
use std::path::PathBuf;

const DAY: i64 = 86_400;
const T0: i64 = 1_709_251_200; // 2024-03-01

fn linear(n: usize) -> MemoryRepo {
    let mut repo = MemoryRepo::new();
    for i in 0..n {
        let id = format!("c{i}");
        let parent = format!("c{}", i.wrapping_sub(1));
        let parents: Vec<&str> = if i == 0 { vec![] } else { vec![parent.as_str()] };
        repo = repo.commit(
            &id,
            "Alice <a@x.com>",
            T0 + i as i64 * DAY,
            &parents,
            vec![RawFileDiff::counted("main.go", 10, 1)],
        );
    }
    repo
}

#[test]
fn full_scan_folds_every_commit() {
    let repo = linear(5);
    let mut snapshot = Snapshot::default();
    let stats = scan_repository(
        &repo,
        &Aggregator::default(),
        &mut snapshot,
        &ScanOptions::default(),
        "mem",
        &ProgressBar::hidden(),
    )
    .unwrap();

    assert_eq!(stats.folded, 5);
    assert!(stats.diagnostics.is_empty());
    assert_eq!(snapshot.total().added, 50);
}

#[test]
fn rescan_only_diffs_new_commits() {
    let repo = linear(3);
    let mut snapshot = Snapshot::default();
    let agg = Aggregator::default();
    let options = ScanOptions::default();
    scan_repository(&repo, &agg, &mut snapshot, &options, "mem", &ProgressBar::hidden()).unwrap();

    let repo = linear(4);
    let stats = scan_repository(&repo, &agg, &mut snapshot, &options, "mem", &ProgressBar::hidden()).unwrap();

    assert_eq!(stats.folded, 1);
    assert_eq!(repo.diff_requests(), vec!["c3".to_string()]);
    assert_eq!(snapshot.len(), 4);
}

#[test]
fn limit_stops_the_walk_early() {
    let repo = linear(6);
    let mut snapshot = Snapshot::default();
    let options = ScanOptions {
        limit: Some(2),
        ..Default::default()
    };
    let stats = scan_repository(
        &repo,
        &Aggregator::default(),
        &mut snapshot,
        &options,
        "mem",
        &ProgressBar::hidden(),
    )
    .unwrap();

    assert_eq!(stats.folded, 2);
    assert_eq!(repo.diff_requests().len(), 2);
    assert!(snapshot.is_processed("c0") && snapshot.is_processed("c1"));
}

#[test]
fn malformed_commits_are_reported_and_skipped() {
    let broken = RawCommit {
        id: "broken".to_string(),
        author: RawAuthor::new("Alice", "a@x.com"),
        timestamp: None,
        parent_ids: vec!["c1".to_string()],
    };
    let repo = linear(2).with_commit(broken, vec![]);
    let mut snapshot = Snapshot::default();

    let stats = scan_repository(
        &repo,
        &Aggregator::default(),
        &mut snapshot,
        &ScanOptions::default(),
        "mem",
        &ProgressBar::hidden(),
    )
    .unwrap();

    assert_eq!(stats.folded, 2);
    assert_eq!(
        stats.diagnostics,
        vec![Diagnostic::MalformedCommit {
            repository: Some("mem".to_string()),
            commit_id: "broken".to_string(),
            reason: "missing timestamp".to_string(),
        }]
    );
}

#[test]
fn io_failure_keeps_what_was_folded() {
    let repo = linear(4).fail_diff("c2");
    let mut snapshot = Snapshot::default();

    let result = scan_repository(
        &repo,
        &Aggregator::default(),
        &mut snapshot,
        &ScanOptions::default(),
        "mem",
        &ProgressBar::hidden(),
    );

    assert!(result.is_err());
    assert_eq!(snapshot.processed_commit_ids().collect::<Vec<_>>(), vec!["c0", "c1"]);
    assert_eq!(snapshot.total().added, 20);
}

#[test]
fn unreadable_repositories_do_not_sink_the_batch() {
    let missing = std::env::temp_dir().join("locflow-no-such-repo-7f3a");
    let base = Snapshot::default();
    let report = scan_all(
        &[PathBuf::from(&missing)],
        &base,
        &Aggregator::default(),
        &ScanOptions::default(),
        &CacheOptions::default(),
        false,
    );

    assert!(report.all_failed());
    assert!(report.snapshot.is_empty());
    assert!(matches!(report.diagnostics[0], Diagnostic::RepositoryFailed { .. }));
}
