use locflow::classify::Classifier;
use locflow::identity::{IdentityResolver, Rule};
use locflow::model::Diagnostic;
use locflow::util::Granularity;
use locflow::{merge, merge_with, Aggregator, ConflictPolicy, Snapshot};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use generators::commit_at;

fn build(agg: &Aggregator, granularity: Granularity, ids: &[&str]) -> Snapshot {
    let mut snapshot = Snapshot::new(granularity);
    for id in ids {
        let commit = match *id {
            "A" => commit_at("A", "Alice <a@x.com>", (2024, 1, 10), &[("main.go", 10, 0)]),
            "B" => commit_at("B", "alice <a@x.com>", (2024, 2, 3), &[("main.go", 2, 4)]),
            "C" => commit_at("C", "Bob <b@x.com>", (2024, 5, 30), &[("lib.rs", 30, 1)]),
            other => panic!("unknown commit {other}"),
        };
        agg.fold(&mut snapshot, &commit).unwrap();
    }
    snapshot
}

fn alice() -> Aggregator {
    let resolver = IdentityResolver::new(vec![Rule::pattern("(?i)<a@x\\.com>", "Alice").unwrap()]);
    Aggregator::new(Classifier::new(), resolver)
}

#[test]
fn shared_commit_is_counted_once() {
    let agg = alice();
    let s1 = build(&agg, Granularity::Month, &["A", "B"]);
    let s2 = build(&agg, Granularity::Month, &["B", "C"]);

    let result = merge(&[s1, s2]);

    assert!(result.conflicts.is_empty());
    assert_eq!(
        result.snapshot.processed_commit_ids().collect::<Vec<_>>(),
        vec!["A", "B", "C"]
    );
    let b = result.snapshot.counter("2024-02", "go", "Alice").unwrap();
    assert_eq!((b.added, b.removed, b.net()), (2, 4, -2));
    assert_eq!(result.snapshot.total().added, 42);
}

#[test]
fn differing_attribution_keeps_first_input() {
    let s1 = build(&alice(), Granularity::Month, &["A", "B"]);
    // No rules: B resolves to its own normalized author.
    let s2 = build(&Aggregator::default(), Granularity::Month, &["B", "C"]);

    let result = merge(&[s1, s2]);

    assert_eq!(result.conflicts.len(), 1);
    let conflict = &result.conflicts[0];
    assert_eq!(conflict.commit_id, "B");
    assert_eq!(conflict.kept.input, 0);
    assert_eq!(conflict.kept.attribution.identity.as_str(), "Alice");
    assert_eq!(conflict.rejected.len(), 1);
    assert_eq!(conflict.rejected[0].input, 1);

    assert!(result.snapshot.counter("2024-02", "go", "Alice").is_some());
    assert!(result.snapshot.counter("2024-02", "go", "alice <a@x.com>").is_none());
    assert_eq!(
        result.diagnostics(),
        vec![Diagnostic::MergeConflict {
            commit_id: "B".to_string(),
            inputs: vec![0, 1],
        }]
    );
}

#[test]
fn last_input_policy_flips_precedence() {
    let s1 = build(&alice(), Granularity::Month, &["A", "B"]);
    let s2 = build(&Aggregator::default(), Granularity::Month, &["B", "C"]);

    let result = merge_with(&[s1, s2], ConflictPolicy::LastInput);

    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].kept.input, 1);
    assert!(result.snapshot.counter("2024-02", "go", "alice <a@x.com>").is_some());
    assert!(result.snapshot.counter("2024-02", "go", "Alice").is_none());
}

#[test]
fn mixed_granularity_merges_at_the_coarsest() {
    let agg = alice();
    let weekly = build(&agg, Granularity::Week, &["A"]);
    let quarterly = build(&agg, Granularity::Quarter, &["C"]);

    let result = merge(&[weekly, quarterly]);

    assert_eq!(result.snapshot.granularity(), Granularity::Quarter);
    assert!(result.snapshot.counter("2024-Q1", "go", "Alice").is_some());
    assert!(result.snapshot.counter("2024-Q2", "rust", "Bob <b@x.com>").is_some());
    assert!(result.snapshot.counters().keys().all(|k| k.period.as_str().contains("-Q")));
}

#[test]
fn merge_of_nothing_is_empty() {
    let result = merge(&[]);
    assert!(result.snapshot.is_empty());
    assert!(result.conflicts.is_empty());
}

#[test]
fn version_moves_past_every_input() {
    let agg = alice();
    let s1 = build(&agg, Granularity::Month, &["A", "B", "C"]);
    let s2 = build(&agg, Granularity::Month, &["C"]);
    let result = merge(&[s1.clone(), s2]);
    assert!(result.snapshot.version() > s1.version());
}

#[test]
fn saved_snapshot_round_trips_and_merges() {
    let dir = tempdir().unwrap();
    let agg = alice();
    let s1 = build(&agg, Granularity::Month, &["A", "B"]);
    let path = dir.path().join("nested/s1.json");
    s1.save(&path).unwrap();

    let loaded = Snapshot::load(&path).unwrap();
    assert_eq!(loaded, s1);
    assert_eq!(merge(&[loaded, s1.clone()]).snapshot.counters(), s1.counters());
}

#[test]
fn tampered_snapshot_is_rejected() {
    let dir = tempdir().unwrap();
    let s1 = build(&alice(), Granularity::Month, &["A", "B"]);
    let path = dir.path().join("s1.json");
    s1.save(&path).unwrap();

    let mut doc: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    doc["counters"][0]["added"] = serde_json::json!(1_000_000);
    std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();
    assert!(Snapshot::load(&path).is_err());

    doc = serde_json::from_slice(&serde_json::to_vec(&s1).unwrap()).unwrap();
    doc["schema_version"] = serde_json::json!(99);
    std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();
    assert!(Snapshot::load(&path).is_err());
}

#[test]
fn commits_that_overflow_the_union_are_left_out_and_reported() {
    let agg = alice();
    let half = u64::MAX / 2 + 1;
    let fold_one = |id: &str, day: u32| {
        let mut snapshot = Snapshot::new(Granularity::Month);
        let commit = commit_at(id, "Alice <a@x.com>", (2024, 3, day), &[("main.go", half, 0)]);
        agg.fold(&mut snapshot, &commit).unwrap();
        snapshot
    };

    let result = merge(&[fold_one("X", 1), fold_one("Y", 2)]);

    assert_eq!(result.snapshot.processed_commit_ids().collect::<Vec<_>>(), vec!["X"]);
    assert_eq!(result.snapshot.total().added, half);
    assert_eq!(result.overflowed, vec!["Y".to_string()]);
    assert!(matches!(
        &result.diagnostics()[..],
        [Diagnostic::MalformedCommit { commit_id, repository: None, .. }] if commit_id == "Y"
    ));
}
