use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use locflow::model::{CommitRecord, FileDelta, RawAuthor};
use locflow::util::Granularity;
use locflow::{merge, Aggregator, Snapshot};

const AUTHORS: &[&str] = &["Alice <a@x.com>", "Bob <b@x.com>", "Carol <c@x.com>", "Dan <d@x.com>"];
const PATHS: &[&str] = &["main.go", "src/lib.rs", "app.py", "web/index.ts", "README.md", "Makefile"];

fn synthetic_history(len: usize) -> Vec<CommitRecord> {
    (0..len)
        .map(|i| CommitRecord {
            commit_id: format!("{i:040x}"),
            timestamp: Utc.timestamp_opt(1_600_000_000 + i as i64 * 3_600, 0).single(),
            raw_author: RawAuthor::parse(AUTHORS[i % AUTHORS.len()]),
            parent_ids: vec![],
            file_deltas: (0..(i % 4) + 1)
                .map(|f| FileDelta {
                    path: PATHS[(i + f) % PATHS.len()].to_string(),
                    lines_added: ((i * 7 + f) % 120) as u64,
                    lines_removed: ((i * 3 + f) % 40) as u64,
                    is_binary: false,
                })
                .collect(),
        })
        .collect()
}

fn bench_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("fold");
    let agg = Aggregator::default();

    for len in [1_000usize, 10_000] {
        let history = synthetic_history(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &history, |b, history| {
            b.iter(|| {
                let mut snapshot = Snapshot::new(Granularity::Week);
                agg.fold_all(&mut snapshot, history);
                black_box(snapshot.total())
            })
        });
    }

    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    let agg = Aggregator::default();

    for len in [1_000usize, 10_000] {
        let history = synthetic_history(len);
        // Three overlapping halves, like partial scans from different machines.
        let inputs: Vec<Snapshot> = [(0, len / 2), (len / 4, 3 * len / 4), (len / 2, len)]
            .iter()
            .map(|&(from, to)| {
                let mut snapshot = Snapshot::new(Granularity::Month);
                agg.fold_all(&mut snapshot, &history[from..to]);
                snapshot
            })
            .collect();

        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &inputs, |b, inputs| {
            b.iter(|| black_box(merge(inputs).snapshot.len()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fold, bench_merge);
criterion_main!(benches);
