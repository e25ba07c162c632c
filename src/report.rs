//! Read-only projections of a snapshot: the period table, the per-commit
//! event log and a summary.

use crate::model::Counter;
use crate::snapshot::Snapshot;
use crate::util::period_key;
use anyhow::Context;
use chrono::{DateTime, Utc};
use console::style;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRow {
    pub period: String,
    pub language: String,
    pub identity: String,
    pub added: u64,
    pub removed: u64,
    pub net: i64,
    /// Running net of this (language, identity) series up to and including
    /// this period.
    pub cumulative_net: i64,
    pub files: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvent {
    pub commit_id: String,
    pub timestamp: DateTime<Utc>,
    pub period: String,
    pub identity: String,
    pub language: String,
    pub added: u64,
    pub removed: u64,
    pub net: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageShare {
    pub language: String,
    pub added: u64,
    pub removed: u64,
    pub net: i64,
    pub files: u64,
    /// Percentage of the positive net lines; 0 when the total net is not
    /// positive.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub commits: usize,
    pub periods: usize,
    pub added: u64,
    pub removed: u64,
    pub net: i64,
    pub files: u64,
    pub most_productive: Option<(String, i64)>,
    pub languages: Vec<LanguageShare>,
}

pub fn period_table(snapshot: &Snapshot) -> Vec<PeriodRow> {
    let mut running: HashMap<(&str, &str), i64> = HashMap::new();
    snapshot
        .counters()
        .iter()
        .map(|(key, counter)| {
            let cumulative = running
                .entry((key.language.as_str(), key.identity.as_str()))
                .or_insert(0);
            *cumulative = cumulative.saturating_add(counter.net());
            PeriodRow {
                period: key.period.to_string(),
                language: key.language.clone(),
                identity: key.identity.to_string(),
                added: counter.added,
                removed: counter.removed,
                net: counter.net(),
                cumulative_net: *cumulative,
                files: counter.files,
            }
        })
        .collect()
}

pub fn event_log(snapshot: &Snapshot) -> Vec<CommitEvent> {
    let mut commits: Vec<_> = snapshot.attributions().iter().collect();
    commits.sort_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp).then_with(|| a.0.cmp(b.0)));

    let mut events = Vec::new();
    for (commit_id, attribution) in commits {
        let period = period_key(&attribution.timestamp, snapshot.granularity()).to_string();
        for (language, counter) in &attribution.languages {
            events.push(CommitEvent {
                commit_id: commit_id.clone(),
                timestamp: attribution.timestamp,
                period: period.clone(),
                identity: attribution.identity.to_string(),
                language: language.clone(),
                added: counter.added,
                removed: counter.removed,
                net: counter.net(),
            });
        }
    }
    events
}

pub fn summary(snapshot: &Snapshot) -> Summary {
    let total = snapshot.total();
    let by_period = snapshot.totals_by_period();

    let most_productive = by_period
        .iter()
        .filter(|(_, c)| c.net() > 0)
        .max_by(|a, b| a.1.net().cmp(&b.1.net()).then_with(|| b.0.cmp(a.0)))
        .map(|(period, c)| (period.to_string(), c.net()));

    let mut languages: Vec<LanguageShare> = snapshot
        .totals_by_language()
        .into_iter()
        .map(|(language, c)| LanguageShare {
            language: language.to_string(),
            added: c.added,
            removed: c.removed,
            net: c.net(),
            files: c.files,
            share: share_of(&c, &total),
        })
        .collect();
    languages.sort_by(|a, b| b.net.cmp(&a.net).then_with(|| a.language.cmp(&b.language)));

    Summary {
        commits: snapshot.len(),
        periods: by_period.len(),
        added: total.added,
        removed: total.removed,
        net: total.net(),
        files: total.files,
        most_productive,
        languages,
    }
}

fn share_of(part: &Counter, total: &Counter) -> f64 {
    if total.net() <= 0 {
        return 0.0;
    }
    part.net() as f64 / total.net() as f64 * 100.0
}

pub fn exec(snapshot_path: &Path, events: bool, json: bool, ndjson: bool) -> anyhow::Result<()> {
    let snapshot = Snapshot::load(snapshot_path)
        .with_context(|| format!("Failed to load snapshot {}", snapshot_path.display()))?;

    if events {
        let log = event_log(&snapshot);
        if json {
            println!("{}", serde_json::to_string_pretty(&log)?);
        } else if ndjson {
            output_ndjson(&log)?;
        } else {
            output_events(&log);
        }
    } else {
        let rows = period_table(&snapshot);
        if json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else if ndjson {
            output_ndjson(&rows)?;
        } else {
            output_table(&rows);
            println!();
            output_summary(&summary(&snapshot));
        }
    }

    Ok(())
}

pub fn output_ndjson<T: Serialize>(rows: &[T]) -> anyhow::Result<()> {
    for row in rows {
        println!("{}", serde_json::to_string(row)?);
    }
    Ok(())
}

pub fn output_table(rows: &[PeriodRow]) {
    if rows.is_empty() {
        println!("No data to display");
        return;
    }

    println!(
        "{:<9} {:<14} {:<32} {:>9} {:>9} {:>9} {:>11}",
        style("Period").bold(),
        style("Language").bold(),
        style("Identity").bold(),
        style("Added").bold(),
        style("Removed").bold(),
        style("Net").bold(),
        style("Cumulative").bold()
    );
    println!("{}", "─".repeat(99));
    for r in rows {
        let net = if r.net < 0 {
            style(r.net).red()
        } else {
            style(r.net).green()
        };
        println!(
            "{:<9} {:<14} {:<32} {:>9} {:>9} {:>9} {:>11}",
            r.period,
            truncate(&r.language, 14),
            truncate(&r.identity, 32),
            r.added,
            r.removed,
            net,
            r.cumulative_net
        );
    }
}

pub fn output_events(events: &[CommitEvent]) {
    if events.is_empty() {
        println!("No data to display");
        return;
    }

    println!(
        "{:<10} {:<20} {:<14} {:<32} {:>9} {:>9}",
        style("Commit").bold(),
        style("Timestamp").bold(),
        style("Language").bold(),
        style("Identity").bold(),
        style("Added").bold(),
        style("Removed").bold()
    );
    println!("{}", "─".repeat(99));
    for e in events {
        let short: String = e.commit_id.chars().take(8).collect();
        println!(
            "{:<10} {:<20} {:<14} {:<32} {:>9} {:>9}",
            short,
            e.timestamp.format("%Y-%m-%d %H:%M:%S"),
            truncate(&e.language, 14),
            truncate(&e.identity, 32),
            e.added,
            e.removed
        );
    }
}

pub fn output_summary(summary: &Summary) {
    println!("{}", style("Lines of Code Summary").bold());
    println!("{}", "─".repeat(50));
    println!("  Commits:        {}", summary.commits);
    println!("  Periods:        {}", summary.periods);
    println!("  Added:          {}", summary.added);
    println!("  Removed:        {}", summary.removed);
    println!("  Net:            {}", summary.net);
    println!("  File changes:   {}", summary.files);
    match &summary.most_productive {
        Some((period, net)) => println!("  Most productive: {period} ({net} net lines)"),
        None => println!("  Most productive: n/a"),
    }

    if summary.languages.is_empty() {
        return;
    }
    println!("\n{}", style("Language Breakdown").bold());
    println!("{}", "─".repeat(50));
    for l in &summary.languages {
        println!(
            "  {:<16} {:>9} net ({:>5.1}%)  +{} -{}",
            l.language, l.net, l.share, l.added, l.removed
        );
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
