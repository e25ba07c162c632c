//! Accumulated LOC state: the per-commit ledger plus the counters derived
//! from it.
//!
//! A snapshot only changes through [`crate::aggregate::Aggregator::fold`].
//! Merging and reporting read it and build new values. On disk it is a JSON
//! document; loading re-checks every invariant, so a snapshot that was
//! edited by hand or truncated is rejected instead of silently skewing a
//! merge.

use crate::error::{LocError, Result};
use crate::model::{Attribution, Counter, Identity, SCHEMA_VERSION};
use crate::util::{period_key, Granularity, PeriodKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CounterKey {
    pub period: PeriodKey,
    pub language: String,
    pub identity: Identity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotFile", into = "SnapshotFile")]
pub struct Snapshot {
    version: u64,
    granularity: Granularity,
    ledger: BTreeMap<String, Attribution>,
    counters: BTreeMap<CounterKey, Counter>,
    total: Counter,
}

impl Snapshot {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            version: 0,
            granularity,
            ledger: BTreeMap::new(),
            counters: BTreeMap::new(),
            total: Counter::default(),
        }
    }

    /// Rebuilds counters and totals from a ledger. Fails with
    /// `CounterOverflow` naming the first commit that does not fit.
    pub(crate) fn from_ledger(
        granularity: Granularity,
        version: u64,
        ledger: BTreeMap<String, Attribution>,
    ) -> Result<Self> {
        let mut snapshot = Self::new(granularity);
        for (commit_id, attribution) in ledger {
            snapshot.insert(commit_id, attribution)?;
        }
        snapshot.version = version;
        Ok(snapshot)
    }

    /// Like `from_ledger`, but leaves out commits whose counts would
    /// overflow and returns their ids.
    pub(crate) fn from_ledger_skipping_overflow(
        granularity: Granularity,
        version: u64,
        ledger: BTreeMap<String, Attribution>,
    ) -> (Self, Vec<String>) {
        let mut snapshot = Self::new(granularity);
        let mut skipped = Vec::new();
        for (commit_id, attribution) in ledger {
            if let Err(LocError::CounterOverflow { commit_id }) = snapshot.insert(commit_id, attribution) {
                skipped.push(commit_id);
            }
        }
        snapshot.version = version;
        (snapshot, skipped)
    }

    /// Records one commit's contribution. Callers guarantee the id is new.
    /// On overflow nothing is recorded.
    pub(crate) fn apply(&mut self, commit_id: String, attribution: Attribution) -> Result<()> {
        debug_assert!(!self.ledger.contains_key(&commit_id));
        self.insert(commit_id, attribution)?;
        self.version += 1;
        Ok(())
    }

    fn insert(&mut self, commit_id: String, attribution: Attribution) -> Result<()> {
        let overflow = || LocError::CounterOverflow {
            commit_id: commit_id.clone(),
        };
        let period = period_key(&attribution.timestamp, self.granularity);

        // Every sum is checked before anything is written.
        let mut total = self.total;
        let mut updated = Vec::with_capacity(attribution.languages.len());
        for (language, counter) in &attribution.languages {
            let key = CounterKey {
                period: period.clone(),
                language: language.clone(),
                identity: attribution.identity.clone(),
            };
            let current = self.counters.get(&key).copied().unwrap_or_default();
            updated.push((key, current.checked_add(counter).ok_or_else(overflow)?));
            total = total.checked_add(counter).ok_or_else(overflow)?;
        }

        self.counters.extend(updated);
        self.total = total;
        self.ledger.insert(commit_id, attribution);
        Ok(())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn is_processed(&self, commit_id: &str) -> bool {
        self.ledger.contains_key(commit_id)
    }

    pub fn processed_commit_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.ledger.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }

    pub fn counters(&self) -> &BTreeMap<CounterKey, Counter> {
        &self.counters
    }

    pub fn counter(&self, period: &str, language: &str, identity: &str) -> Option<&Counter> {
        self.counters
            .iter()
            .find(|(k, _)| {
                k.period.as_str() == period
                    && k.language == language
                    && k.identity.as_str() == identity
            })
            .map(|(_, c)| c)
    }

    pub fn total(&self) -> Counter {
        self.total
    }

    pub fn attributions(&self) -> &BTreeMap<String, Attribution> {
        &self.ledger
    }

    pub fn attribution(&self, commit_id: &str) -> Option<&Attribution> {
        self.ledger.get(commit_id)
    }

    pub fn totals_by_language(&self) -> BTreeMap<&str, Counter> {
        let mut by_language: BTreeMap<&str, Counter> = BTreeMap::new();
        for (key, counter) in &self.counters {
            by_language.entry(key.language.as_str()).or_default().absorb(counter);
        }
        by_language
    }

    pub fn totals_by_period(&self) -> BTreeMap<&PeriodKey, Counter> {
        let mut by_period: BTreeMap<&PeriodKey, Counter> = BTreeMap::new();
        for (key, counter) in &self.counters {
            by_period.entry(&key.period).or_default().absorb(counter);
        }
        by_period
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new(Granularity::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotFile {
    schema_version: u32,
    version: u64,
    granularity: Granularity,
    processed_commit_ids: Vec<String>,
    counters: Vec<CounterEntry>,
    total: TotalEntry,
    commits: Vec<LedgerEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CounterEntry {
    period: PeriodKey,
    language: String,
    identity: Identity,
    added: u64,
    removed: u64,
    net: i64,
    files: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TotalEntry {
    added: u64,
    removed: u64,
    net: i64,
    files: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerEntry {
    commit_id: String,
    timestamp: DateTime<Utc>,
    identity: Identity,
    languages: BTreeMap<String, Counter>,
}

impl From<Snapshot> for SnapshotFile {
    fn from(snapshot: Snapshot) -> Self {
        let counters = snapshot
            .counters
            .iter()
            .map(|(key, c)| CounterEntry {
                period: key.period.clone(),
                language: key.language.clone(),
                identity: key.identity.clone(),
                added: c.added,
                removed: c.removed,
                net: c.net(),
                files: c.files,
            })
            .collect();

        let total = TotalEntry {
            added: snapshot.total.added,
            removed: snapshot.total.removed,
            net: snapshot.total.net(),
            files: snapshot.total.files,
        };

        let processed_commit_ids = snapshot.ledger.keys().cloned().collect();
        let commits = snapshot
            .ledger
            .into_iter()
            .map(|(commit_id, a)| LedgerEntry {
                commit_id,
                timestamp: a.timestamp,
                identity: a.identity,
                languages: a.languages,
            })
            .collect();

        SnapshotFile {
            schema_version: SCHEMA_VERSION,
            version: snapshot.version,
            granularity: snapshot.granularity,
            processed_commit_ids,
            counters,
            total,
            commits,
        }
    }
}

impl TryFrom<SnapshotFile> for Snapshot {
    type Error = LocError;

    fn try_from(file: SnapshotFile) -> Result<Self> {
        if file.schema_version != SCHEMA_VERSION {
            return Err(LocError::InvalidSnapshot(format!(
                "Schema version mismatch: expected {}, found {}",
                SCHEMA_VERSION, file.schema_version
            )));
        }

        let mut ledger = BTreeMap::new();
        for entry in file.commits {
            let attribution = Attribution {
                timestamp: entry.timestamp,
                identity: entry.identity,
                languages: entry.languages,
            };
            if ledger.insert(entry.commit_id.clone(), attribution).is_some() {
                return Err(LocError::InvalidSnapshot(format!(
                    "Commit {} appears twice in the ledger",
                    entry.commit_id
                )));
            }
        }

        let processed: BTreeSet<&str> = file.processed_commit_ids.iter().map(String::as_str).collect();
        if processed.len() != file.processed_commit_ids.len() {
            return Err(LocError::InvalidSnapshot(
                "processed_commit_ids contains duplicates".to_string(),
            ));
        }
        if !processed.iter().copied().eq(ledger.keys().map(String::as_str)) {
            return Err(LocError::InvalidSnapshot(
                "processed_commit_ids does not match the commit ledger".to_string(),
            ));
        }

        let snapshot = Snapshot::from_ledger(file.granularity, file.version, ledger).map_err(|e| match e {
            LocError::CounterOverflow { commit_id } => LocError::InvalidSnapshot(format!(
                "Counters overflow at commit {commit_id}"
            )),
            other => other,
        })?;

        let mut declared = BTreeMap::new();
        for entry in file.counters {
            let counter = Counter::new(entry.added, entry.removed, entry.files);
            if counter.net() != entry.net {
                return Err(LocError::InvalidSnapshot(format!(
                    "Counter ({}, {}, {}) has net {} but added - removed is {}",
                    entry.period,
                    entry.language,
                    entry.identity,
                    entry.net,
                    counter.net()
                )));
            }
            let key = CounterKey {
                period: entry.period,
                language: entry.language,
                identity: entry.identity,
            };
            declared.insert(key, counter);
        }
        if declared != snapshot.counters {
            return Err(LocError::InvalidSnapshot(
                "Counters do not match the commit ledger".to_string(),
            ));
        }

        let total = Counter::new(file.total.added, file.total.removed, file.total.files);
        if total != snapshot.total || total.net() != file.total.net {
            return Err(LocError::InvalidSnapshot(
                "Total does not match the commit ledger".to_string(),
            ));
        }

        Ok(snapshot)
    }
}
