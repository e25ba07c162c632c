//! Project configuration (`locflow.toml`).
//!
//! ```toml
//! granularity = "month"
//! merge_policy = "first-parent"
//! conflict_policy = "first-input"
//! only_matched = false
//! exclude = ["vendor/", "*.lock"]
//!
//! [languages]
//! vue = "vue"
//!
//! [[identity]]
//! pattern = "(?i)<a@x\\.com>"
//! canonical = "Alice"
//!
//! [[person]]
//! canonical = "Bob"
//! emails = ["bob@corp.com"]
//! logins = ["bobhub"]
//! ```

use crate::aggregate::{Aggregator, AuthorFilter};
use crate::classify::Classifier;
use crate::error::Result;
use crate::identity::{IdentityResolver, PersonConfig, RuleConfig};
use crate::merge::ConflictPolicy;
use crate::util::Granularity;
use crate::walker::MergePolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "locflow.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub granularity: Granularity,
    pub merge_policy: MergePolicy,
    pub conflict_policy: ConflictPolicy,
    pub only_matched: bool,
    pub exclude: Vec<String>,
    pub languages: BTreeMap<String, String>,
    pub identity: Vec<RuleConfig>,
    pub person: Vec<PersonConfig>,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// An explicit path must exist. Otherwise `locflow.toml` in `repo` is
    /// used when present, and defaults when not.
    pub fn discover(explicit: Option<&Path>, repo: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            debug!(path = %path.display(), "loading config");
            return Self::load(path);
        }
        if let Some(candidate) = repo.map(|r| r.join(CONFIG_FILE_NAME)).filter(|p| p.is_file()) {
            debug!(path = %candidate.display(), "loading config");
            return Self::load(candidate);
        }
        Ok(Self::default())
    }

    /// Compiles rules and patterns. Any syntax problem is a config error,
    /// raised before a single commit is folded.
    pub fn aggregator(&self) -> Result<Aggregator> {
        let classifier = Classifier::new()
            .with_languages(self.languages.iter())
            .with_excludes(&self.exclude)?;
        let resolver = IdentityResolver::from_config(&self.identity, &self.person)?;
        let filter = if self.only_matched {
            AuthorFilter::MatchedOnly
        } else {
            AuthorFilter::All
        };
        Ok(Aggregator::new(classifier, resolver).with_author_filter(filter))
    }
}
