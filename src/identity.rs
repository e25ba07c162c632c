//! Raw author → canonical identity.
//!
//! Rules are evaluated in order and the first match wins. Authors no rule
//! matches resolve to a normalized form of themselves, so resolution never
//! fails once the rule set has been built.

use crate::error::{LocError, Result};
use crate::model::{Identity, RawAuthor};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub enum Matcher {
    /// Equal to the rendered `Name <email>`, to the email, or to the name.
    Exact(String),
    /// Searched for in the rendered `Name <email>`.
    Pattern(Regex),
}

impl Matcher {
    fn matches(&self, author: &RawAuthor, rendered: &str) -> bool {
        match self {
            Matcher::Exact(value) => {
                value == rendered
                    || (!author.email.is_empty() && value == &author.email)
                    || (!author.name.is_empty() && value == &author.name)
            }
            Matcher::Pattern(regex) => regex.is_match(rendered),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub matcher: Matcher,
    pub canonical: Identity,
}

impl Rule {
    pub fn exact(value: impl Into<String>, canonical: impl Into<String>) -> Self {
        Self {
            matcher: Matcher::Exact(value.into()),
            canonical: Identity::new(canonical),
        }
    }

    pub fn pattern(pattern: &str, canonical: impl Into<String>) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| LocError::Config(format!("Invalid identity pattern '{pattern}': {e}")))?;
        Ok(Self {
            matcher: Matcher::Pattern(regex),
            canonical: Identity::new(canonical),
        })
    }
}

/// One `[[identity]]` entry of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub exact: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    pub canonical: String,
}

impl TryFrom<&RuleConfig> for Rule {
    type Error = LocError;

    fn try_from(config: &RuleConfig) -> Result<Self> {
        if config.canonical.trim().is_empty() {
            return Err(LocError::Config("Identity rule has an empty canonical name".to_string()));
        }
        match (&config.exact, &config.pattern) {
            (Some(exact), None) => Ok(Rule::exact(exact.clone(), config.canonical.clone())),
            (None, Some(pattern)) => Rule::pattern(pattern, config.canonical.clone()),
            (Some(_), Some(_)) => Err(LocError::Config(format!(
                "Identity rule for '{}' sets both exact and pattern",
                config.canonical
            ))),
            (None, None) => Err(LocError::Config(format!(
                "Identity rule for '{}' sets neither exact nor pattern",
                config.canonical
            ))),
        }
    }
}

/// One `[[person]]` entry: a contributor described by the handles they
/// commit under, expanded into case-insensitive pattern rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonConfig {
    pub canonical: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub logins: Vec<String>,
}

impl PersonConfig {
    pub fn rules(&self) -> Result<Vec<Rule>> {
        let mut patterns = Vec::new();
        for email in &self.emails {
            patterns.push(format!("(?i)<{}>", regex::escape(email)));
            if let Some((local, _)) = email.split_once('@') {
                patterns.push(format!("(?i)<{}@[^>]*>", regex::escape(local)));
            }
        }
        for login in &self.logins {
            patterns.push(format!(
                "(?i)<(\\d+\\+)?{}@users\\.noreply\\.github\\.com>",
                regex::escape(login)
            ));
            patterns.push(format!("(?i)\\b{}\\b", regex::escape(login)));
        }
        for name in &self.names {
            patterns.push(format!("(?i)^{}\\s*<", regex::escape(name.trim())));
        }

        patterns
            .iter()
            .map(|p| Rule::pattern(p, self.canonical.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub identity: Identity,
    pub matched: bool,
}

#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    rules: Vec<Rule>,
}

impl IdentityResolver {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Explicit rules keep their order and come before person-derived ones.
    pub fn from_config(rules: &[RuleConfig], people: &[PersonConfig]) -> Result<Self> {
        let mut compiled = rules.iter().map(Rule::try_from).collect::<Result<Vec<_>>>()?;
        for person in people {
            compiled.extend(person.rules()?);
        }
        Ok(Self::new(compiled))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn resolve(&self, author: &RawAuthor) -> Identity {
        self.resolution(author).identity
    }

    pub fn resolution(&self, author: &RawAuthor) -> Resolution {
        let rendered = author.to_string();
        match self.rules.iter().find(|r| r.matcher.matches(author, &rendered)) {
            Some(rule) => Resolution {
                identity: rule.canonical.clone(),
                matched: true,
            },
            None => Resolution {
                identity: normalize(author),
                matched: false,
            },
        }
    }
}

/// Self-canonical identity: whitespace in the name collapsed, email
/// lowercased.
pub fn normalize(author: &RawAuthor) -> Identity {
    let name = author.name.split_whitespace().collect::<Vec<_>>().join(" ");
    let email = author.email.trim().to_lowercase();
    let key = match (name.is_empty(), email.is_empty()) {
        (false, false) => format!("{name} <{email}>"),
        (false, true) => name,
        (true, false) => format!("<{email}>"),
        (true, true) => "unknown".to_string(),
    };
    Identity::new(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_authors_self_canonicalize() {
        let resolver = IdentityResolver::default();
        let id = resolver.resolve(&RawAuthor::new("  Bob   Smith ", "Bob@Example.COM"));
        assert_eq!(id.as_str(), "Bob Smith <bob@example.com>");
        assert_eq!(resolver.resolve(&RawAuthor::new("", "")).as_str(), "unknown");
    }

    #[test]
    fn exact_matches_email_or_full_form() {
        let resolver = IdentityResolver::new(vec![Rule::exact("a@x.com", "Alice")]);
        assert_eq!(resolver.resolve(&RawAuthor::new("whoever", "a@x.com")).as_str(), "Alice");
        assert!(!resolver.resolution(&RawAuthor::new("whoever", "A@x.com")).matched);
    }

    #[test]
    fn person_rules_cover_noreply_and_alt_domains() {
        let person = PersonConfig {
            canonical: "Alice".to_string(),
            emails: vec!["alice@corp.com".to_string()],
            logins: vec!["alicehub".to_string()],
            ..Default::default()
        };
        let resolver = IdentityResolver::from_config(&[], &[person]).unwrap();
        for (name, email) in [
            ("A", "ALICE@corp.com"),
            ("A", "alice@home.net"),
            ("A", "123+alicehub@users.noreply.github.com"),
        ] {
            assert_eq!(resolver.resolve(&RawAuthor::new(name, email)).as_str(), "Alice");
        }
    }
}
