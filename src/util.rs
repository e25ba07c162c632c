use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar bucket size. Variants are declared finest first, so `Ord`
/// follows coarseness.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Week,
    #[default]
    Month,
    Quarter,
    Year,
}

impl Granularity {
    pub fn coarsest<I: IntoIterator<Item = Granularity>>(all: I) -> Option<Granularity> {
        all.into_iter().max()
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        };
        f.write_str(name)
    }
}

/// Zero-padded calendar key; lexical order is chronological within one
/// granularity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodKey(String);

impl PeriodKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn period_key(timestamp: &DateTime<Utc>, granularity: Granularity) -> PeriodKey {
    let key = match granularity {
        Granularity::Week => {
            let week = timestamp.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        Granularity::Month => format!("{}-{:02}", timestamp.year(), timestamp.month()),
        Granularity::Quarter => format!("{}-Q{}", timestamp.year(), timestamp.month0() / 3 + 1),
        Granularity::Year => format!("{}", timestamp.year()),
    };
    PeriodKey(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn keys_per_granularity() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(period_key(&ts, Granularity::Week).as_str(), "2024-W10");
        assert_eq!(period_key(&ts, Granularity::Month).as_str(), "2024-03");
        assert_eq!(period_key(&ts, Granularity::Quarter).as_str(), "2024-Q1");
        assert_eq!(period_key(&ts, Granularity::Year).as_str(), "2024");
    }

    #[test]
    fn week_uses_iso_year() {
        let ts = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(period_key(&ts, Granularity::Week).as_str(), "2020-W53");
    }

    #[test]
    fn coarsest_wins() {
        let g = Granularity::coarsest([Granularity::Week, Granularity::Quarter, Granularity::Month]);
        assert_eq!(g, Some(Granularity::Quarter));
    }
}
