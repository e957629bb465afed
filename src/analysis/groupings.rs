//! Distinct water sources and source filtering over a subscribed collection.
//!
//! Everything here works on records already delivered by a subscription;
//! nothing re-queries the store.

use std::collections::HashSet;

use crate::model::PersistedReading;

/// The history filter: everything, or one exact source string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceFilter {
    #[default]
    All,
    Source(String),
}

impl SourceFilter {
    /// Parses a filter selection; `all` selects everything.
    pub fn from_selection(value: &str) -> Self {
        if value == "all" {
            SourceFilter::All
        } else {
            SourceFilter::Source(value.to_string())
        }
    }

    pub fn matches(&self, reading: &PersistedReading) -> bool {
        match self {
            SourceFilter::All => true,
            SourceFilter::Source(source) => reading.source.as_deref() == Some(source.as_str()),
        }
    }
}

/// Distinct non-empty sources, in order of first appearance.
pub fn distinct_sources(readings: &[PersistedReading]) -> Vec<String> {
    let mut seen = HashSet::new();
    readings
        .iter()
        .filter_map(|r| r.source.as_deref())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(*s))
        .map(String::from)
        .collect()
}

/// The readings matching `filter`, order preserved.
pub fn filter_readings(readings: &[PersistedReading], filter: &SourceFilter) -> Vec<PersistedReading> {
    readings.iter().filter(|r| filter.matches(r)).cloned().collect()
}
