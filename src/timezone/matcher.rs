//! Selecting a platform timezone for a detected IANA zone or a manual offset

use crate::proxy::geo::UNKNOWN_FIELD;
use crate::timezone::catalog::{TimezoneCatalog, TimezoneCatalogEntry};
use crate::timezone::offset::{iana_offset_minutes_at, keyword_from_iana};
use crate::timezone::platform::TimezoneError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

const UTC_LABEL: &str = "coordinated universal time";

/// Outcome of a catalog lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MatchResult {
    Matched(String),
    NoMatch,
}

impl MatchResult {
    pub fn platform_id(&self) -> Option<&str> {
        match self {
            MatchResult::Matched(id) => Some(id),
            MatchResult::NoMatch => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched(_))
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchResult::Matched(id) => write!(f, "{}", id),
            MatchResult::NoMatch => write!(f, "(no match)"),
        }
    }
}

fn at_offset(
    entries: &[TimezoneCatalogEntry],
    minutes: i32,
) -> impl Iterator<Item = &TimezoneCatalogEntry> {
    entries
        .iter()
        .filter(move |entry| entry.utc_offset_minutes == Some(minutes))
}

/// Pick the entry for `minutes`, breaking ties on a label keyword.
///
/// Only entries at exactly `minutes` are considered. The first one whose
/// label contains `keyword` wins, otherwise the first in catalog order.
pub fn best_match(
    entries: &[TimezoneCatalogEntry],
    minutes: i32,
    keyword: Option<&str>,
) -> MatchResult {
    let mut candidates = at_offset(entries, minutes).peekable();
    let Some(first) = candidates.peek().copied() else {
        return MatchResult::NoMatch;
    };

    let keyword = keyword.map(str::to_lowercase).filter(|k| !k.is_empty());
    let chosen = keyword
        .and_then(|keyword| {
            candidates.find(|entry| entry.display_label.to_lowercase().contains(&keyword))
        })
        .unwrap_or(first);

    MatchResult::Matched(chosen.platform_id.clone())
}

/// Pick the entry for a manually entered offset, preferring UTC ids
pub fn pick_for_offset(entries: &[TimezoneCatalogEntry], minutes: i32) -> MatchResult {
    let mut candidates = at_offset(entries, minutes).peekable();
    let Some(first) = candidates.peek().copied() else {
        return MatchResult::NoMatch;
    };

    let chosen = candidates
        .find(|entry| {
            entry.platform_id.to_uppercase().starts_with("UTC")
                || entry.display_label.to_lowercase().contains(UTC_LABEL)
        })
        .unwrap_or(first);

    MatchResult::Matched(chosen.platform_id.clone())
}

/// Matches detected zones against a timezone catalog
#[derive(Debug, Clone)]
pub struct TimezoneMatcher {
    catalog: Arc<TimezoneCatalog>,
}

impl TimezoneMatcher {
    pub fn new(catalog: Arc<TimezoneCatalog>) -> Self {
        Self { catalog }
    }

    /// Matcher over the process-wide catalog
    pub fn global() -> Self {
        Self::new(TimezoneCatalog::global())
    }

    pub fn catalog(&self) -> &TimezoneCatalog {
        &self.catalog
    }

    /// Platform timezone for an IANA name, at the current instant
    pub fn match_iana(&self, name: &str) -> MatchResult {
        self.match_iana_at(name, Utc::now())
    }

    /// Platform timezone for an IANA name, using its offset at `at`.
    ///
    /// Placeholder and unknown names return `NoMatch` before the catalog is
    /// touched. Catalog failures are logged and also yield `NoMatch`.
    pub fn match_iana_at(&self, name: &str, at: DateTime<Utc>) -> MatchResult {
        let name = name.trim();
        if name.is_empty() || name == UNKNOWN_FIELD {
            return MatchResult::NoMatch;
        }

        let Some(minutes) = iana_offset_minutes_at(name, at) else {
            debug!(zone = name, "unknown IANA zone");
            return MatchResult::NoMatch;
        };

        let entries = match self.catalog.entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(zone = name, error = %e, "timezone catalog unavailable");
                return MatchResult::NoMatch;
            }
        };

        let keyword = keyword_from_iana(name);
        best_match(&entries, minutes, keyword.as_deref())
    }

    /// Platform timezone for a manual offset in minutes
    pub fn match_offset(&self, minutes: i32) -> Result<MatchResult, TimezoneError> {
        let entries = self.catalog.entries()?;
        Ok(pick_for_offset(&entries, minutes))
    }
}

/// How the host's timezone compares with the one recommended for a proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimezoneAlignment {
    NoRecommendation,
    Aligned,
    Mismatch { current: String, recommended: String },
}

impl TimezoneAlignment {
    pub fn check(current: &str, recommended: &MatchResult) -> Self {
        match recommended {
            MatchResult::NoMatch => TimezoneAlignment::NoRecommendation,
            MatchResult::Matched(id) if id.eq_ignore_ascii_case(current.trim()) => {
                TimezoneAlignment::Aligned
            }
            MatchResult::Matched(id) => TimezoneAlignment::Mismatch {
                current: current.trim().to_string(),
                recommended: id.clone(),
            },
        }
    }
}

impl fmt::Display for TimezoneAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimezoneAlignment::NoRecommendation => write!(f, "No recommendation"),
            TimezoneAlignment::Aligned => write!(f, "OK: timezone matches"),
            TimezoneAlignment::Mismatch {
                current,
                recommended,
            } => write!(
                f,
                "Mismatch: current {} / recommended {}",
                current, recommended
            ),
        }
    }
}
