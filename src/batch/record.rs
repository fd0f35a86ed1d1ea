//! Per-candidate results of a batch run

use crate::proxy::geo::GeoInfo;
use crate::proxy::models::{FailureKind, ProxyCandidate};
use crate::timezone::MatchResult;
use serde::Serialize;
use std::fmt;

/// What a probe found for one candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status")]
pub enum RecordStatus {
    #[serde(rename = "OK")]
    Ok { geo: GeoInfo, matched: MatchResult },
    #[serde(rename = "FAIL")]
    Fail { kind: FailureKind },
}

/// One tested candidate. Created right after its probe and never changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    /// `host:port`, with `:***` appended when the candidate has credentials
    pub proxy_display: String,
    pub candidate: ProxyCandidate,
    pub latency_ms: u64,
    #[serde(flatten)]
    pub status: RecordStatus,
}

impl ResultRecord {
    pub fn ok(candidate: ProxyCandidate, geo: GeoInfo, matched: MatchResult, latency_ms: u64) -> Self {
        Self {
            proxy_display: candidate.display(),
            candidate,
            latency_ms,
            status: RecordStatus::Ok { geo, matched },
        }
    }

    pub fn fail(candidate: ProxyCandidate, kind: FailureKind, latency_ms: u64) -> Self {
        Self {
            proxy_display: candidate.display(),
            candidate,
            latency_ms,
            status: RecordStatus::Fail { kind },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, RecordStatus::Ok { .. })
    }

    pub fn status_label(&self) -> &'static str {
        match self.status {
            RecordStatus::Ok { .. } => "OK",
            RecordStatus::Fail { .. } => "FAIL",
        }
    }

    pub fn geo(&self) -> Option<&GeoInfo> {
        match &self.status {
            RecordStatus::Ok { geo, .. } => Some(geo),
            RecordStatus::Fail { .. } => None,
        }
    }

    pub fn matched(&self) -> Option<&MatchResult> {
        match &self.status {
            RecordStatus::Ok { matched, .. } => Some(matched),
            RecordStatus::Fail { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureKind> {
        match &self.status {
            RecordStatus::Fail { kind } => Some(kind),
            RecordStatus::Ok { .. } => None,
        }
    }
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            RecordStatus::Ok { geo, matched } => write!(
                f,
                "{} - OK - {} - {} - {} -> {} - {}ms",
                self.proxy_display, geo.ip, geo.country, geo.timezone, matched, self.latency_ms
            ),
            RecordStatus::Fail { kind } => write!(
                f,
                "{} - FAIL({}) - {}ms",
                self.proxy_display, kind, self.latency_ms
            ),
        }
    }
}
