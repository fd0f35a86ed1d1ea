//! Proxy data models

use crate::proxy::geo::GeoInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Proxy authentication credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyAuth {
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
}

impl ProxyAuth {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }
}

/// A single proxy endpoint parsed from one input line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyCandidate {
    pub host: String,
    pub port: u16,
    pub auth: Option<ProxyAuth>,
    /// Position of the originating line in the run's input lines
    pub source_line_index: usize,
    /// The trimmed line this candidate was parsed from
    #[serde(skip_serializing, default)]
    pub raw_line: String,
}

impl ProxyCandidate {
    /// Create a candidate without authentication
    pub fn new(host: String, port: u16) -> Self {
        Self {
            raw_line: format!("{}:{}", host, port),
            host,
            port,
            auth: None,
            source_line_index: 0,
        }
    }

    /// Create a candidate with authentication.
    ///
    /// An empty username means no credentials are sent, so no auth is attached.
    pub fn with_auth(host: String, port: u16, username: String, password: String) -> Self {
        let mut candidate = Self::new(host, port);
        if !username.is_empty() {
            candidate.raw_line = format!("{}:{}:{}:{}", candidate.host, port, username, password);
            candidate.auth = Some(ProxyAuth::new(username, password));
        }
        candidate
    }

    /// Tie the candidate back to its input line
    pub fn at_line(mut self, index: usize, raw_line: impl Into<String>) -> Self {
        self.source_line_index = index;
        self.raw_line = raw_line.into();
        self
    }

    pub fn username(&self) -> &str {
        self.auth.as_ref().map_or("", |auth| auth.username.as_str())
    }

    pub fn password(&self) -> &str {
        self.auth.as_ref().map_or("", |auth| auth.password.as_str())
    }

    pub fn has_auth(&self) -> bool {
        self.auth.is_some()
    }

    /// Forward-proxy URL without credentials; those travel as basic auth
    pub fn proxy_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Get the proxy string in HOST:PORT format
    pub fn to_simple_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the proxy string with auth in HOST:PORT:USER:PASS format
    pub fn to_full_string(&self) -> String {
        match &self.auth {
            Some(auth) => format!(
                "{}:{}:{}:{}",
                self.host, self.port, auth.username, auth.password
            ),
            None => self.to_simple_string(),
        }
    }

    /// Display form with the credentials redacted
    pub fn display(&self) -> String {
        if self.has_auth() {
            format!("{}:***", self.to_simple_string())
        } else {
            self.to_simple_string()
        }
    }
}

impl fmt::Display for ProxyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Why a probe did not produce geolocation data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Timeout,
    Tls,
    Proxy,
    HttpStatus(u16),
    Other(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "Timeout"),
            FailureKind::Tls => write!(f, "TLSError"),
            FailureKind::Proxy => write!(f, "ProxyError"),
            FailureKind::HttpStatus(code) => write!(f, "HTTP {}", code),
            FailureKind::Other(detail) if detail.is_empty() => write!(f, "Other"),
            FailureKind::Other(detail) => write!(f, "Other: {}", detail),
        }
    }
}

/// Result of a single probe against the geolocation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    Success { geo: GeoInfo, latency_ms: u64 },
    Failure { kind: FailureKind, latency_ms: u64 },
}

impl ProbeOutcome {
    pub fn success(geo: GeoInfo, latency_ms: u64) -> Self {
        ProbeOutcome::Success { geo, latency_ms }
    }

    pub fn failure(kind: FailureKind, latency_ms: u64) -> Self {
        ProbeOutcome::Failure { kind, latency_ms }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }

    pub fn latency_ms(&self) -> u64 {
        match self {
            ProbeOutcome::Success { latency_ms, .. } | ProbeOutcome::Failure { latency_ms, .. } => {
                *latency_ms
            }
        }
    }
}
