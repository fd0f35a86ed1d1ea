//! Proxy module for parsing and probing proxies
//!
//! This module provides functionality for:
//! - Parsing proxies from list text (HOST:PORT, HOST:PORT:USER:PASS)
//! - Probing a proxy against an IP-geolocation service
//! - Pulling a flat proxy list from a provider endpoint

pub mod geo;
pub mod models;
pub mod parser;
pub mod probe;
pub mod provider;

pub use geo::GeoInfo;
pub use models::{FailureKind, ProbeOutcome, ProxyAuth, ProxyCandidate};
pub use parser::{CandidateList, ProxyParser};
pub use probe::{GeoProbe, IpInfoProbe, ProbeConfig};
pub use provider::{ProviderClient, ProviderConfig, ProviderError};
