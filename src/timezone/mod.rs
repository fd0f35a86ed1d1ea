//! Timezone module for mapping a proxy's location onto a platform timezone
//!
//! This module provides functionality for:
//! - Enumerating the host's timezone identifiers once per process
//! - Parsing and formatting `UTC±HH:MM` offsets
//! - Choosing a catalog entry for a detected IANA zone or a manual offset

pub mod catalog;
pub mod matcher;
pub mod offset;
pub mod platform;

pub use catalog::{TimezoneCatalog, TimezoneCatalogEntry};
pub use matcher::{MatchResult, TimezoneAlignment, TimezoneMatcher};
pub use offset::{format_offset, parse_offset};
pub use platform::{default_platform, StaticPlatform, TimezoneError, TimezonePlatform};
