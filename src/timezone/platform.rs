//! Host timezone facilities: enumeration, current zone and switching zones

use crate::timezone::offset::{format_offset, zone_offset_minutes};
use chrono::Utc;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors from the host timezone facility
#[derive(Debug, Error)]
pub enum TimezoneError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} failed: {message}")]
    Command { command: String, message: String },
    #[error("could not determine the current timezone")]
    CurrentUnknown,
    #[error("changing the system timezone is not supported by {0}")]
    Unsupported(&'static str),
}

/// A source of platform timezone identifiers
pub trait TimezonePlatform: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ordered `(display label, platform id)` pairs
    fn list(&self) -> Result<Vec<(String, String)>, TimezoneError>;

    /// Identifier of the zone the host currently uses
    fn current_id(&self) -> Result<String, TimezoneError>;

    fn set_current(&self, platform_id: &str) -> Result<(), TimezoneError>;
}

/// The facility for this host: `tzutil` on Windows, `chrono-tz` elsewhere
pub fn default_platform() -> Arc<dyn TimezonePlatform> {
    if cfg!(windows) {
        Arc::new(Tzutil)
    } else {
        Arc::new(Zoneinfo)
    }
}

/// Windows `tzutil.exe`
#[derive(Debug, Clone, Copy, Default)]
pub struct Tzutil;

impl Tzutil {
    fn run(args: &[&str]) -> Result<String, TimezoneError> {
        let command = format!("tzutil {}", args.join(" "));
        debug!(%command, "running timezone tool");

        let output = Command::new("tzutil")
            .args(args)
            .output()
            .map_err(|source| TimezoneError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr
            };
            return Err(TimezoneError::Command { command, message });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl TimezonePlatform for Tzutil {
    fn name(&self) -> &'static str {
        "tzutil"
    }

    fn list(&self) -> Result<Vec<(String, String)>, TimezoneError> {
        Ok(parse_tzutil_listing(&Self::run(&["/l"])?))
    }

    fn current_id(&self) -> Result<String, TimezoneError> {
        let current = Self::run(&["/g"])?.trim().to_string();
        if current.is_empty() {
            return Err(TimezoneError::CurrentUnknown);
        }
        Ok(current)
    }

    fn set_current(&self, platform_id: &str) -> Result<(), TimezoneError> {
        match Self::run(&["/s", platform_id]) {
            Ok(_) => Ok(()),
            Err(TimezoneError::Command { command, message }) => Err(TimezoneError::Command {
                command,
                message: format!("{} (run as Administrator to change the timezone)", message),
            }),
            Err(other) => Err(other),
        }
    }
}

/// Split `tzutil /l` output into label/id pairs.
///
/// The tool prints each zone as a display line followed by its id line,
/// with blank lines between zones. A trailing unpaired line is dropped.
pub fn parse_tzutil_listing(output: &str) -> Vec<(String, String)> {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect();

    lines
        .chunks_exact(2)
        .map(|pair| (pair[0].trim().to_string(), pair[1].trim().to_string()))
        .collect()
}

/// IANA zones compiled into `chrono-tz`, for hosts without `tzutil`
#[derive(Debug, Clone, Copy, Default)]
pub struct Zoneinfo;

impl TimezonePlatform for Zoneinfo {
    fn name(&self) -> &'static str {
        "zoneinfo"
    }

    fn list(&self) -> Result<Vec<(String, String)>, TimezoneError> {
        let now = Utc::now();
        Ok(chrono_tz::TZ_VARIANTS
            .iter()
            .map(|tz| {
                let name = tz.name();
                let label = format!(
                    "({}) {}",
                    format_offset(zone_offset_minutes(tz, now)),
                    name.replace('_', " ")
                );
                (label, name.to_string())
            })
            .collect())
    }

    fn current_id(&self) -> Result<String, TimezoneError> {
        if let Ok(tz) = std::env::var("TZ") {
            let tz = tz.trim().trim_start_matches(':');
            if !tz.is_empty() {
                return Ok(tz.to_string());
            }
        }

        if let Ok(content) = std::fs::read_to_string("/etc/timezone") {
            let content = content.trim();
            if !content.is_empty() {
                return Ok(content.to_string());
            }
        }

        std::fs::read_link("/etc/localtime")
            .ok()
            .and_then(|target| zone_from_localtime_link(&target))
            .ok_or(TimezoneError::CurrentUnknown)
    }

    fn set_current(&self, _platform_id: &str) -> Result<(), TimezoneError> {
        Err(TimezoneError::Unsupported(self.name()))
    }
}

/// `/usr/share/zoneinfo/Europe/Berlin` gives `Europe/Berlin`
fn zone_from_localtime_link(target: &Path) -> Option<String> {
    let target = target.to_string_lossy();
    let (_, zone) = target.split_once("zoneinfo/")?;
    (!zone.is_empty()).then(|| zone.to_string())
}

/// A fixed catalog, for embedding callers and tests
#[derive(Debug, Default)]
pub struct StaticPlatform {
    entries: Vec<(String, String)>,
    current: Option<String>,
    list_calls: AtomicUsize,
}

impl StaticPlatform {
    pub fn new<I, L, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (L, P)>,
        L: Into<String>,
        P: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(label, id)| (label.into(), id.into()))
                .collect(),
            current: None,
            list_calls: AtomicUsize::new(0),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_current(mut self, platform_id: impl Into<String>) -> Self {
        self.current = Some(platform_id.into());
        self
    }

    /// How many times the catalog was enumerated
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl TimezonePlatform for StaticPlatform {
    fn name(&self) -> &'static str {
        "static"
    }

    fn list(&self) -> Result<Vec<(String, String)>, TimezoneError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.clone())
    }

    fn current_id(&self) -> Result<String, TimezoneError> {
        self.current.clone().ok_or(TimezoneError::CurrentUnknown)
    }

    fn set_current(&self, _platform_id: &str) -> Result<(), TimezoneError> {
        Err(TimezoneError::Unsupported(self.name()))
    }
}
