//! Process-cached catalog of platform timezone identifiers

use crate::timezone::offset::parse_label_offset;
use crate::timezone::platform::{default_platform, TimezoneError, TimezonePlatform};
use once_cell::sync::{Lazy, OnceCell};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

static GLOBAL_CATALOG: Lazy<Arc<TimezoneCatalog>> =
    Lazy::new(|| Arc::new(TimezoneCatalog::new(default_platform())));

/// One platform timezone identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimezoneCatalogEntry {
    pub display_label: String,
    pub platform_id: String,
    /// Parsed from the label; `None` entries never match an offset
    pub utc_offset_minutes: Option<i32>,
}

impl TimezoneCatalogEntry {
    pub fn new(display_label: impl Into<String>, platform_id: impl Into<String>) -> Self {
        let display_label = display_label.into();
        Self {
            utc_offset_minutes: parse_label_offset(&display_label),
            display_label,
            platform_id: platform_id.into(),
        }
    }
}

/// Platform timezone entries, enumerated on first use and then shared.
///
/// The snapshot is immutable once built: concurrent first callers block on a
/// single build, every later read clones the `Arc`. A failed build is not
/// cached.
pub struct TimezoneCatalog {
    platform: Arc<dyn TimezonePlatform>,
    entries: OnceCell<Arc<[TimezoneCatalogEntry]>>,
}

impl TimezoneCatalog {
    pub fn new(platform: Arc<dyn TimezonePlatform>) -> Self {
        Self {
            platform,
            entries: OnceCell::new(),
        }
    }

    /// Catalog over this host's facility, shared by the whole process
    pub fn global() -> Arc<TimezoneCatalog> {
        Arc::clone(&GLOBAL_CATALOG)
    }

    pub fn platform(&self) -> &dyn TimezonePlatform {
        self.platform.as_ref()
    }

    pub fn entries(&self) -> Result<Arc<[TimezoneCatalogEntry]>, TimezoneError> {
        self.entries
            .get_or_try_init(|| -> Result<_, TimezoneError> {
                let pairs = self.platform.list()?;
                let entries: Vec<TimezoneCatalogEntry> = pairs
                    .into_iter()
                    .map(|(label, id)| TimezoneCatalogEntry::new(label, id))
                    .collect();
                info!(
                    platform = self.platform.name(),
                    count = entries.len(),
                    "built timezone catalog"
                );
                Ok(Arc::from(entries))
            })
            .map(Arc::clone)
    }

    /// Entries at exactly `minutes`, in catalog order
    pub fn by_offset(&self, minutes: i32) -> Result<Vec<TimezoneCatalogEntry>, TimezoneError> {
        Ok(self
            .entries()?
            .iter()
            .filter(|entry| entry.utc_offset_minutes == Some(minutes))
            .cloned()
            .collect())
    }

    pub fn is_built(&self) -> bool {
        self.entries.get().is_some()
    }

    /// Drop the snapshot so the next read enumerates again
    #[cfg(test)]
    pub(crate) fn invalidate(&mut self) {
        self.entries.take();
    }
}

impl std::fmt::Debug for TimezoneCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimezoneCatalog")
            .field("platform", &self.platform.name())
            .field("built", &self.is_built())
            .finish()
    }
}
