// ── Discovery cache ──
//
// Persists the fleet snapshot with the time it was taken, so a restart
// on the same day skips rediscovery. A snapshot is valid only on the
// calendar day it was written; anything unreadable is a cache miss.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::FleetSnapshot;

pub const SNAPSHOT_FILE: &str = "site_validator_cache.json";
pub const MARKER_FILE: &str = "last_refresh.txt";

const MARKER_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// A snapshot restored from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedFleet {
    pub snapshot: FleetSnapshot,
    pub refreshed_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct DiscoveryCache {
    snapshot_path: PathBuf,
    marker_path: PathBuf,
}

impl DiscoveryCache {
    /// Cache files live directly under `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            snapshot_path: dir.join(SNAPSHOT_FILE),
            marker_path: dir.join(MARKER_FILE),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Restore the snapshot if it was written on `today`.
    pub fn load(&self, today: NaiveDate) -> Option<CachedFleet> {
        if !self.snapshot_path.exists() || !self.marker_path.exists() {
            debug!("no discovery cache on disk");
            return None;
        }

        let refreshed_at = match read_marker(&self.marker_path) {
            Ok(at) => at,
            Err(e) => {
                warn!(error = %e, "unreadable refresh marker, ignoring cache");
                return None;
            }
        };
        if refreshed_at.date() != today {
            info!(%refreshed_at, "discovery cache is from a previous day");
            return None;
        }

        let snapshot = match read_snapshot(&self.snapshot_path) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "unreadable discovery cache, ignoring it");
                return None;
            }
        };
        info!(sites = snapshot.len(), %refreshed_at, "restored fleet from cache");
        Some(CachedFleet {
            snapshot,
            refreshed_at,
        })
    }

    /// Write the snapshot, then the marker.
    pub fn store(
        &self,
        snapshot: &FleetSnapshot,
        refreshed_at: NaiveDateTime,
    ) -> Result<(), CoreError> {
        if let Some(dir) = self.snapshot_path.parent() {
            fs::create_dir_all(dir).map_err(|e| CoreError::io(dir, e))?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&self.snapshot_path, json).map_err(|e| CoreError::io(&self.snapshot_path, e))?;

        let marker = refreshed_at.format(MARKER_FORMAT).to_string();
        fs::write(&self.marker_path, marker).map_err(|e| CoreError::io(&self.marker_path, e))?;

        debug!(sites = snapshot.len(), "discovery cache written");
        Ok(())
    }
}

fn read_marker(path: &Path) -> Result<NaiveDateTime, CoreError> {
    let raw = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
    raw.trim()
        .parse::<NaiveDateTime>()
        .map_err(|e| CoreError::Internal(format!("bad refresh marker {raw:?}: {e}")))
}

fn read_snapshot(path: &Path) -> Result<FleetSnapshot, CoreError> {
    let raw = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;
    use socwatch_api::SiteId;

    use super::*;
    use crate::model::FleetSite;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn snapshot() -> FleetSnapshot {
        let mut snap = FleetSnapshot::default();
        snap.insert(
            "Alpha",
            FleetSite {
                id: SiteId::from(1),
                inverters: [("S1".to_owned(), Some("M1".to_owned()))].into_iter().collect(),
            },
        );
        snap
    }

    #[test]
    fn same_day_restores_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiscoveryCache::new(tmp.path().join("cache"));

        cache.store(&snapshot(), at(9, 5, 1)).unwrap();
        let restored = cache.load(at(9, 23, 0).date()).unwrap();

        assert_eq!(restored.snapshot, snapshot());
        assert_eq!(restored.refreshed_at, at(9, 5, 1));
    }

    #[test]
    fn prior_day_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiscoveryCache::new(tmp.path());

        cache.store(&snapshot(), at(8, 23, 59)).unwrap();
        assert!(cache.load(at(9, 0, 1).date()).is_none());
    }

    #[test]
    fn missing_or_corrupt_files_are_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiscoveryCache::new(tmp.path());
        assert!(cache.load(at(9, 0, 0).date()).is_none());

        cache.store(&snapshot(), at(9, 6, 0)).unwrap();
        fs::write(tmp.path().join(SNAPSHOT_FILE), "{not json").unwrap();
        assert!(cache.load(at(9, 7, 0).date()).is_none());

        cache.store(&snapshot(), at(9, 6, 0)).unwrap();
        fs::write(tmp.path().join(MARKER_FILE), "yesterday-ish").unwrap();
        assert!(cache.load(at(9, 7, 0).date()).is_none());
    }

    #[test]
    fn accepts_marker_without_fraction() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiscoveryCache::new(tmp.path());
        cache.store(&snapshot(), at(9, 5, 0)).unwrap();
        fs::write(tmp.path().join(MARKER_FILE), "2024-03-09T05:00:00\n").unwrap();

        let restored = cache.load(at(9, 12, 0).date()).unwrap();
        assert_eq!(restored.refreshed_at, at(9, 5, 0));
    }
}
