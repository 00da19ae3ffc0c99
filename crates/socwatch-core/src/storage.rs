// ── Data directory ──
//
// On-disk layout for snapshots and cycle dumps.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::CoreError;

pub const FLEET_SNAPSHOT_FILE: &str = "all_sites_data.json";
pub const RAW_TELEMETRY_FILE: &str = "fetched_inverter_data.json";
pub const ANALYSIS_FILE: &str = "analysis_results.json";

/// Data directory root with `cache/`, `raw/` and `processed/` below it.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    /// Pretty-print `value` as JSON into `dir/file`, creating `dir`.
    pub fn write_json<T: Serialize + ?Sized>(
        &self,
        dir: &Path,
        file: &str,
        value: &T,
    ) -> Result<PathBuf, CoreError> {
        fs::create_dir_all(dir).map_err(|e| CoreError::io(dir, e))?;
        let path = dir.join(file);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).map_err(|e| CoreError::io(&path, e))?;
        debug!(path = %path.display(), "wrote snapshot");
        Ok(path)
    }

    /// Same as [`write_json`](Self::write_json), but a failure only warns.
    /// Dumps are diagnostic and must not stop a cycle.
    pub fn dump<T: Serialize + ?Sized>(&self, dir: &Path, file: &str, value: &T) {
        if let Err(e) = self.write_json(dir, file, value) {
            warn!(error = %e, file, "failed to write dump");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn write_json_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let data = DataDir::new(tmp.path().join("data"));

        let path = data
            .write_json(&data.processed_dir(), ANALYSIS_FILE, &serde_json::json!({"a": 1}))
            .unwrap();

        assert!(path.ends_with("processed/analysis_results.json"));
        let back: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back["a"], 1);
    }
}
