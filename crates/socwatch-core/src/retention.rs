// ── Retention sweep ──
//
// Deletes files older than a per-directory age limit. Dot-files are
// never touched; missing directories are skipped.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionRule {
    pub dir: PathBuf,
    pub max_age: Duration,
}

impl RetentionRule {
    pub fn days(dir: impl Into<PathBuf>, days: u32) -> Self {
        Self {
            dir: dir.into(),
            max_age: DAY * days,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RetentionSweep {
    rules: Vec<RetentionRule>,
}

impl RetentionSweep {
    pub fn new(rules: Vec<RetentionRule>) -> Self {
        Self { rules }
    }

    /// Remove every regular file whose modification time is more than the
    /// rule's age before `now`.
    pub fn sweep(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();
        for rule in &self.rules {
            sweep_dir(rule, now, &mut report);
        }
        info!(removed = report.removed, failed = report.failed, "retention sweep done");
        report
    }
}

fn sweep_dir(rule: &RetentionRule, now: SystemTime, report: &mut SweepReport) {
    let entries = match fs::read_dir(&rule.dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %rule.dir.display(), error = %e, "skipping retention dir");
            return;
        }
    };
    let Some(cutoff) = now.checked_sub(rule.max_age) else {
        return;
    };

    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        let modified = match entry.metadata() {
            Ok(meta) if meta.is_file() => meta.modified(),
            Ok(_) => continue,
            Err(e) => Err(e),
        };
        match modified {
            Ok(mtime) if mtime < cutoff => match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "removed expired file");
                    report.removed += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove expired file");
                    report.failed += 1;
                }
            },
            Ok(_) => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read file age");
                report.failed += 1;
            }
        }
    }
}
