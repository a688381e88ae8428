//! On-disk artifacts and the per-command audit log.
//!
//! Layout under `log_root`:
//! - `screenshots/<stamp>.<ext>` raw captures
//! - `assets/<stamp>.json` extracted account data
//! - `logs/<date>.log` one JSON line per dispatched command
//!
//! Artifacts are written to a temp file in the target directory and renamed into
//! place, so a file's mtime is its completion time and readers never see a
//! partial file.

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::CapturedImage;
use crate::constants::layout;
use crate::error::ErrorKind;
use crate::types::{CommandKind, CommandStage};

/// Collision suffixes tried before giving up on a timestamp.
const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactCategory {
    Screenshot,
    Asset,
    Log,
}

impl ArtifactCategory {
    pub const ALL: [ArtifactCategory; 3] = [ArtifactCategory::Screenshot, ArtifactCategory::Asset, ArtifactCategory::Log];

    pub fn dir_name(&self) -> &'static str {
        match self {
            ArtifactCategory::Screenshot => layout::SCREENSHOTS_DIR,
            ArtifactCategory::Asset => layout::ASSETS_DIR,
            ArtifactCategory::Log => layout::LOGS_DIR,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogArtifact {
    pub path: PathBuf,
    pub category: ArtifactCategory,
    pub created_at: DateTime<Local>,
}

pub enum ArtifactPayload<'a> {
    Image(&'a CapturedImage),
    Json(&'a Value),
}

/// One line of `logs/<date>.log`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandLogEntry {
    pub ts: String,
    pub command_id: Uuid,
    pub action: CommandKind,
    pub target: Option<String>,
    pub price: Option<String>,
    pub quantity: Option<u64>,

    /// "ok" | "degraded" | "failed"
    pub outcome: String,

    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    /// Stage that failed, for failed commands
    pub stage: Option<CommandStage>,
    pub artifact: Option<PathBuf>,
}

impl CommandLogEntry {
    pub fn new(command_id: Uuid, action: CommandKind, target: Option<String>) -> Self {
        Self {
            ts: Local::now().to_rfc3339(),
            command_id,
            action,
            target,
            price: None,
            quantity: None,
            outcome: "ok".to_string(),
            error_kind: None,
            error: None,
            stage: None,
            artifact: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub scanned: usize,
    pub removed: usize,
    pub retained: usize,
    pub failures: usize,
}

#[derive(Clone)]
pub struct PersistenceLog {
    root: PathBuf,
    /// Serializes appends to the daily log file only.
    log_lock: Arc<Mutex<()>>,
}

impl PersistenceLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            log_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn category_dir(&self, category: ArtifactCategory) -> PathBuf {
        self.root.join(category.dir_name())
    }

    pub fn log_file(&self, date: NaiveDate) -> PathBuf {
        self.category_dir(ArtifactCategory::Log)
            .join(format!("{}.log", date.format(layout::LOG_FILE_DATE)))
    }

    pub fn record(&self, category: ArtifactCategory, payload: ArtifactPayload<'_>) -> io::Result<LogArtifact> {
        match payload {
            ArtifactPayload::Image(image) => self.write_artifact(category, &image.bytes, image.format.extension()),
            ArtifactPayload::Json(value) => {
                let bytes = serde_json::to_vec_pretty(value)?;
                self.write_artifact(category, &bytes, "json")
            }
        }
    }

    fn write_artifact(&self, category: ArtifactCategory, bytes: &[u8], ext: &str) -> io::Result<LogArtifact> {
        let dir = self.category_dir(category);
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;

        let stem = Local::now().format(layout::ARTIFACT_STAMP).to_string();
        let mut attempt = 0;
        loop {
            let name = if attempt == 0 {
                format!("{}.{}", stem, ext)
            } else {
                format!("{}_{}.{}", stem, attempt, ext)
            };
            let target = dir.join(name);

            match tmp.persist_noclobber(&target) {
                Ok(_) => {
                    debug!("[PERSIST] Wrote {}", target.display());
                    return Ok(LogArtifact {
                        path: target,
                        category,
                        created_at: Local::now(),
                    });
                }
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                    tmp = e.file;
                    attempt += 1;
                }
                Err(e) => return Err(e.error),
            }
        }
    }

    /// Appends one JSON line to today's command log.
    pub fn append(&self, entry: &CommandLogEntry) -> io::Result<()> {
        let path = self.log_file(Local::now().date_naive());
        let line = serde_json::to_string(entry)?;

        let _guard = self.log_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(f, "{}", line)?;
        Ok(())
    }

    /// Removes artifacts older than `retention_days`, on the blocking pool.
    pub async fn cleanup(&self, retention_days: u32) -> io::Result<CleanupReport> {
        let log = self.clone();
        tokio::task::spawn_blocking(move || log.cleanup_at(SystemTime::now(), retention_days))
            .await
            .map_err(io::Error::other)
    }

    /// Deletes regular files whose mtime is before `now - retention_days`.
    /// Missing directories are skipped; per-file errors are counted.
    pub fn cleanup_at(&self, now: SystemTime, retention_days: u32) -> CleanupReport {
        let cutoff = now
            .checked_sub(Duration::from_secs(u64::from(retention_days) * 86_400))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut report = CleanupReport::default();

        for category in ArtifactCategory::ALL {
            let dir = self.category_dir(category);
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("⚠️ [CLEANUP] Cannot read {}: {}", dir.display(), e);
                    report.failures += 1;
                    continue;
                }
            };

            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(_) => {
                        report.failures += 1;
                        continue;
                    }
                };
                let meta = match entry.metadata() {
                    Ok(meta) => meta,
                    Err(_) => {
                        report.failures += 1;
                        continue;
                    }
                };
                if !meta.is_file() {
                    continue;
                }
                report.scanned += 1;

                let modified = match meta.modified() {
                    Ok(m) => m,
                    Err(_) => {
                        report.failures += 1;
                        continue;
                    }
                };
                if modified >= cutoff {
                    report.retained += 1;
                    continue;
                }
                match fs::remove_file(entry.path()) {
                    Ok(()) => report.removed += 1,
                    Err(e) => {
                        debug!("[CLEANUP] Could not remove {}: {}", entry.path().display(), e);
                        report.failures += 1;
                    }
                }
            }
        }

        info!(
            "🧹 [CLEANUP] scanned={} removed={} retained={} failures={}",
            report.scanned, report.removed, report.retained, report.failures
        );
        report
    }
}
