//! Spool and dead-letter stores.

use crate::atomic::{relocate, write_atomic};
use crate::record::{DeadLetterRecord, DeadLetterSummary, SpoolRecord};
use crate::{SpoolError, SpoolResult};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// File name prefix for spooled batches.
pub const SPOOL_PREFIX: &str = "spool_";

/// File name prefix for dead-lettered batches.
pub const FAILED_PREFIX: &str = "failed_";

/// Extension shared by spool and dead-letter files.
pub const SPOOL_EXTENSION: &str = ".json";

/// Durable storage for batches awaiting redelivery.
pub trait SpoolStore: Send + Sync {
    /// Persist a new entry, replacing any existing entry for the same batch key.
    fn save(&self, record: &SpoolRecord) -> SpoolResult<PathBuf>;

    /// All valid entries, oldest first. Invalid files are quarantined.
    fn list(&self) -> SpoolResult<Vec<SpoolRecord>>;

    /// Rewrite the entry for `record.batch_key`.
    fn update(&self, record: &SpoolRecord) -> SpoolResult<()>;

    /// Remove the entry for `batch_key`.
    fn delete(&self, batch_key: &str) -> SpoolResult<()>;

    /// Write `record` to the dead-letter area and remove its spool entry.
    fn move_to_dead_letter(&self, record: &SpoolRecord) -> SpoolResult<PathBuf>;
}

/// Operator access to dead-lettered batches.
pub trait DeadLetterStore: Send + Sync {
    fn list_failed(&self) -> SpoolResult<Vec<DeadLetterSummary>>;
    fn read_failed(&self, file_name: &str) -> SpoolResult<DeadLetterRecord>;
    fn delete_failed(&self, file_name: &str) -> SpoolResult<()>;
}

/// File-backed implementation of both stores.
#[derive(Debug, Clone)]
pub struct FileSpoolStore {
    spool_dir: PathBuf,
    failed_dir: PathBuf,
}

impl FileSpoolStore {
    pub fn new(spool_dir: impl Into<PathBuf>, failed_dir: impl Into<PathBuf>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            failed_dir: failed_dir.into(),
        }
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }

    pub fn failed_dir(&self) -> &Path {
        &self.failed_dir
    }

    fn spool_file_name(record: &SpoolRecord) -> String {
        format!(
            "{}{}_{}{}",
            SPOOL_PREFIX,
            record.file_timestamp(),
            record.batch_key,
            SPOOL_EXTENSION
        )
    }

    fn failed_file_name(record: &SpoolRecord) -> String {
        format!(
            "{}{}_{}{}",
            FAILED_PREFIX,
            record.file_timestamp(),
            record.batch_key,
            SPOOL_EXTENSION
        )
    }

    /// Spool files in the directory, sorted by name. Missing dir is empty.
    fn spool_files(&self) -> SpoolResult<Vec<PathBuf>> {
        list_matching(&self.spool_dir, SPOOL_PREFIX)
    }

    fn find_spool_file(&self, batch_key: &str) -> SpoolResult<Option<PathBuf>> {
        let suffix = format!("_{}{}", batch_key, SPOOL_EXTENSION);
        Ok(self
            .spool_files()?
            .into_iter()
            .find(|path| file_name_of(path).is_some_and(|name| name.ends_with(&suffix))))
    }

    /// Move an unreadable or invalid spool file out of the active set.
    fn quarantine(&self, path: &Path, reason: &str) {
        let Some(name) = file_name_of(path) else {
            return;
        };
        let target_name = match name.strip_prefix(SPOOL_PREFIX) {
            Some(rest) => format!("{}{}", FAILED_PREFIX, rest),
            None => format!("{}{}", FAILED_PREFIX, name),
        };

        match relocate(path, &self.failed_dir, &target_name) {
            Ok(target) => error!(
                file = %name,
                moved_to = %target.display(),
                reason = %reason,
                "Quarantined invalid spool file"
            ),
            Err(err) => error!(
                file = %name,
                reason = %reason,
                error = %err,
                "Invalid spool file could not be quarantined"
            ),
        }
    }
}

impl SpoolStore for FileSpoolStore {
    fn save(&self, record: &SpoolRecord) -> SpoolResult<PathBuf> {
        let existing = self.find_spool_file(&record.batch_key)?;

        let bytes = serde_json::to_vec_pretty(record)?;
        let path = write_atomic(&self.spool_dir, &Self::spool_file_name(record), &bytes)?;

        if let Some(old) = existing.filter(|old| *old != path) {
            warn!(
                batch_key = %record.batch_key,
                replaced = %old.display(),
                "Batch already spooled; replacing previous entry"
            );
            remove_if_present(&old)?;
        }

        info!(
            batch_key = %record.batch_key,
            records = record.records.len(),
            path = %path.display(),
            "Spooled batch"
        );
        Ok(path)
    }

    fn list(&self) -> SpoolResult<Vec<SpoolRecord>> {
        let mut records = Vec::new();

        for path in self.spool_files()? {
            let parsed = fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    serde_json::from_slice::<SpoolRecord>(&bytes).map_err(|e| e.to_string())
                })
                .and_then(|record| {
                    record.validate().map_err(|e| e.to_string())?;
                    Ok(record)
                });

            match parsed {
                Ok(record) => records.push(record),
                Err(reason) => self.quarantine(&path, &reason),
            }
        }

        records.sort_by(|a, b| {
            a.first_attempt_at
                .cmp(&b.first_attempt_at)
                .then_with(|| a.batch_key.cmp(&b.batch_key))
        });
        debug!(count = records.len(), "Listed spool entries");
        Ok(records)
    }

    fn update(&self, record: &SpoolRecord) -> SpoolResult<()> {
        let path = self
            .find_spool_file(&record.batch_key)?
            .ok_or_else(|| SpoolError::NotFound(record.batch_key.clone()))?;
        let name = file_name_of(&path)
            .ok_or_else(|| SpoolError::NotFound(record.batch_key.clone()))?
            .to_string();

        let bytes = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.spool_dir, &name, &bytes)?;
        debug!(
            batch_key = %record.batch_key,
            retry_count = record.retry_count,
            "Updated spool entry"
        );
        Ok(())
    }

    fn delete(&self, batch_key: &str) -> SpoolResult<()> {
        let path = self
            .find_spool_file(batch_key)?
            .ok_or_else(|| SpoolError::NotFound(batch_key.to_string()))?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SpoolError::NotFound(batch_key.to_string()))
            }
            Err(e) => return Err(e.into()),
        }
        debug!(batch_key = %batch_key, "Deleted spool entry");
        Ok(())
    }

    fn move_to_dead_letter(&self, record: &SpoolRecord) -> SpoolResult<PathBuf> {
        let bytes = serde_json::to_vec_pretty(record)?;
        let target = write_atomic(&self.failed_dir, &Self::failed_file_name(record), &bytes)?;

        // The dead-letter copy is durable before the spool entry goes away.
        if let Some(path) = self.find_spool_file(&record.batch_key)? {
            remove_if_present(&path)?;
        }

        warn!(
            batch_key = %record.batch_key,
            retry_count = record.retry_count,
            path = %target.display(),
            "Moved batch to dead-letter"
        );
        Ok(target)
    }
}

impl DeadLetterStore for FileSpoolStore {
    fn list_failed(&self) -> SpoolResult<Vec<DeadLetterSummary>> {
        let mut summaries = Vec::new();

        for path in list_matching(&self.failed_dir, FAILED_PREFIX)? {
            let Some(name) = file_name_of(&path).map(str::to_string) else {
                continue;
            };
            match read_record(&path) {
                Ok(record) => summaries.push(DeadLetterSummary::from_record(name, &record)),
                Err(err) => {
                    error!(file = %name, error = %err, "Skipping unreadable dead-letter file")
                }
            }
        }

        summaries.sort_by(|a, b| {
            a.first_attempt_at
                .cmp(&b.first_attempt_at)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        Ok(summaries)
    }

    fn read_failed(&self, file_name: &str) -> SpoolResult<DeadLetterRecord> {
        validate_failed_name(file_name)?;
        let path = self.failed_dir.join(file_name);
        if !path.is_file() {
            return Err(SpoolError::NotFound(file_name.to_string()));
        }
        read_record(&path)
    }

    fn delete_failed(&self, file_name: &str) -> SpoolResult<()> {
        validate_failed_name(file_name)?;
        let path = self.failed_dir.join(file_name);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(file = %file_name, "Deleted dead-letter file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(SpoolError::NotFound(file_name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn read_record(path: &Path) -> SpoolResult<SpoolRecord> {
    let bytes = fs::read(path)?;
    let record: SpoolRecord = serde_json::from_slice(&bytes)?;
    record.validate()?;
    Ok(record)
}

fn file_name_of(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Regular files in `dir` named `{prefix}*.json`, sorted by name.
fn list_matching(dir: &Path, prefix: &str) -> SpoolResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let matches = file_name_of(&path)
            .is_some_and(|name| name.starts_with(prefix) && name.ends_with(SPOOL_EXTENSION));
        if matches && entry.file_type()?.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn remove_if_present(path: &Path) -> SpoolResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Dead-letter operations accept bare file names only.
fn validate_failed_name(file_name: &str) -> SpoolResult<()> {
    let valid = !file_name.is_empty()
        && !file_name.contains('/')
        && !file_name.contains('\\')
        && !file_name.contains("..")
        && file_name.starts_with(FAILED_PREFIX)
        && file_name.ends_with(SPOOL_EXTENSION);
    if valid {
        Ok(())
    } else {
        Err(SpoolError::InvalidFileName(file_name.to_string()))
    }
}
