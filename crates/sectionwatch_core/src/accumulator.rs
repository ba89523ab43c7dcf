use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoint::write_atomically;

/// One detected change for one page, produced once per page per scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub title: String,
    pub narrative: String,
    pub priority: i64,
    pub revision_id1: i64,
    pub revision_time1: DateTime<Utc>,
    pub revision_id2: i64,
    pub revision_time2: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
}

impl ChangeRecord {
    fn key(&self) -> RecordKey {
        (self.title.clone(), self.revision_id1, self.revision_id2)
    }
}

type RecordKey = (String, i64, i64);

#[derive(Debug, Default)]
struct Inner {
    records: Vec<ChangeRecord>,
    keys: HashSet<RecordKey>,
    persisted: usize,
}

/// Append-only, thread-safe record collection with a crash-recovery dump on disk.
#[derive(Debug)]
pub struct ChangeAccumulator {
    dump_path: PathBuf,
    inner: Mutex<Inner>,
    write_lock: Mutex<()>,
}

impl ChangeAccumulator {
    pub fn new(dump_path: &Path) -> Self {
        Self {
            dump_path: dump_path.to_path_buf(),
            inner: Mutex::new(Inner::default()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dump_path(&self) -> &Path {
        &self.dump_path
    }

    /// Append a record. Returns false if an identical revision range for the title is present.
    pub fn add(&self, record: ChangeRecord) -> bool {
        let mut inner = self.lock_inner();
        if !inner.keys.insert(record.key()) {
            return false;
        }
        inner.records.push(record);
        true
    }

    pub fn count(&self) -> usize {
        self.lock_inner().records.len()
    }

    /// Records added since the last successful `persist`.
    pub fn pending_since_flush(&self) -> usize {
        let inner = self.lock_inner();
        inner.records.len().saturating_sub(inner.persisted)
    }

    pub fn snapshot(&self) -> Vec<ChangeRecord> {
        self.lock_inner().records.clone()
    }

    pub fn drain_all(&self) -> Vec<ChangeRecord> {
        let mut inner = self.lock_inner();
        inner.keys.clear();
        inner.persisted = 0;
        std::mem::take(&mut inner.records)
    }

    /// Write every record held so far to the dump file.
    pub fn persist(&self) -> Result<usize> {
        let _writer = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let snapshot = self.snapshot();
        let payload =
            serde_json::to_string_pretty(&snapshot).context("failed to serialize change records")?;
        write_atomically(&self.dump_path, &payload)?;

        let mut inner = self.lock_inner();
        inner.persisted = inner.persisted.max(snapshot.len());
        Ok(snapshot.len())
    }

    /// Merge records from a previous dump. Returns how many were new.
    ///
    /// A missing dump restores nothing; an unreadable one is logged and ignored.
    pub fn restore(&self) -> usize {
        let restored = match read_dump(&self.dump_path) {
            Ok(Some(records)) => records,
            Ok(None) => return 0,
            Err(error) => {
                log::warn!("change dump ignored: {error:#}");
                return 0;
            }
        };

        let mut inner = self.lock_inner();
        let mut added = 0usize;
        for record in restored {
            if inner.keys.insert(record.key()) {
                inner.records.push(record);
                added += 1;
            }
        }
        inner.persisted = inner.persisted.max(added);
        if added > 0 {
            log::info!(
                "restored {added} change records from {}",
                self.dump_path.display()
            );
        }
        added
    }

    /// Remove the dump file after its records have been delivered.
    pub fn clear_dump(&self) -> Result<()> {
        let _writer = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match fs::remove_file(&self.dump_path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => {
                Err(error).with_context(|| format!("failed to remove {}", self.dump_path.display()))
            }
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_dump(path: &Path) -> Result<Option<Vec<ChangeRecord>>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(error).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let records = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(records))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::thread;

    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use super::{ChangeAccumulator, ChangeRecord};

    fn record(title: &str, id1: i64, id2: i64, priority: i64) -> ChangeRecord {
        let base = Utc
            .with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
            .single()
            .expect("valid date");
        ChangeRecord {
            title: title.to_string(),
            narrative: format!(";[Leading]\n:Modified (+{priority})\n"),
            priority,
            revision_id1: id1,
            revision_time1: base,
            revision_id2: id2,
            revision_time2: base + Duration::hours(2),
            detected_at: base + Duration::days(1),
        }
    }

    #[test]
    fn add_counts_and_rejects_duplicate_ranges() {
        let temp = tempdir().expect("tempdir");
        let accumulator = ChangeAccumulator::new(&temp.path().join("modified_pages.json"));
        assert!(accumulator.add(record("Firestar", 1, 2, 10)));
        assert!(accumulator.add(record("Firestar", 2, 3, 10)));
        assert!(!accumulator.add(record("Firestar", 1, 2, 99)));
        assert_eq!(accumulator.count(), 2);
        assert_eq!(accumulator.pending_since_flush(), 2);
    }

    #[test]
    fn concurrent_adds_are_all_kept() {
        let temp = tempdir().expect("tempdir");
        let accumulator = ChangeAccumulator::new(&temp.path().join("modified_pages.json"));
        thread::scope(|scope| {
            for worker in 0..4 {
                let accumulator = &accumulator;
                scope.spawn(move || {
                    for index in 0..25 {
                        accumulator.add(record(&format!("Page {worker}"), index, index + 1, 1));
                    }
                });
            }
        });
        assert_eq!(accumulator.count(), 100);
    }

    #[test]
    fn restore_reconstructs_exactly_the_persisted_records() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("modified_pages.json");

        let first = ChangeAccumulator::new(&path);
        first.add(record("Firestar", 1, 2, 200));
        first.add(record("Sandstorm", 5, 9, 40));
        assert_eq!(first.persist().expect("persist"), 2);
        assert_eq!(first.pending_since_flush(), 0);

        let second = ChangeAccumulator::new(&path);
        assert_eq!(second.restore(), 2);
        assert_eq!(second.snapshot(), first.snapshot());
        assert_eq!(second.pending_since_flush(), 0);
    }

    #[test]
    fn restore_merges_without_duplicates() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("modified_pages.json");

        let previous = ChangeAccumulator::new(&path);
        previous.add(record("Firestar", 1, 2, 200));
        previous.add(record("Sandstorm", 5, 9, 40));
        previous.persist().expect("persist");

        let current = ChangeAccumulator::new(&path);
        current.add(record("Firestar", 1, 2, 200));
        current.add(record("Graystripe", 3, 4, 12));
        assert_eq!(current.restore(), 1);
        assert_eq!(current.count(), 3);
        assert_eq!(current.restore(), 0);
    }

    #[test]
    fn corrupt_dump_restores_nothing() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("modified_pages.json");
        fs::write(&path, "[{\"title\": 3}]").expect("write");
        let accumulator = ChangeAccumulator::new(&path);
        assert_eq!(accumulator.restore(), 0);
        assert_eq!(accumulator.count(), 0);
    }

    #[test]
    fn drain_and_clear_dump_leave_nothing_behind() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("modified_pages.json");
        let accumulator = ChangeAccumulator::new(&path);
        accumulator.add(record("Firestar", 1, 2, 200));
        accumulator.persist().expect("persist");

        let drained = accumulator.drain_all();
        assert_eq!(drained.len(), 1);
        assert_eq!(accumulator.count(), 0);
        assert!(accumulator.add(record("Firestar", 1, 2, 200)));

        accumulator.clear_dump().expect("clear");
        assert!(!path.exists());
        accumulator.clear_dump().expect("clear twice");
    }
}
