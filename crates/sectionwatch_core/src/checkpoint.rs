use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};

/// Earliest checkpoint a page may start from, `oldest_days` before `now`.
pub fn horizon_from(now: DateTime<Utc>, oldest_days: i64) -> DateTime<Utc> {
    now - Duration::days(oldest_days.max(0))
}

/// Persisted `title -> last fully checked` mapping.
///
/// Values only move forward. All access goes through short critical sections,
/// so scanner workers and the background flusher can share one store.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    horizon: DateTime<Utc>,
    entries: Mutex<BTreeMap<String, DateTime<Utc>>>,
    write_lock: Mutex<()>,
}

impl CheckpointStore {
    /// Load the store from `path`. A missing or unreadable file starts empty.
    pub fn load(path: &Path, horizon: DateTime<Utc>) -> Self {
        let entries = match read_entries(path) {
            Ok(Some(entries)) => {
                log::info!(
                    "loaded {} checkpoints from {}",
                    entries.len(),
                    path.display()
                );
                entries
            }
            Ok(None) => BTreeMap::new(),
            Err(error) => {
                log::warn!("checkpoint file ignored, starting cold: {error:#}");
                BTreeMap::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            horizon,
            entries: Mutex::new(entries),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn horizon(&self) -> DateTime<Utc> {
        self.horizon
    }

    pub fn get(&self, title: &str) -> Option<DateTime<Utc>> {
        self.lock_entries().get(title).copied()
    }

    /// Current checkpoint for `title`, never earlier than the horizon.
    pub fn get_or_init(&self, title: &str) -> DateTime<Utc> {
        let mut entries = self.lock_entries();
        let value = entries.entry(title.to_string()).or_insert(self.horizon);
        if *value < self.horizon {
            *value = self.horizon;
        }
        *value
    }

    /// Move the checkpoint for `title` forward to `checked_at`; older values are ignored.
    pub fn advance(&self, title: &str, checked_at: DateTime<Utc>) {
        let mut entries = self.lock_entries();
        match entries.get_mut(title) {
            Some(current) => {
                if checked_at > *current {
                    *current = checked_at;
                }
            }
            None => {
                entries.insert(title.to_string(), checked_at.max(self.horizon));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the whole mapping to a temp file and rename it over the store.
    pub fn save(&self) -> Result<()> {
        self.save_after(|| Ok(()))
    }

    /// Snapshot the mapping, run `before_write`, then write that snapshot.
    ///
    /// Whatever `before_write` persists was taken after every checkpoint in the
    /// snapshot, so it covers all of them. The snapshot is not written if it fails.
    pub fn save_after<F>(&self, before_write: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let _writer = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let snapshot = self.lock_entries().clone();
        before_write()?;
        let payload =
            serde_json::to_string_pretty(&snapshot).context("failed to serialize checkpoints")?;
        write_atomically(&self.path, &payload)?;
        log::debug!(
            "saved {} checkpoints to {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Forget every checkpoint and remove the persisted file. Returns the count dropped.
    pub fn reset(&self) -> Result<usize> {
        let _writer = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let dropped = {
            let mut entries = self.lock_entries();
            let count = entries.len();
            entries.clear();
            count
        };
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to remove {}", self.path.display()));
            }
        }
        Ok(dropped)
    }

    fn lock_entries(&self) -> MutexGuard<'_, BTreeMap<String, DateTime<Utc>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_entries(path: &Path) -> Result<Option<BTreeMap<String, DateTime<Utc>>>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(error).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let entries = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(entries))
}

pub(crate) fn write_atomically(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);
    fs::write(&temp_path, content)
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            temp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::thread;

    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use super::{CheckpointStore, horizon_from};

    fn horizon() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("valid date")
    }

    #[test]
    fn missing_file_is_a_cold_start() {
        let temp = tempdir().expect("tempdir");
        let store = CheckpointStore::load(&temp.path().join("page_status.json"), horizon());
        assert!(store.is_empty());
        assert_eq!(store.get_or_init("Firestar"), horizon());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn corrupt_file_is_a_cold_start() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("page_status.json");
        fs::write(&path, "{ not json").expect("write corrupt file");
        let store = CheckpointStore::load(&path, horizon());
        assert!(store.is_empty());
    }

    #[test]
    fn get_or_init_never_returns_before_horizon() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("page_status.json");
        fs::write(&path, r#"{"Firestar":"2020-05-01T00:00:00Z"}"#).expect("write");
        let store = CheckpointStore::load(&path, horizon());
        assert_eq!(store.get("Firestar").map(|ts| ts < horizon()), Some(true));
        assert_eq!(store.get_or_init("Firestar"), horizon());
    }

    #[test]
    fn advance_is_a_max_merge() {
        let temp = tempdir().expect("tempdir");
        let store = CheckpointStore::load(&temp.path().join("page_status.json"), horizon());
        let later = horizon() + Duration::days(3);
        let earlier = horizon() + Duration::days(1);

        store.advance("Firestar", later);
        store.advance("Firestar", earlier);
        assert_eq!(store.get("Firestar"), Some(later));

        store.advance("Sandstorm", horizon() - Duration::days(10));
        assert_eq!(store.get("Sandstorm"), Some(horizon()));
    }

    #[test]
    fn save_then_load_restores_mapping() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("state").join("page_status.json");
        let checked = horizon() + Duration::hours(5);

        let store = CheckpointStore::load(&path, horizon());
        store.advance("Firestar", checked);
        store.get_or_init("Graystripe");
        store.save().expect("save");
        assert!(!temp.path().join("state").join("page_status.json.tmp").exists());

        let reloaded = CheckpointStore::load(&path, horizon());
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("Firestar"), Some(checked));
        assert_eq!(reloaded.get("Graystripe"), Some(horizon()));
    }

    #[test]
    fn save_runs_alongside_concurrent_advances() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("page_status.json");
        let store = CheckpointStore::load(&path, horizon());

        thread::scope(|scope| {
            for worker in 0..4 {
                let store = &store;
                scope.spawn(move || {
                    for index in 0..50 {
                        store.advance(
                            &format!("Page {worker}-{index}"),
                            horizon() + Duration::minutes(index),
                        );
                    }
                });
            }
            scope.spawn(|| {
                for _ in 0..10 {
                    store.save().expect("save");
                }
            });
        });
        store.save().expect("final save");

        let reloaded = CheckpointStore::load(&path, horizon());
        assert_eq!(reloaded.len(), 200);
    }

    #[test]
    fn save_after_writes_the_snapshot_taken_before_the_hook() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("page_status.json");
        let store = CheckpointStore::load(&path, horizon());
        store.advance("Firestar", horizon() + Duration::hours(1));

        store
            .save_after(|| {
                store.advance("Sandstorm", horizon() + Duration::hours(2));
                Ok(())
            })
            .expect("save");
        let reloaded = CheckpointStore::load(&path, horizon());
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.get("Sandstorm").is_none());

        let error = store
            .save_after(|| Err(anyhow::anyhow!("dump write failed")))
            .expect_err("hook failure must abort the save");
        assert!(error.to_string().contains("dump write failed"));
        assert_eq!(CheckpointStore::load(&path, horizon()).len(), 1);
    }

    #[test]
    fn reset_clears_entries_and_file() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("page_status.json");
        let store = CheckpointStore::load(&path, horizon());
        store.get_or_init("Firestar");
        store.save().expect("save");

        assert_eq!(store.reset().expect("reset"), 1);
        assert!(store.is_empty());
        assert!(!path.exists());
        assert_eq!(store.reset().expect("reset again"), 0);
    }

    #[test]
    fn horizon_counts_back_whole_days() {
        let now = horizon() + Duration::days(30);
        assert_eq!(horizon_from(now, 30), horizon());
        assert_eq!(horizon_from(now, -4), now);
    }
}
