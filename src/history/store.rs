//! JSON file store for the round history.

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::{Retention, RoundRecord, TimeSeries};

/// History store error types.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history format error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Single-writer store owning the in-memory series and its file.
///
/// The in-memory series is authoritative: a failed write is logged and the
/// run carries on.
pub struct HistoryStore {
    path: PathBuf,
    retention: Retention,
    series: TimeSeries,
}

impl HistoryStore {
    /// Open the store, loading existing history.
    ///
    /// A missing file starts an empty history. A file that does not parse is
    /// moved aside to `<path>.corrupt` so the next append cannot clobber it.
    pub fn open<P: AsRef<Path>>(path: P, retention: Retention) -> Self {
        let mut store = Self {
            path: path.as_ref().to_path_buf(),
            retention,
            series: TimeSeries::new(),
        };

        match store.load() {
            Ok(series) if series.is_empty() => {
                tracing::info!("No history at {}, starting empty", store.path.display());
            }
            Ok(series) => {
                tracing::info!(
                    "Loaded {} rounds of history from {}",
                    series.len(),
                    store.path.display()
                );
                store.series = series;
            }
            Err(e @ HistoryError::Json(_)) => {
                let backup = store.corrupt_path();
                match std::fs::rename(&store.path, &backup) {
                    Ok(()) => tracing::error!(
                        "Unreadable history in {} ({}), moved to {}, starting empty",
                        store.path.display(),
                        e,
                        backup.display()
                    ),
                    Err(rename_err) => tracing::error!(
                        "Unreadable history in {} ({}) and could not move it aside: {}",
                        store.path.display(),
                        e,
                        rename_err
                    ),
                }
            }
            Err(e) => {
                tracing::error!(
                    "Failed to load history from {}, starting empty: {}",
                    store.path.display(),
                    e
                );
            }
        }

        store
    }

    /// Where an unreadable history file is kept.
    pub fn corrupt_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".corrupt");
        PathBuf::from(name)
    }

    /// Read the history file, applying the retention bound.
    pub fn load(&self) -> Result<TimeSeries, HistoryError> {
        if !self.path.exists() {
            return Ok(TimeSeries::new());
        }

        let data = std::fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(TimeSeries::new());
        }

        let mut series: TimeSeries = serde_json::from_str(&data)?;
        self.retention.apply(&mut series);
        Ok(series)
    }

    /// Rewrite the history file with the given series.
    pub fn persist(&self, series: &TimeSeries) -> Result<(), HistoryError> {
        let json = serde_json::to_string_pretty(series)?;
        replace_file(&self.path, json.as_bytes())?;
        Ok(())
    }

    /// Append a sealed round, trim to the retention bound and persist.
    ///
    /// Returns the post-append series.
    pub fn append(&mut self, record: RoundRecord) -> &TimeSeries {
        self.series.push(record);

        let evicted = self.retention.apply(&mut self.series);
        if evicted > 0 {
            tracing::debug!("History: evicted {} old rounds", evicted);
        }

        if let Err(e) = self.persist(&self.series) {
            tracing::error!("Failed to persist history to {}: {}", self.path.display(), e);
        }

        &self.series
    }

    pub fn series(&self) -> &TimeSeries {
        &self.series
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Atomically replace `path` with `contents`.
///
/// Writes to a temporary file in the same directory and renames it over the
/// target, so readers see either the old or the new file.
pub fn replace_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Latency;
    use crate::history::RoundEntry;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use tempfile::tempdir;

    fn round(second: u32, latency: Latency) -> RoundRecord {
        RoundRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, second).unwrap(),
            entries: vec![RoundEntry {
                label: "https://a.example.com".to_string(),
                latency,
            }],
        }
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("history.json"), Retention::default());
        assert!(store.series().is_empty());
    }

    #[test]
    fn test_retention_of_two_keeps_last_two_rounds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut store = HistoryStore::open(&path, Retention::rounds(2));

        for s in 1..=3 {
            let series = store.append(round(s, Latency::Measured(s as u64)));
            assert!(series.len() <= 2);
        }

        let kept: Vec<_> = store.series().iter().map(|r| r.timestamp).collect();
        assert_eq!(kept, vec![round(2, Latency::Failed).timestamp, round(3, Latency::Failed).timestamp]);

        // The file holds the same trimmed state
        let reopened = HistoryStore::open(&path, Retention::rounds(2));
        assert_eq!(reopened.series(), store.series());
    }

    #[test]
    fn test_load_applies_tightened_bound() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut store = HistoryStore::open(&path, Retention::rounds(10));
        for s in 0..5 {
            store.append(round(s, Latency::Failed));
        }

        let tightened = Retention {
            max_rounds: None,
            max_age: Some(ChronoDuration::seconds(2)),
        };
        let reopened = HistoryStore::open(&path, tightened);
        assert_eq!(reopened.series().len(), 3);
    }

    #[test]
    fn test_corrupt_file_is_kept_aside() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut store = HistoryStore::open(&path, Retention::default());
        assert!(store.series().is_empty());
        assert_eq!(store.corrupt_path(), dir.path().join("history.json.corrupt"));
        assert_eq!(std::fs::read_to_string(store.corrupt_path()).unwrap(), "{ not json");

        store.append(round(0, Latency::Measured(10)));
        let data = std::fs::read_to_string(&path).unwrap();
        let series: TimeSeries = serde_json::from_str(&data).unwrap();
        assert_eq!(series.len(), 1);
        // The unreadable history survives the first append
        assert_eq!(std::fs::read_to_string(store.corrupt_path()).unwrap(), "{ not json");
    }

    #[test]
    fn test_persist_failure_keeps_in_memory_series() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("history.json");
        let mut store = HistoryStore::open(&path, Retention::default());

        let series = store.append(round(0, Latency::Measured(10)));
        assert_eq!(series.len(), 1);
        assert!(store.persist(store.series()).is_err());
        assert!(!path.exists());
    }
}
