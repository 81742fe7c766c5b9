// Copyright 2025 N. Dornseif
//
// Dual-licensed under Apache 2.0 and MIT terms.

//! Bounded history of [`MetricRecord`]s, bit-snapshot persistence on EVENT,
//! the CSV test log, and USB export.

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{ExportError, PersistError};
use crate::model::{AnalysisSnapshot, DetectorState, MetricRecord};

pub struct MetricsStore {
    history: VecDeque<MetricRecord>,
    history_cap: usize,
    events: Vec<MetricRecord>,
    snapshot_dir: PathBuf,
    snapshot_bits: usize,
    log_csv: Option<PathBuf>,
}

impl MetricsStore {
    pub fn new(history_cap: usize, snapshot_dir: PathBuf, snapshot_bits: usize, log_csv: Option<PathBuf>) -> Self {
        MetricsStore {
            history: VecDeque::with_capacity(history_cap.max(1)),
            history_cap: history_cap.max(1),
            events: Vec::new(),
            snapshot_dir,
            snapshot_bits,
            log_csv,
        }
    }

    pub fn history(&self) -> &VecDeque<MetricRecord> {
        &self.history
    }

    pub fn events(&self) -> &[MetricRecord] {
        &self.events
    }

    /// Appends a record for this tick; on EVENT, also records it in the
    /// event log and persists the trailing bit sample. Logs (but does not
    /// propagate) persistence failures — the next snapshot is still
    /// attempted.
    pub fn add(&mut self, snapshot: &AnalysisSnapshot, bits: &[u8]) {
        let record = MetricRecord::from(snapshot);
        if self.history.len() == self.history_cap {
            self.history.pop_front();
        }
        self.history.push_back(record.clone());

        if let Err(err) = self.write_csv_rows(snapshot) {
            tracing::warn!(error = %err, "failed to append CSV row");
        }

        if snapshot.detector_state == DetectorState::Event {
            self.events.push(record);
            if self.snapshot_bits > 0 {
                if let Err(err) = self.persist_bits(snapshot.timestamp_ms, bits) {
                    tracing::warn!(error = %err, "failed to persist event snapshot");
                }
            }
        }
    }

    fn persist_bits(&self, timestamp_ms: i64, bits: &[u8]) -> Result<(), PersistError> {
        fs::create_dir_all(&self.snapshot_dir).map_err(|source| PersistError::Snapshot {
            path: self.snapshot_dir.clone(),
            source,
        })?;
        let tail_start = bits.len().saturating_sub(self.snapshot_bits);
        let tail = &bits[tail_start..];
        let path = self.snapshot_dir.join(format!("snapshot_{timestamp_ms}.bin"));
        fs::write(&path, tail).map_err(|source| PersistError::Snapshot { path, source })
    }

    fn write_csv_rows(&self, snapshot: &AnalysisSnapshot) -> Result<(), PersistError> {
        let Some(path) = &self.log_csv else {
            return Ok(());
        };
        let write_header = !path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| PersistError::Csv { path: path.clone(), source })?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if write_header {
            writer
                .write_record([
                    "timestamp_ms",
                    "timestamp_iso",
                    "window",
                    "test",
                    "z_score",
                    "p_value",
                    "q_value",
                    "gdi",
                    "state",
                    "reason",
                ])
                .map_err(|source| csv_persist_err(path, source))?;
        }

        let timestamp_iso = iso_timestamp(snapshot.timestamp_ms);
        let gdi = snapshot.combined.gdi.to_string();
        let state = snapshot.detector_state.as_str();
        let reason = snapshot.detector_reason;

        let mut wrote_any = false;
        for summary in &snapshot.combined.window_summaries {
            for result in &summary.tests {
                wrote_any = true;
                let q = summary.q_values.get(&result.key()).copied().unwrap_or(1.0);
                writer
                    .write_record([
                        snapshot.timestamp_ms.to_string(),
                        timestamp_iso.clone(),
                        summary.window.to_string(),
                        result.name.to_string(),
                        result.z_score.to_string(),
                        result.p_value.to_string(),
                        q.to_string(),
                        gdi.clone(),
                        state.to_string(),
                        reason.to_string(),
                    ])
                    .map_err(|source| csv_persist_err(path, source))?;
            }
        }
        if !wrote_any {
            writer
                .write_record([
                    snapshot.timestamp_ms.to_string(),
                    timestamp_iso,
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    gdi,
                    state.to_string(),
                    reason.to_string(),
                ])
                .map_err(|source| csv_persist_err(path, source))?;
        }
        writer.flush().map_err(|source| PersistError::Csv { path: path.clone(), source })
    }

    /// Copies the CSV log (if present) and the `count` most recently
    /// modified snapshot files into
    /// `mount/pi_rng_export_<YYYYMMDD_HHMMSSZ>/`.
    pub fn export_to_usb(&self, mount: &Path, count: usize) -> Result<PathBuf, ExportError> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%SZ");
        let export_dir = mount.join(format!("pi_rng_export_{stamp}"));
        fs::create_dir_all(&export_dir).map_err(|source| ExportError::CreateDir {
            path: export_dir.clone(),
            source,
        })?;

        if let Some(csv_path) = &self.log_csv {
            if csv_path.exists() {
                let dest = export_dir.join(csv_path.file_name().unwrap_or_default());
                fs::copy(csv_path, &dest).map_err(|source| ExportError::Copy {
                    from: csv_path.clone(),
                    to: dest,
                    source,
                })?;
            }
        }

        let snapshots_dir = export_dir.join("snapshots");
        fs::create_dir_all(&snapshots_dir).map_err(|source| ExportError::CreateDir {
            path: snapshots_dir.clone(),
            source,
        })?;
        for file in self.most_recent_snapshots(count) {
            let dest = snapshots_dir.join(file.file_name().unwrap_or_default());
            fs::copy(&file, &dest).map_err(|source| ExportError::Copy {
                from: file.clone(),
                to: dest,
                source,
            })?;
        }
        Ok(export_dir)
    }

    fn most_recent_snapshots(&self, count: usize) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.snapshot_dir) else {
            return Vec::new();
        };
        let mut files: Vec<(std::time::SystemTime, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let metadata = entry.metadata().ok()?;
                let modified = metadata.modified().ok()?;
                Some((modified, entry.path()))
            })
            .collect();
        files.sort_by(|a, b| b.0.cmp(&a.0));
        files.into_iter().take(count).map(|(_, path)| path).collect()
    }
}

fn iso_timestamp(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

fn csv_persist_err(path: &Path, source: csv::Error) -> PersistError {
    PersistError::Csv {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::Other, source.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CombinedStats, TestResult, WindowSummary};
    use std::collections::HashMap;

    fn snapshot(state: DetectorState, reason: &'static str) -> AnalysisSnapshot {
        let summary = WindowSummary::new(32, vec![TestResult::new("monobit", 32, 0.2, 1.0)]);
        let mut q_values = HashMap::new();
        q_values.insert("monobit@32".to_string(), 0.2);
        AnalysisSnapshot {
            timestamp_ms: 1_700_000_000_000,
            combined: CombinedStats {
                gdi: 1.0,
                q_values,
                window_summaries: vec![summary],
            },
            detector_state: state,
            detector_reason: reason,
        }
    }

    #[test]
    fn s6_event_persists_trailing_snapshot_bits() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MetricsStore::new(100, dir.path().to_path_buf(), 16, None);
        let bits: Vec<u8> = (0..32).map(|i| (i % 2) as u8).collect();
        store.add(&snapshot(DetectorState::Event, "gdi_threshold"), &bits);

        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().filter_map(|e| e.ok()).collect();
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().into_string().unwrap();
        assert!(name.starts_with("snapshot_1700000000000"));
        let contents = fs::read(files[0].path()).unwrap();
        assert_eq!(contents, bits[16..]);
    }

    #[test]
    fn calm_tick_does_not_persist_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MetricsStore::new(100, dir.path().to_path_buf(), 16, None);
        store.add(&snapshot(DetectorState::Calm, "calm"), &[0, 1, 0, 1]);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn history_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MetricsStore::new(2, dir.path().to_path_buf(), 0, None);
        for _ in 0..5 {
            store.add(&snapshot(DetectorState::Calm, "calm"), &[0, 1]);
        }
        assert_eq!(store.history().len(), 2);
    }

    #[test]
    fn csv_log_writes_header_then_one_row_per_test_result() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("log.csv");
        let mut store = MetricsStore::new(10, dir.path().join("snaps"), 0, Some(csv_path.clone()));
        store.add(&snapshot(DetectorState::Calm, "calm"), &[0, 1]);

        let contents = fs::read_to_string(&csv_path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), "timestamp_ms,timestamp_iso,window,test,z_score,p_value,q_value,gdi,state,reason");
        assert!(lines.next().unwrap().contains("monobit"));
    }

    #[test]
    fn export_copies_csv_and_recent_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot_dir = dir.path().join("snaps");
        fs::create_dir_all(&snapshot_dir).unwrap();
        fs::write(snapshot_dir.join("snapshot_1.bin"), [1, 2, 3]).unwrap();
        let csv_path = dir.path().join("log.csv");
        fs::write(&csv_path, "header\n").unwrap();

        let store = MetricsStore::new(10, snapshot_dir, 0, Some(csv_path));
        let mount = dir.path().join("mount");
        let export_dir = store.export_to_usb(&mount, 5).unwrap();

        assert!(export_dir.join("log.csv").exists());
        assert!(export_dir.join("snapshots").join("snapshot_1.bin").exists());
    }
}
