// Copyright 2025 N. Dornseif
//
// Dual-licensed under Apache 2.0 and MIT terms.

//! Headless view-model: the plain data contract a UI would bind to. No
//! actual GUI toolkit is involved, this is the translation layer between
//! pipeline snapshots and display-ready rows.

use std::path::Path;

use crate::error::ExportError;
use crate::metrics::MetricsStore;
use crate::model::{AnalysisSnapshot, MetricRecord};
use crate::pipeline::{Pipeline, SettingsUpdate};

/// One test's display row.
#[derive(Debug, Clone, PartialEq)]
pub struct TestRow {
    pub window: usize,
    pub name: &'static str,
    pub z: f64,
    pub p: f64,
    pub q: f64,
    pub direction: &'static str,
}

/// One history point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryPoint {
    pub t: i64,
    pub gdi: f64,
    pub state: &'static str,
}

/// One event log entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventPoint {
    pub t: i64,
    pub gdi: f64,
    pub state: &'static str,
    pub reason: &'static str,
}

/// Two-bin count of 0s and 1s in the trailing bit sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ValueDistribution {
    pub zeros: usize,
    pub ones: usize,
}

/// Four-bin count of consecutive-bit-pair patterns `00/01/10/11`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PairDistribution {
    pub b00: usize,
    pub b01: usize,
    pub b10: usize,
    pub b11: usize,
}

/// Everything a single `apply` call refreshes, handed back so a caller can
/// diff or log it without re-reading every field individually.
#[derive(Debug, Clone)]
pub struct ViewUpdate {
    pub gdi: f64,
    pub state: &'static str,
    pub rows: Vec<TestRow>,
    pub history: Vec<HistoryPoint>,
    pub events: Vec<EventPoint>,
    pub value_distribution: ValueDistribution,
    pub pair_distribution: PairDistribution,
}

/// Binds pipeline output to display-ready state. Holds the metrics store
/// (which owns persistence) and the most recent rendering of each field.
pub struct ViewModel {
    metrics: MetricsStore,
}

impl ViewModel {
    pub fn new(metrics: MetricsStore) -> Self {
        ViewModel { metrics }
    }

    /// Records the snapshot in the metrics store and renders the payload a
    /// UI binding would consume for this tick.
    pub fn apply(&mut self, snapshot: &AnalysisSnapshot, bits: &[u8]) -> ViewUpdate {
        self.metrics.add(snapshot, bits);

        let rows = snapshot
            .combined
            .window_summaries
            .iter()
            .flat_map(|summary| {
                summary.tests.iter().map(move |test| TestRow {
                    window: summary.window,
                    name: test.name,
                    z: test.z_score,
                    p: test.p_value,
                    q: summary.q_values.get(&test.key()).copied().unwrap_or(1.0),
                    direction: test.direction.as_str(),
                })
            })
            .collect();

        let history = self.metrics.history().iter().map(record_to_history_point).collect();
        let events = self.metrics.events().iter().map(record_to_event_point).collect();

        ViewUpdate {
            gdi: snapshot.combined.gdi,
            state: snapshot.detector_state.as_str(),
            rows,
            history,
            events,
            value_distribution: value_distribution(bits),
            pair_distribution: pair_distribution(bits),
        }
    }

    /// Forwards a settings payload verbatim into the pipeline's live
    /// reconfiguration queue.
    pub fn forward_settings(&self, pipeline: &Pipeline, update: SettingsUpdate) {
        pipeline.enqueue_settings(update);
    }

    pub fn export_to_usb(&self, mount: &Path, count: usize) -> Result<std::path::PathBuf, ExportError> {
        self.metrics.export_to_usb(mount, count)
    }
}

fn record_to_history_point(record: &MetricRecord) -> HistoryPoint {
    HistoryPoint {
        t: record.timestamp_ms,
        gdi: record.gdi,
        state: record.state.as_str(),
    }
}

fn record_to_event_point(record: &MetricRecord) -> EventPoint {
    EventPoint {
        t: record.timestamp_ms,
        gdi: record.gdi,
        state: record.state.as_str(),
        reason: record.reason,
    }
}

fn value_distribution(bits: &[u8]) -> ValueDistribution {
    let mut dist = ValueDistribution::default();
    for &bit in bits {
        if bit == 0 {
            dist.zeros += 1;
        } else {
            dist.ones += 1;
        }
    }
    dist
}

fn pair_distribution(bits: &[u8]) -> PairDistribution {
    let mut dist = PairDistribution::default();
    for pair in bits.windows(2) {
        match (pair[0], pair[1]) {
            (0, 0) => dist.b00 += 1,
            (0, _) => dist.b01 += 1,
            (_, 0) => dist.b10 += 1,
            _ => dist.b11 += 1,
        }
    }
    dist
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CombinedStats, DetectorState, TestResult, WindowSummary};
    use std::collections::HashMap;

    fn snapshot() -> AnalysisSnapshot {
        let mut q_values = HashMap::new();
        q_values.insert("monobit@32".to_string(), 0.03);
        let summary = WindowSummary {
            window: 32,
            tests: vec![TestResult::new("monobit", 32, 0.02, 2.1)],
            q_values: {
                let mut m = HashMap::new();
                m.insert("monobit@32".to_string(), 0.03);
                m
            },
        };
        AnalysisSnapshot {
            timestamp_ms: 10,
            combined: CombinedStats {
                gdi: 2.1,
                q_values,
                window_summaries: vec![summary],
            },
            detector_state: DetectorState::Calm,
            detector_reason: "calm",
        }
    }

    fn view_model() -> ViewModel {
        let dir = tempfile::tempdir().unwrap();
        ViewModel::new(MetricsStore::new(10, dir.path().to_path_buf(), 0, None))
    }

    #[test]
    fn apply_renders_one_row_per_test_result() {
        let mut vm = view_model();
        let update = vm.apply(&snapshot(), &[0, 1, 1, 0]);
        assert_eq!(update.rows.len(), 1);
        assert_eq!(update.rows[0].name, "monobit");
        assert_eq!(update.rows[0].q, 0.03);
        assert_eq!(update.state, "calm");
    }

    #[test]
    fn apply_accumulates_history_across_ticks() {
        let mut vm = view_model();
        vm.apply(&snapshot(), &[0, 1]);
        let update = vm.apply(&snapshot(), &[0, 1]);
        assert_eq!(update.history.len(), 2);
    }

    #[test]
    fn value_distribution_counts_zero_and_one_bits() {
        let dist = value_distribution(&[0, 0, 1, 1, 1]);
        assert_eq!(dist, ValueDistribution { zeros: 2, ones: 3 });
    }

    #[test]
    fn pair_distribution_counts_all_four_patterns() {
        let dist = pair_distribution(&[0, 0, 1, 1, 0]);
        assert_eq!(dist.b00, 1);
        assert_eq!(dist.b01, 1);
        assert_eq!(dist.b11, 1);
        assert_eq!(dist.b10, 1);
    }

    #[test]
    fn pair_distribution_is_empty_on_a_single_bit() {
        let dist = pair_distribution(&[1]);
        assert_eq!(dist, PairDistribution::default());
    }
}
