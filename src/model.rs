// Copyright 2025 N. Dornseif
//
// Dual-licensed under Apache 2.0 and MIT terms.

//! Core data model shared by the windows, battery, combiner and detector.

use std::collections::HashMap;

/// p-values are clamped away from the 0/1 singularities.
pub const P_MIN: f64 = 1e-12;
pub const P_MAX: f64 = 1.0 - 1e-12;

/// Clamp a raw p-value into `[P_MIN, P_MAX]`.
pub fn clamp_p(p: f64) -> f64 {
    p.clamp(P_MIN, P_MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    pub fn from_z(z: f64) -> Self {
        if z >= 0.0 {
            Direction::Positive
        } else {
            Direction::Negative
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Positive => "positive",
            Direction::Negative => "negative",
        }
    }
}

/// One test's verdict on one window, for one tick.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub name: &'static str,
    pub window: usize,
    pub p_value: f64,
    pub z_score: f64,
    pub direction: Direction,
}

impl TestResult {
    pub fn new(name: &'static str, window: usize, p_value: f64, z_score: f64) -> Self {
        TestResult {
            name,
            window,
            p_value: clamp_p(p_value),
            z_score,
            direction: Direction::from_z(z_score),
        }
    }

    /// `name@window`, the join key used by the combiner's q-value map.
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.window)
    }
}

/// All TestResults produced for a single window size in one tick, plus the
/// q-values the combiner writes back in.
#[derive(Debug, Clone, Default)]
pub struct WindowSummary {
    pub window: usize,
    pub tests: Vec<TestResult>,
    pub q_values: HashMap<String, f64>,
}

impl WindowSummary {
    pub fn new(window: usize, tests: Vec<TestResult>) -> Self {
        WindowSummary {
            window,
            tests,
            q_values: HashMap::new(),
        }
    }
}

/// Aggregated result of one analyser tick across all active window sizes.
#[derive(Debug, Clone, Default)]
pub struct CombinedStats {
    pub gdi: f64,
    pub q_values: HashMap<String, f64>,
    pub window_summaries: Vec<WindowSummary>,
}

impl CombinedStats {
    /// GDI and the Stouffer z are aliases of the same field in this model.
    pub fn stouffer_z(&self) -> f64 {
        self.gdi
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorState {
    Calm,
    Event,
    Recover,
}

impl DetectorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorState::Calm => "calm",
            DetectorState::Event => "event",
            DetectorState::Recover => "recover",
        }
    }
}

/// One full analysis tick.
#[derive(Debug, Clone)]
pub struct AnalysisSnapshot {
    pub timestamp_ms: i64,
    pub combined: CombinedStats,
    pub detector_state: DetectorState,
    pub detector_reason: &'static str,
}

/// Historical compaction of a snapshot, retained in the metrics store.
#[derive(Debug, Clone)]
pub struct MetricRecord {
    pub timestamp_ms: i64,
    pub gdi: f64,
    pub state: DetectorState,
    pub reason: &'static str,
}

impl From<&AnalysisSnapshot> for MetricRecord {
    fn from(snapshot: &AnalysisSnapshot) -> Self {
        MetricRecord {
            timestamp_ms: snapshot.timestamp_ms,
            gdi: snapshot.combined.gdi,
            state: snapshot.detector_state,
            reason: snapshot.detector_reason,
        }
    }
}
