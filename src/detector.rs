// Copyright 2025 N. Dornseif
//
// Dual-licensed under Apache 2.0 and MIT terms.

//! Three-state detector: CALM, EVENT, RECOVER.

use std::collections::HashMap;

use crate::model::DetectorState;

#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    pub gdi_threshold: f64,
    pub sustained_threshold: f64,
    pub sustained_ticks: u32,
    pub min_significant_tests: usize,
    pub fdr_q_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            gdi_threshold: 3.0,
            sustained_threshold: 2.5,
            sustained_ticks: 5,
            min_significant_tests: 2,
            fdr_q_threshold: 0.01,
        }
    }
}

pub struct Detector {
    pub config: DetectorConfig,
    state: DetectorState,
    sustain_counter: u32,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Self {
        Detector {
            config,
            state: DetectorState::Calm,
            sustain_counter: 0,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Evaluates one tick's GDI and q-value map, updating and returning
    /// the detector's state plus a short reason tag.
    pub fn evaluate(&mut self, gdi: f64, q_values: &HashMap<String, f64>) -> (DetectorState, &'static str) {
        let significant = q_values
            .values()
            .filter(|&&q| q <= self.config.fdr_q_threshold)
            .count();

        if gdi >= self.config.gdi_threshold {
            self.state = DetectorState::Event;
            self.sustain_counter = 0;
            return (self.state, "gdi_threshold");
        }

        if significant >= self.config.min_significant_tests {
            self.state = DetectorState::Event;
            self.sustain_counter = 0;
            return (self.state, "fdr_cluster");
        }

        if gdi >= self.config.sustained_threshold {
            self.sustain_counter += 1;
            if self.sustain_counter >= self.config.sustained_ticks {
                self.state = DetectorState::Event;
                self.sustain_counter = 0;
                return (self.state, "sustained_gdi");
            }
            self.state = DetectorState::Recover;
            return (self.state, "watch");
        }

        self.sustain_counter = 0;
        let reason = match self.state {
            DetectorState::Event => {
                self.state = DetectorState::Recover;
                "cooldown"
            }
            DetectorState::Recover => {
                self.state = DetectorState::Calm;
                "stabilized"
            }
            DetectorState::Calm => "calm",
        };
        (self.state, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn calm_stream_stays_calm() {
        let mut detector = Detector::new(DetectorConfig::default());
        let (state, reason) = detector.evaluate(0.0, &q(&[]));
        assert_eq!(state, DetectorState::Calm);
        assert_eq!(reason, "calm");
    }

    #[test]
    fn s3_single_high_gdi_then_cooldown_then_stabilized() {
        let mut detector = Detector::new(DetectorConfig::default());
        let (state, reason) = detector.evaluate(3.5, &q(&[]));
        assert_eq!(state, DetectorState::Event);
        assert_eq!(reason, "gdi_threshold");

        let (state, reason) = detector.evaluate(1.0, &q(&[]));
        assert_eq!(state, DetectorState::Recover);
        assert_eq!(reason, "cooldown");

        let (state, reason) = detector.evaluate(0.1, &q(&[]));
        assert_eq!(state, DetectorState::Calm);
        assert_eq!(reason, "stabilized");
    }

    #[test]
    fn s4_sustained_watch_then_event() {
        let mut config = DetectorConfig::default();
        config.sustained_threshold = 2.0;
        config.sustained_ticks = 2;
        let mut detector = Detector::new(config);

        let (state, reason) = detector.evaluate(2.5, &q(&[]));
        assert_eq!(state, DetectorState::Recover);
        assert_eq!(reason, "watch");

        let (state, reason) = detector.evaluate(2.5, &q(&[]));
        assert_eq!(state, DetectorState::Event);
        assert_eq!(reason, "sustained_gdi");
    }

    #[test]
    fn s5_fdr_cluster_fires_event() {
        let mut config = DetectorConfig::default();
        config.min_significant_tests = 2;
        config.fdr_q_threshold = 0.01;
        let mut detector = Detector::new(config);

        let (state, reason) = detector.evaluate(
            0.1,
            &q(&[("a@n", 0.001), ("b@n", 0.005), ("c@n", 0.5)]),
        );
        assert_eq!(state, DetectorState::Event);
        assert_eq!(reason, "fdr_cluster");
    }

    #[test]
    fn quiet_tick_after_watch_collapses_sustain_immediately() {
        let mut config = DetectorConfig::default();
        config.sustained_threshold = 2.0;
        config.sustained_ticks = 5;
        let mut detector = Detector::new(config);

        detector.evaluate(2.5, &q(&[]));
        detector.evaluate(2.5, &q(&[]));
        let (state, reason) = detector.evaluate(0.0, &q(&[]));
        assert_eq!(state, DetectorState::Calm);
        assert_eq!(reason, "stabilized");

        let (state, reason) = detector.evaluate(2.5, &q(&[]));
        assert_eq!(state, DetectorState::Recover);
        assert_eq!(reason, "watch");
    }

    #[test]
    fn event_with_non_cooldown_reason_resets_sustain_counter() {
        let mut config = DetectorConfig::default();
        config.sustained_threshold = 2.0;
        config.sustained_ticks = 1;
        let mut detector = Detector::new(config);

        let (state, reason) = detector.evaluate(2.5, &q(&[]));
        assert_eq!(state, DetectorState::Event);
        assert_eq!(reason, "sustained_gdi");

        let (state, reason) = detector.evaluate(2.5, &q(&[]));
        assert_eq!(state, DetectorState::Event);
        assert_eq!(reason, "sustained_gdi");
    }
}
