// Copyright 2025 N. Dornseif
//
// Dual-licensed under Apache 2.0 and MIT terms.

//! Benjamini-Hochberg q-value adjustment and Stouffer aggregation into GDI.

use std::collections::{BTreeMap, HashMap};

use crate::model::{CombinedStats, WindowSummary};

/// Benjamini-Hochberg step-down adjustment.
///
/// Walks ranks from highest to lowest, maintaining a running minimum of
/// `p * m / rank`, so the result is monotone non-decreasing as rank
/// decreases (ties broken by insertion order).
pub fn apply_bh(p_values: &HashMap<String, f64>) -> HashMap<String, f64> {
    let m = p_values.len();
    if m == 0 {
        return HashMap::new();
    }
    let mut sorted: Vec<(&String, &f64)> = p_values.iter().collect();
    sorted.sort_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut adjusted = HashMap::with_capacity(m);
    let mut running_min = 1.0f64;
    for (rank, (key, &p)) in sorted.iter().enumerate().rev() {
        let rank = rank + 1;
        let coeff = (p * m as f64) / rank as f64;
        running_min = running_min.min(coeff);
        adjusted.insert((*key).clone(), running_min.min(1.0));
    }
    adjusted
}

/// Stouffer combination: `Z = sum(z) / sqrt(m)`.
pub fn stouffer_z(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let sum: f64 = scores.iter().sum();
    sum / (scores.len() as f64).sqrt()
}

/// Builds the tick's [`CombinedStats`] from the per-window summaries
/// produced by the battery, ordered by window size ascending.
pub fn build_combined_stats(summaries: BTreeMap<usize, WindowSummary>) -> CombinedStats {
    let mut ordered: Vec<WindowSummary> = summaries.into_values().collect();
    ordered.sort_by_key(|summary| summary.window);

    let all_results: Vec<_> = ordered.iter().flat_map(|s| s.tests.iter()).collect();
    if all_results.is_empty() {
        return CombinedStats {
            gdi: 0.0,
            q_values: HashMap::new(),
            window_summaries: ordered,
        };
    }

    let p_values: HashMap<String, f64> = all_results
        .iter()
        .map(|result| (result.key(), result.p_value))
        .collect();
    let q_values = apply_bh(&p_values);

    for summary in ordered.iter_mut() {
        summary.q_values = summary
            .tests
            .iter()
            .map(|result| {
                let key = result.key();
                let q = *q_values.get(&key).unwrap_or(&1.0);
                (key, q)
            })
            .collect();
    }

    let z_scores: Vec<f64> = all_results.iter().map(|r| r.z_score).collect();
    let gdi = stouffer_z(&z_scores);

    CombinedStats {
        gdi,
        q_values,
        window_summaries: ordered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestResult;

    #[test]
    fn empty_input_yields_zeroed_stats() {
        let combined = build_combined_stats(BTreeMap::new());
        assert_eq!(combined.gdi, 0.0);
        assert!(combined.q_values.is_empty());
        assert!(combined.window_summaries.is_empty());
    }

    #[test]
    fn bh_adjustment_is_monotone_in_rank() {
        let mut p = HashMap::new();
        p.insert("a".to_string(), 0.001);
        p.insert("b".to_string(), 0.01);
        p.insert("c".to_string(), 0.5);
        let q = apply_bh(&p);
        assert!(q["a"] <= q["b"]);
        assert!(q["b"] <= q["c"]);
        for value in q.values() {
            assert!((0.0..=1.0).contains(value));
        }
    }

    #[test]
    fn stouffer_z_matches_formula_and_is_permutation_invariant() {
        let scores = vec![1.0, 2.0, -0.5];
        let expected = scores.iter().sum::<f64>() / (scores.len() as f64).sqrt();
        assert!((stouffer_z(&scores) - expected).abs() < 1e-12);

        let mut permuted = scores.clone();
        permuted.reverse();
        assert_eq!(stouffer_z(&scores), stouffer_z(&permuted));
    }

    #[test]
    fn combine_is_idempotent() {
        let mut summaries = BTreeMap::new();
        summaries.insert(
            8,
            WindowSummary::new(8, vec![TestResult::new("monobit", 8, 0.2, 1.3)]),
        );
        let first = build_combined_stats(summaries.clone());
        let second = build_combined_stats(summaries);
        assert_eq!(first.gdi, second.gdi);
        assert_eq!(first.q_values, second.q_values);
    }

    #[test]
    fn q_map_domain_equals_union_of_keys() {
        let mut summaries = BTreeMap::new();
        summaries.insert(
            8,
            WindowSummary::new(
                8,
                vec![
                    TestResult::new("monobit", 8, 0.2, 1.3),
                    TestResult::new("runs", 8, 0.9, 0.1),
                ],
            ),
        );
        summaries.insert(16, WindowSummary::new(16, vec![TestResult::new("serial", 16, 0.05, 2.0)]));
        let combined = build_combined_stats(summaries);
        let mut expected_keys: Vec<String> = combined
            .window_summaries
            .iter()
            .flat_map(|s| s.tests.iter().map(|t| t.key()))
            .collect();
        expected_keys.sort();
        let mut q_keys: Vec<String> = combined.q_values.keys().cloned().collect();
        q_keys.sort();
        assert_eq!(expected_keys, q_keys);
    }
}
