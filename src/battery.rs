// Copyright 2025 N. Dornseif
//
// Dual-licensed under Apache 2.0 and MIT terms.

//! The fixed battery of six randomness tests applied to one window.
//!
//! Each test receives the current contents of one window and its declared
//! size, and returns either nothing (window too short) or a [`TestResult`].

use std::f64;

use rustfft::{num_complex::Complex64, FftPlanner};

use crate::model::TestResult;
use crate::utils::{chi2_sf, norm_cdf, INV_ROOT2};

/// Runs every test against one window's contents, skipping any whose
/// minimum-length gate isn't met.
pub fn run_all(bits: &[u8], window: usize) -> Vec<TestResult> {
    [
        monobit as fn(&[u8], usize) -> Option<TestResult>,
        runs,
        serial,
        ap_entropy,
        cusum,
        fft,
    ]
    .iter()
    .filter_map(|test| test(bits, window))
    .collect()
}

fn signed(bits: &[u8]) -> Vec<f64> {
    bits.iter().map(|&b| 2.0 * b as f64 - 1.0).collect()
}

pub fn monobit(bits: &[u8], window: usize) -> Option<TestResult> {
    let n = bits.len();
    if n < 1 {
        return None;
    }
    let s: f64 = signed(bits).iter().sum();
    let test_stat = s.abs() / (n as f64).sqrt();
    let p = statrs::function::erf::erfc(test_stat * INV_ROOT2);
    let z = s / (n as f64).sqrt();
    Some(TestResult::new("monobit", window, p, z))
}

pub fn runs(bits: &[u8], window: usize) -> Option<TestResult> {
    let n = bits.len();
    if n < 2 {
        return None;
    }
    let pi = bits.iter().map(|&b| b as f64).sum::<f64>() / n as f64;
    let tau = 2.0 / (n as f64).sqrt();
    if (pi - 0.5).abs() >= tau {
        return Some(TestResult::new("runs", window, 0.0, f64::INFINITY));
    }
    let v = 1.0
        + bits
            .windows(2)
            .filter(|pair| pair[0] != pair[1])
            .count() as f64;
    let mu = 2.0 * n as f64 * pi * (1.0 - pi);
    let sigma = 2.0 * (2.0 * n as f64).sqrt() * pi * (1.0 - pi);
    if sigma == 0.0 {
        return None;
    }
    let p = statrs::function::erf::erfc((v - mu).abs() / sigma);
    let z = (v - mu) / sigma;
    Some(TestResult::new("runs", window, p, z))
}

pub fn serial(bits: &[u8], window: usize) -> Option<TestResult> {
    let n = bits.len();
    if n < 2 {
        return None;
    }
    let mut counts = [0f64; 4];
    for pair in bits.windows(2) {
        let idx = ((pair[0] << 1) | pair[1]) as usize;
        counts[idx] += 1.0;
    }
    let total = (n - 1) as f64;
    let chi_sq = (4.0 / total) * counts.iter().map(|c| c * c).sum::<f64>() - total;
    let p = chi2_sf(chi_sq, 3.0);
    let z = (chi_sq - 3.0) / 6f64.sqrt();
    Some(TestResult::new("serial", window, p, z))
}

/// `phi(k)` over the circular extension of `bits` (first `k-1` bits
/// appended to the tail), per the NIST-style approximate entropy
/// convention.
fn ap_phi(bits: &[u8], k: usize) -> f64 {
    let n = bits.len();
    let mut padded = Vec::with_capacity(n + k - 1);
    padded.extend_from_slice(bits);
    padded.extend_from_slice(&bits[..k - 1]);

    let mut patterns = vec![0u64; 1 << k];
    for window in padded.windows(k).take(n) {
        let mut index = 0usize;
        for &bit in window {
            index = (index << 1) | bit as usize;
        }
        patterns[index] += 1;
    }
    patterns
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let prob = count as f64 / n as f64;
            prob * prob.ln()
        })
        .sum()
}

pub fn ap_entropy(bits: &[u8], window: usize) -> Option<TestResult> {
    const M: usize = 2;
    let n = bits.len();
    if n < M + 1 {
        return None;
    }
    let phi_m = ap_phi(bits, M);
    let phi_m1 = ap_phi(bits, M + 1);
    let ap_en = phi_m - phi_m1;
    let chi_sq = 2.0 * n as f64 * (2f64.ln() - ap_en);
    let df = (1 << M) as f64 - 1.0;
    let p = chi2_sf(chi_sq, df);
    let z = (chi_sq - df) / (2.0 * df).sqrt();
    Some(TestResult::new("ap_entropy", window, p, z))
}

pub fn cusum(bits: &[u8], window: usize) -> Option<TestResult> {
    let n = bits.len();
    if n < 1 {
        return None;
    }
    let mapped = signed(bits);
    let mut cumsum = Vec::with_capacity(n);
    let mut running = 0.0;
    let mut max_dev = 0.0f64;
    for value in &mapped {
        running += value;
        max_dev = max_dev.max(running.abs());
        cumsum.push(running);
    }
    let sqrt_n = (n as f64).sqrt();
    let p = 1.0 - norm_cdf(max_dev / sqrt_n);
    let z = cumsum[n - 1] / sqrt_n;
    Some(TestResult::new("cusum", window, p, z))
}

pub fn fft(bits: &[u8], window: usize) -> Option<TestResult> {
    let n = bits.len();
    if n < 64 {
        return None;
    }
    let mut buffer: Vec<Complex64> = signed(bits).into_iter().map(Complex64::from).collect();
    let mut planner = FftPlanner::new();
    let transform = planner.plan_fft_forward(n);
    transform.process(&mut buffer);

    let half = n / 2;
    let threshold = (1.0_f64 / 0.05).ln().sqrt() * (n as f64).sqrt();
    let count = buffer[..half].iter().filter(|c| c.norm() < threshold).count() as f64;
    let expected = 0.95 * half as f64;
    let deviation = (count - expected) / (n as f64 * 0.95 * 0.05 / 4.0).sqrt();
    let p = norm_cdf(-deviation.abs());
    Some(TestResult::new("fft", window, p, -deviation))
}
