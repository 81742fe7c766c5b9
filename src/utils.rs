// Copyright 2025 N. Dornseif
//
// Dual-licensed under Apache 2.0 and MIT terms.

//! Misc utility functions shared by the battery, logging, and CLI output.

use std::time::Duration;

pub const INV_ROOT2: f64 = 0.7071067811865475;

/// Standard normal CDF, expressed via `erfc` the way the rest of this
/// crate's statistics are, rather than pulling in `statrs::distribution`.
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * statrs::function::erf::erfc(-x * INV_ROOT2)
}

/// Chi-square survival function `P(X > x)` for `df` degrees of freedom,
/// via the regularized upper incomplete gamma function.
pub fn chi2_sf(x: f64, df: f64) -> f64 {
    statrs::function::gamma::checked_gamma_ur(df / 2.0, x / 2.0).unwrap_or(0.0)
}

/// Format a duration to a fixed width, for human-facing logs.
pub fn format_elapsed_time(duration: Duration) -> String {
    const DECIMAL_DIGITS: usize = 4;
    let round_mul: f64 = 10.0_f64.powi(DECIMAL_DIGITS as i32);
    let secs = duration.as_secs_f64();

    if secs >= 1.0 {
        format!("{:<1$} s ", (secs * round_mul).floor() / round_mul, DECIMAL_DIGITS + 4)
    } else if secs >= 1e-3 {
        format!("{:<1$} ms", (secs * 1e3 * round_mul).floor() / round_mul, DECIMAL_DIGITS + 4)
    } else if secs >= 1e-6 {
        format!("{:<1$} µs", (secs * 1e6 * round_mul).floor() / round_mul, DECIMAL_DIGITS + 4)
    } else {
        format!("{:<1$} ns", (secs * 1e9 * round_mul).floor() / round_mul, DECIMAL_DIGITS + 4)
    }
}

/// Format a number of bytes into a pretty String, e.g. 1048576 -> "1.00 MiB".
pub fn format_byte_count(num_bytes: usize) -> String {
    if num_bytes >= 1073741824 {
        format!("{:.2} GiB", num_bytes as f64 / 1073741824.0)
    } else if num_bytes >= 1048576 {
        format!("{:.2} MiB", num_bytes as f64 / 1048576.0)
    } else if num_bytes >= 1024 {
        format!("{:.2} KiB", num_bytes as f64 / 1024.0)
    } else {
        format!("{:.2} B", num_bytes as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norm_cdf_matches_known_points() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-9);
        assert!(norm_cdf(-10.0) < 1e-12);
        assert!(norm_cdf(10.0) > 1.0 - 1e-12);
    }

    #[test]
    fn chi2_sf_is_one_at_zero() {
        assert!((chi2_sf(0.0, 3.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn byte_count_formatting() {
        assert_eq!(format_byte_count(512), "512.00 B");
        assert_eq!(format_byte_count(2048), "2.00 KiB");
    }
}
