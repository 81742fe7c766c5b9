// Copyright 2025 N. Dornseif
//
// Dual-licensed under Apache 2.0 and MIT terms.

//! Command-line flags.

use std::path::PathBuf;

use clap::Parser;

/// Live statistical surveillance of a hardware entropy stream.
#[derive(Debug, Parser)]
#[command(name = "rng-sentinel", version, about)]
pub struct Cli {
    /// Path to the YAML configuration document.
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Run against the deterministic fake source instead of real devices.
    /// A bare flag uses a fixed default seed; a value overrides it.
    #[arg(long, num_args = 0..=1, default_missing_value = "1729")]
    pub fake: Option<u64>,

    /// Flip every Nth bit of the live stream to simulate a biased source,
    /// where N = floor(1 / bias). 0 disables injection.
    #[arg(long, default_value_t = 0.0, value_parser = parse_bias)]
    pub inject_bias: f64,

    /// Minimum level of log events to emit.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

fn parse_bias(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|_| format!("{raw:?} is not a number"))?;
    if !(0.0..=0.5).contains(&value) {
        return Err(format!("bias must be in 0..=0.5, got {value}"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_fake_flag_uses_default_seed() {
        let cli = Cli::parse_from(["rng-sentinel", "--fake"]);
        assert_eq!(cli.fake, Some(1729));
    }

    #[test]
    fn fake_flag_accepts_an_explicit_seed() {
        let cli = Cli::parse_from(["rng-sentinel", "--fake", "42"]);
        assert_eq!(cli.fake, Some(42));
    }

    #[test]
    fn omitted_fake_flag_is_none() {
        let cli = Cli::parse_from(["rng-sentinel"]);
        assert_eq!(cli.fake, None);
    }

    #[test]
    fn default_config_path_is_config_yaml() {
        let cli = Cli::parse_from(["rng-sentinel"]);
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
    }

    #[test]
    fn bias_out_of_range_is_rejected() {
        assert!(Cli::try_parse_from(["rng-sentinel", "--inject-bias", "0.9"]).is_err());
    }
}
