// Copyright 2025 N. Dornseif
//
// Dual-licensed under Apache 2.0 and MIT terms.

//! Entry point: load configuration, start the pipeline, and drain
//! snapshots into the view-model until shutdown.

mod battery;
mod bitsource;
mod cli;
mod combine;
mod config;
mod detector;
mod error;
mod metrics;
mod model;
mod pipeline;
mod utils;
mod viewmodel;
mod windows;

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::Config;
use error::SentinelError;
use metrics::MetricsStore;
use pipeline::Pipeline;
use viewmodel::ViewModel;

fn main() -> ExitCode {
    let started_at = std::time::Instant::now();
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = match Config::load(&cli.config).map_err(SentinelError::from) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, path = %cli.config.display(), "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        windows = ?config.windows.sizes,
        fake = cli.fake.is_some(),
        "starting entropy surveillance pipeline"
    );

    let metrics = MetricsStore::new(
        config.windows.history_length,
        config.storage.snapshot_dir.clone(),
        config.storage.snapshot_bits,
        config.storage.log_csv.clone(),
    );
    let mut view_model = ViewModel::new(metrics);

    let mut pipeline = Pipeline::spawn(config, cli.config.clone(), cli.fake, cli.inject_bias);

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = Arc::clone(&shutdown);
    if let Err(err) = ctrlc::set_handler(move || {
        handler_shutdown.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!(error = %err, "failed to install Ctrl-C handler");
    }

    while !shutdown.load(Ordering::SeqCst) {
        for (snapshot, bits) in pipeline.try_recv_snapshots() {
            let update = view_model.apply(&snapshot, &bits);
            tracing::debug!(gdi = update.gdi, state = update.state, "tick");
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    tracing::info!("shutdown requested, stopping pipeline");
    pipeline.stop();
    tracing::info!(uptime = %utils::format_elapsed_time(started_at.elapsed()), "shut down cleanly");
    ExitCode::SUCCESS
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
