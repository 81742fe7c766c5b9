// Copyright 2025 N. Dornseif
//
// Dual-licensed under Apache 2.0 and MIT terms.

//! Coordinates the bit producer, the bounded bit channel, and the periodic
//! analyser tick, on a dedicated OS thread.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::bitsource::{apply_bias, bytes_to_bits, BitSource, DeviceSource, FakeSource};
use crate::combine::build_combined_stats;
use crate::detector::{Detector, DetectorConfig};
use crate::model::{AnalysisSnapshot, WindowSummary};
use crate::windows::RollingWindows;
use crate::{battery, config::Config};

const BIT_CHANNEL_CAPACITY: usize = 8192;
const ANALYSER_RECV_TIMEOUT: Duration = Duration::from_millis(100);
const FALLBACK_RETRY_SLEEP: Duration = Duration::from_millis(500);

/// A validated, field-wise update to the pipeline's live configuration.
/// Corresponds to the dynamic settings payload in the distilled spec,
/// re-architected as a product type so malformed values can be ignored
/// per field without recourse to dynamic typing.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub windows: Option<Vec<usize>>,
    pub gdi_z: Option<f64>,
    pub sustained_z: Option<f64>,
    pub sustained_ticks: Option<u32>,
    pub fdr_q: Option<f64>,
    pub persist: bool,
}

impl SettingsUpdate {
    /// Parses raw, possibly-malformed values the way the original dynamic
    /// payload was handled: unparseable or out-of-range entries are
    /// dropped rather than failing the whole update.
    pub fn from_raw(
        windows: Option<&[f64]>,
        gdi_z: Option<f64>,
        sustained_z: Option<f64>,
        sustained_ticks: Option<f64>,
        fdr_q: Option<f64>,
        persist: bool,
    ) -> Self {
        let windows = windows.map(|sizes| {
            sizes
                .iter()
                .filter(|&&s| s > 0.0)
                .map(|&s| s as usize)
                .collect::<Vec<_>>()
        });
        let windows = windows.filter(|sizes| !sizes.is_empty());
        SettingsUpdate {
            windows,
            gdi_z,
            sustained_z,
            sustained_ticks: sustained_ticks.map(|t| t.max(0.0) as u32),
            fdr_q,
            persist,
        }
    }
}

/// One emitted tick: the snapshot plus the trailing `snapshot_bits` of
/// history at the time it was computed.
pub type SnapshotMessage = (AnalysisSnapshot, Vec<u8>);

pub struct Pipeline {
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    settings_tx: Sender<SettingsUpdate>,
    snapshot_rx: Receiver<SnapshotMessage>,
}

impl Pipeline {
    /// Spawns the producer+analyser loop on a dedicated thread. When
    /// `fake_seed` is `Some`, the pipeline runs entirely against a
    /// deterministic [`FakeSource`] with optional bias injection and never
    /// touches real devices.
    pub fn spawn(config: Config, config_path: std::path::PathBuf, fake_seed: Option<u64>, inject_bias: f64) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let (settings_tx, settings_rx) = crossbeam_channel::unbounded();
        let (snapshot_tx, snapshot_rx) = crossbeam_channel::unbounded();

        let thread_stop = Arc::clone(&stop_flag);
        let thread = std::thread::spawn(move || {
            run_pipeline(config, config_path, fake_seed, inject_bias, thread_stop, settings_rx, snapshot_tx);
        });

        Pipeline {
            stop_flag,
            thread: Some(thread),
            settings_tx,
            snapshot_rx,
        }
    }

    pub fn enqueue_settings(&self, update: SettingsUpdate) {
        let _ = self.settings_tx.send(update);
    }

    /// Non-blocking drain of whatever snapshots have accumulated.
    pub fn try_recv_snapshots(&self) -> Vec<SnapshotMessage> {
        self.snapshot_rx.try_iter().collect()
    }

    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let start = Instant::now();
            while !thread.is_finished() && start.elapsed() < Duration::from_secs(2) {
                std::thread::sleep(Duration::from_millis(10));
            }
            if let Err(_) = thread.join() {
                tracing::warn!("pipeline thread panicked during shutdown");
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_pipeline(
    config: Config,
    config_path: std::path::PathBuf,
    fake_seed: Option<u64>,
    inject_bias: f64,
    stop_flag: Arc<AtomicBool>,
    settings_rx: Receiver<SettingsUpdate>,
    snapshot_tx: Sender<SnapshotMessage>,
) {
    let (bit_tx, bit_rx) = bounded::<u8>(BIT_CHANNEL_CAPACITY);

    let producer_stop = Arc::clone(&stop_flag);
    let producer_config = config.clone();
    let producer = std::thread::spawn(move || {
        if let Some(seed) = fake_seed {
            run_fake_producer(&producer_config, seed, inject_bias, producer_stop, bit_tx);
        } else {
            run_device_producer(&producer_config, inject_bias, producer_stop, bit_tx);
        }
    });

    run_analyser(config, config_path, stop_flag, bit_rx, settings_rx, snapshot_tx);
    let _ = producer.join();
}

fn run_fake_producer(
    config: &Config,
    seed: u64,
    inject_bias: f64,
    stop_flag: Arc<AtomicBool>,
    bit_tx: Sender<u8>,
) {
    let mut source = FakeSource::new(seed, config.windows.chunk_bits);
    while !stop_flag.load(Ordering::SeqCst) {
        let Ok(chunk) = source.read_chunk() else {
            continue;
        };
        let mut bits = bytes_to_bits(&chunk);
        bits.truncate(config.windows.chunk_bits);
        apply_bias(&mut bits, inject_bias);
        if send_bits(&bit_tx, &bits, &stop_flag).is_err() {
            break;
        }
    }
}

fn run_device_producer(config: &Config, inject_bias: f64, stop_flag: Arc<AtomicBool>, bit_tx: Sender<u8>) {
    let mut primary = DeviceSource::new(&config.source.primary, config.source.read_bytes);
    let mut fallback = DeviceSource::new(&config.source.fallback, config.source.read_bytes);
    let mut on_fallback = false;

    while !stop_flag.load(Ordering::SeqCst) {
        let result = if on_fallback {
            fallback.read_chunk()
        } else {
            primary.read_chunk()
        };
        let chunk = match result {
            Ok(chunk) => chunk,
            Err(err) => {
                if !on_fallback {
                    tracing::warn!(error = %err, "primary entropy read failed, switching to fallback");
                    on_fallback = true;
                } else {
                    tracing::warn!(error = %err, "fallback entropy read failed, retrying");
                    std::thread::sleep(FALLBACK_RETRY_SLEEP);
                }
                continue;
            }
        };
        let mut bits = bytes_to_bits(&chunk);
        apply_bias(&mut bits, inject_bias);
        if send_bits(&bit_tx, &bits, &stop_flag).is_err() {
            break;
        }
    }
    primary.close();
    fallback.close();
}

/// Sends bits one at a time, blocking on backpressure but re-checking the
/// stop flag so shutdown isn't stuck behind a full channel.
fn send_bits(bit_tx: &Sender<u8>, bits: &[u8], stop_flag: &Arc<AtomicBool>) -> Result<(), ()> {
    for &bit in bits {
        loop {
            if stop_flag.load(Ordering::SeqCst) {
                return Err(());
            }
            match bit_tx.try_send(bit) {
                Ok(()) => break,
                Err(TrySendError::Full(_)) => std::thread::sleep(Duration::from_millis(5)),
                Err(TrySendError::Disconnected(_)) => return Err(()),
            }
        }
    }
    Ok(())
}

fn run_analyser(
    mut config: Config,
    config_path: std::path::PathBuf,
    stop_flag: Arc<AtomicBool>,
    bit_rx: Receiver<u8>,
    settings_rx: Receiver<SettingsUpdate>,
    snapshot_tx: Sender<SnapshotMessage>,
) {
    let mut windows = RollingWindows::new(config.windows.sizes.iter().copied());
    let mut history: Vec<u8> = Vec::new();
    let mut history_cap = history_cap(&config);
    let mut detector = Detector::new(DetectorConfig {
        gdi_threshold: config.alert.gdi_z,
        sustained_threshold: config.alert.sustained_z,
        sustained_ticks: config.alert.sustained_ticks,
        min_significant_tests: 2,
        fdr_q_threshold: config.alert.fdr_q,
    });
    let interval = Duration::from_millis(config.windows.analysis_interval_ms);
    let mut last_emit = Instant::now();

    while !stop_flag.load(Ordering::SeqCst) {
        match bit_rx.recv_timeout(ANALYSER_RECV_TIMEOUT) {
            Ok(bit) => {
                windows.add_bits(&[bit]);
                history.push(bit);
                if history.len() > history_cap {
                    let overflow = history.len() - history_cap;
                    history.drain(0..overflow);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        apply_pending_settings(
            &settings_rx,
            &config_path,
            &mut config,
            &mut windows,
            &mut history,
            &mut history_cap,
            &mut detector,
        );

        if last_emit.elapsed() < interval {
            continue;
        }
        last_emit = Instant::now();
        if !windows.has_enough_data(None) {
            continue;
        }

        let snapshot = compute_snapshot(&windows, &mut detector);
        let tail_start = history.len().saturating_sub(config.storage.snapshot_bits);
        let tail = history[tail_start..].to_vec();
        if snapshot_tx.send((snapshot, tail)).is_err() {
            break;
        }
    }
}

fn compute_snapshot(windows: &RollingWindows, detector: &mut Detector) -> AnalysisSnapshot {
    let arrays = windows.as_arrays();
    let mut summaries = BTreeMap::new();
    for (size, bits) in arrays {
        if bits.len() < size {
            continue;
        }
        let tests = battery::run_all(&bits, size);
        summaries.insert(size, WindowSummary::new(size, tests));
    }
    let combined = build_combined_stats(summaries);
    let (state, reason) = detector.evaluate(combined.gdi, &combined.q_values);
    AnalysisSnapshot {
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
        combined,
        detector_state: state,
        detector_reason: reason,
    }
}

fn history_cap(config: &Config) -> usize {
    let window_max = config.windows.sizes.iter().copied().max().unwrap_or(0);
    config.storage.snapshot_bits.max(window_max)
}

fn apply_pending_settings(
    settings_rx: &Receiver<SettingsUpdate>,
    config_path: &std::path::Path,
    config: &mut Config,
    windows: &mut RollingWindows,
    history: &mut Vec<u8>,
    history_cap: &mut usize,
    detector: &mut Detector,
) {
    let mut applied_any = false;
    for update in settings_rx.try_iter() {
        applied_any = true;
        if let Some(sizes) = update.windows {
            config.windows.sizes = sizes.clone();
            *windows = RollingWindows::new(sizes);
            history.clear();
            *history_cap = config.storage.snapshot_bits.max(config.windows.sizes.iter().copied().max().unwrap_or(0));
        }
        if let Some(gdi_z) = update.gdi_z {
            detector.config.gdi_threshold = gdi_z;
            config.alert.gdi_z = gdi_z;
        }
        if let Some(sustained_z) = update.sustained_z {
            detector.config.sustained_threshold = sustained_z;
            config.alert.sustained_z = sustained_z;
        }
        if let Some(sustained_ticks) = update.sustained_ticks {
            detector.config.sustained_ticks = sustained_ticks;
            config.alert.sustained_ticks = sustained_ticks;
        }
        if let Some(fdr_q) = update.fdr_q {
            detector.config.fdr_q_threshold = fdr_q;
            config.alert.fdr_q = fdr_q;
        }
        if update.persist {
            match config.persist(config_path) {
                Ok(()) => tracing::info!(path = %config_path.display(), "persisted live-reconfigured settings"),
                Err(err) => tracing::warn!(error = %err, path = %config_path.display(), "failed to persist settings"),
            }
        }
    }
    if applied_any {
        tracing::debug!(windows = ?config.windows.sizes, gdi_z = config.alert.gdi_z, "applied live settings update");
    }
}
