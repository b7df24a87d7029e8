//! Demodulator subprocess capture
//!
//! Spawns the external FSK demodulator and feeds its hard bit decisions
//! through the CIR decoder on a dedicated thread:
//! 1. Spawn the demodulator with stdout piped
//! 2. Read the bit stream (one byte per symbol, decision in the LSB)
//! 3. Drive [`CirDecoder::feed_bit`] for every symbol
//! 4. Ship completed frames over a bounded channel to the main loop

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::pipeline::{CirDecoder, DecoderConfig};
use crate::cir::TelemetryFrame;

/// Demodulator subprocess configuration
#[derive(Debug, Clone)]
pub struct DemodConfig {
    /// Demodulator executable
    pub demod_path: String,
    /// Audio input passed to the demodulator; "-" reads its stdin
    pub audio_input: String,
    /// Audio sample rate in Hz
    pub sample_rate: u32,
}

impl Default for DemodConfig {
    fn default() -> Self {
        Self {
            demod_path: "cir_demod".to_string(),
            audio_input: "-".to_string(),
            sample_rate: 8_000,
        }
    }
}

/// Capture statistics (atomic for thread-safe access)
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub bits_processed: AtomicU64,
    pub buffers_processed: AtomicU64,
    pub locks: AtomicU64,
    pub near_misses: AtomicU64,
    pub frames_decoded: AtomicU64,
    pub good_frames: AtomicU64,
    pub crc_errors: AtomicU64,
    pub corrected_words: AtomicU64,
    pub uncorrectable_words: AtomicU64,
    pub rejected_frames: AtomicU64,
}

impl CaptureStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

/// Capture controller: owns the demodulator subprocess lifecycle
pub struct BitCapture {
    config: DemodConfig,
    decoder_config: DecoderConfig,
    running: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
}

impl BitCapture {
    pub fn new(config: DemodConfig, decoder_config: DecoderConfig) -> Self {
        Self {
            config,
            decoder_config,
            running: Arc::new(AtomicBool::new(false)),
            stats: CaptureStats::new(),
        }
    }

    /// Start capturing and return a receiver for completed frames
    pub fn start(&self) -> Result<Receiver<TelemetryFrame>> {
        info!("===========================================");
        info!("  Starting CIR bit capture");
        info!("===========================================");
        info!("  Demodulator: {}", self.config.demod_path);
        info!("  Audio input: {}", self.config.audio_input);
        info!("  Sample rate: {} Hz", self.config.sample_rate);

        let (frame_tx, frame_rx) = bounded::<TelemetryFrame>(1000);

        let config = self.config.clone();
        let decoder_config = self.decoder_config;
        let running = self.running.clone();
        let stats = self.stats.clone();

        running.store(true, Ordering::SeqCst);

        thread::Builder::new()
            .name("cir-capture".to_string())
            .spawn(move || {
                if let Err(e) = run_capture(config, decoder_config, running, stats, frame_tx) {
                    error!("Bit capture error: {}", e);
                }
            })
            .context("Failed to spawn capture thread")?;

        Ok(frame_rx)
    }

    /// Stop capturing
    pub fn stop(&self) {
        info!("Stopping CIR bit capture...");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get statistics
    pub fn stats(&self) -> &Arc<CaptureStats> {
        &self.stats
    }
}

impl Drop for BitCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Main capture loop (runs in dedicated thread)
fn run_capture(
    config: DemodConfig,
    decoder_config: DecoderConfig,
    running: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
    frame_tx: Sender<TelemetryFrame>,
) -> Result<()> {
    info!("Starting demodulator process for bit capture...");

    // Demodulator command:
    // cir_demod -s <rate> -i <audio input> -
    // The trailing "-" means bit output to stdout
    let mut cmd = Command::new(&config.demod_path);
    cmd.arg("-s")
        .arg(config.sample_rate.to_string())
        .arg("-i")
        .arg(&config.audio_input)
        .arg("-");

    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    info!("Executing: {:?}", cmd);

    let mut child = cmd
        .spawn()
        .context("Failed to spawn demodulator. Make sure it is installed and in PATH")?;

    let mut stdout = child
        .stdout
        .take()
        .context("Failed to capture demodulator stdout")?;

    // Spawn stderr reader for logging
    if let Some(stderr) = child.stderr.take() {
        thread::spawn(move || {
            let mut reader = std::io::BufReader::new(stderr);
            let mut line = String::new();
            while std::io::BufRead::read_line(&mut reader, &mut line).unwrap_or(0) > 0 {
                if !line.trim().is_empty() {
                    info!("[demod] {}", line.trim());
                }
                line.clear();
            }
        });
    }

    let mut decoder = CirDecoder::new(decoder_config);

    // One byte per demodulated symbol
    const BUFFER_SIZE: usize = 64 * 1024;
    let mut buffer = vec![0u8; BUFFER_SIZE];

    let mut last_stats_time = Instant::now();
    let mut first_data = true;

    while running.load(Ordering::SeqCst) {
        match stdout.read(&mut buffer) {
            Ok(0) => {
                warn!("demodulator stdout closed (EOF)");
                break;
            }
            Ok(n_read) => {
                if first_data {
                    info!("First demodulated bits received! ({} bytes)", n_read);
                    first_data = false;
                }

                stats.buffers_processed.fetch_add(1, Ordering::Relaxed);

                for &byte in &buffer[..n_read] {
                    match decoder.feed_bit(byte & 1) {
                        Ok(Some(frame)) => {
                            if frame.is_good() {
                                info!(
                                    ">>> FRAME({}): {}",
                                    frame.data.len(),
                                    frame.to_hex()
                                );
                            } else {
                                debug!(
                                    ">>> FRAME({})(broken): {}",
                                    frame.data.len(),
                                    frame.word_dump()
                                );
                            }

                            // Send to channel (non-blocking)
                            if frame_tx.try_send(frame).is_err() {
                                debug!("Frame channel full, dropping frame");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            stats.rejected_frames.fetch_add(1, Ordering::Relaxed);
                            warn!("frame rejected: {}", e);
                        }
                    }
                }

                // Update shared stats from the decoder
                stats
                    .bits_processed
                    .store(decoder.stats.bits_processed, Ordering::Relaxed);
                stats.locks.store(decoder.stats.locks, Ordering::Relaxed);
                stats
                    .near_misses
                    .store(decoder.stats.near_misses, Ordering::Relaxed);
                stats
                    .frames_decoded
                    .store(decoder.stats.frames_decoded, Ordering::Relaxed);
                stats
                    .good_frames
                    .store(decoder.stats.good_frames, Ordering::Relaxed);
                stats
                    .crc_errors
                    .store(decoder.stats.crc_errors, Ordering::Relaxed);
                stats
                    .corrected_words
                    .store(decoder.stats.corrected_words, Ordering::Relaxed);
                stats
                    .uncorrectable_words
                    .store(decoder.stats.uncorrectable_words, Ordering::Relaxed);

                // Periodic stats logging (every 5 seconds)
                if last_stats_time.elapsed() >= Duration::from_secs(5) {
                    info!(
                        "[Capture Stats] Bits: {} | Locks: {} (near misses: {}) | Frames: {} good / {} bad | Corrected words: {}",
                        decoder.stats.bits_processed,
                        decoder.stats.locks,
                        decoder.stats.near_misses,
                        decoder.stats.good_frames,
                        decoder.stats.crc_errors,
                        decoder.stats.corrected_words
                    );
                    last_stats_time = Instant::now();
                }
            }
            Err(e) => {
                error!("Error reading from demodulator: {}", e);
                thread::sleep(Duration::from_millis(100));
            }
        }
    }

    // Kill the demodulator process
    let _ = child.kill();

    info!("CIR bit capture stopped");
    info!(
        "Final stats: Bits={}, Locks={}, Frames={} (good: {}, bad: {}), Uncorrectable words={}",
        decoder.stats.bits_processed,
        decoder.stats.locks,
        decoder.stats.frames_decoded,
        decoder.stats.good_frames,
        decoder.stats.crc_errors,
        decoder.stats.uncorrectable_words
    );

    Ok(())
}
