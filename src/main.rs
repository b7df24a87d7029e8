//! CIR Capture - railway telemetry frame decoder
//!
//! Spawns an external FSK demodulator, decodes the CIR bit stream
//! (BCH(26,16) FEC + CRC16 framing), and reports recovered frames as JSON
//! records on stdout.

mod cir;
mod config;
mod decoder;
mod report;

use anyhow::Result;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::Config;
use decoder::{BitCapture, DecoderConfig, DemodConfig};
use report::FrameRecord;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the frame records
    FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("===========================================");
    info!("   CIR Capture - railway telemetry decoder");
    info!("===========================================");

    // Load configuration
    let config = Config::from_env();

    info!("Configuration:");
    info!("  Demodulator: {}", config.demod_path);
    info!("  Audio input: {}", config.audio_input);
    info!("  Sample rate: {} Hz", config.sample_rate);
    info!("  Device ID: {}", config.device_id);
    info!("  Frame buffer bound: {} bytes", config.max_frame_bytes);

    // Report writer: serializes records to stdout as they arrive and keeps
    // the session list for the final array dump
    let (record_tx, mut record_rx) = mpsc::channel::<FrameRecord>(1000);
    let writer_handle = tokio::spawn(async move {
        let mut session: Vec<FrameRecord> = Vec::new();
        while let Some(record) = record_rx.recv().await {
            match serde_json::to_string(&record) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize frame record: {}", e),
            }
            session.push(record);
        }
        session
    });

    let demod_config = DemodConfig {
        demod_path: config.demod_path.clone(),
        audio_input: config.audio_input.clone(),
        sample_rate: config.sample_rate,
    };
    let decoder_config = DecoderConfig {
        max_frame_bytes: config.max_frame_bytes,
        ..DecoderConfig::default()
    };

    // Start the capture thread
    let capture = BitCapture::new(demod_config, decoder_config);
    let frame_rx = match capture.start() {
        Ok(rx) => rx,
        Err(e) => {
            error!("Failed to start bit capture: {}", e);
            error!("Make sure the demodulator is installed and the audio input is readable.");
            return Err(e);
        }
    };

    info!("===========================================");
    info!("  Starting capture...");
    info!("  Press Ctrl+C to stop.");
    info!("===========================================");

    let mut frames_processed = 0u64;
    let mut last_stats_report = Instant::now();

    // Main processing loop - receive completed frames from the capture thread
    loop {
        // Non-blocking receive with timeout for periodic tasks
        match frame_rx.recv_timeout(Duration::from_millis(500)) {
            Ok(frame) => {
                frames_processed += 1;

                let record = FrameRecord::from_frame(&config.device_id, &frame);
                if let Err(e) = record_tx.send(record).await {
                    warn!("Failed to queue frame record: {}", e);
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                // No frame received, continue with periodic tasks
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                warn!("Capture frame channel disconnected");
                break;
            }
        }

        // Periodic statistics (default every 5 seconds)
        if last_stats_report.elapsed() >= Duration::from_millis(config.stats_interval_ms) {
            let stats = capture.stats();
            info!(
                "[Stats] Bits: {} | Locks: {} (near misses: {}) | Frames: {} good / {} bad | Corrected words: {} | Uncorrectable: {}",
                stats.bits_processed.load(Ordering::Relaxed),
                stats.locks.load(Ordering::Relaxed),
                stats.near_misses.load(Ordering::Relaxed),
                stats.good_frames.load(Ordering::Relaxed),
                stats.crc_errors.load(Ordering::Relaxed),
                stats.corrected_words.load(Ordering::Relaxed),
                stats.uncorrectable_words.load(Ordering::Relaxed),
            );
            last_stats_report = Instant::now();
        }

        // Check if the capture thread is still running
        if !capture.is_running() {
            warn!("Bit capture stopped unexpectedly");
            break;
        }
    }

    // Cleanup
    capture.stop();

    // Close the writer and dump the session as the reference JSON array
    drop(record_tx);
    let session = writer_handle.await.unwrap_or_default();
    println!("{}", report::to_json_array(&session));

    info!("Shutdown complete. Frames processed: {}", frames_processed);
    Ok(())
}
