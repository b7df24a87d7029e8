//! Configuration loaded from environment variables

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Demodulator executable path
    pub demod_path: String,

    /// Audio input handed to the demodulator; "-" reads its stdin
    pub audio_input: String,

    /// Audio sample rate in Hz
    pub sample_rate: u32,

    /// Device ID string for identification
    pub device_id: String,

    /// Hard bound on the decoder's frame buffer in bytes
    pub max_frame_bytes: usize,

    /// Statistics reporting interval in milliseconds
    pub stats_interval_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            demod_path: std::env::var("CIR_DEMOD_PATH")
                .unwrap_or_else(|_| "cir_demod".to_string()),

            audio_input: std::env::var("CIR_AUDIO_INPUT")
                .unwrap_or_else(|_| "-".to_string()),

            sample_rate: std::env::var("CIR_SAMPLE_RATE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8_000),

            device_id: std::env::var("DEVICE_ID")
                .unwrap_or_else(|_| "CIR-0".to_string()),

            max_frame_bytes: std::env::var("CIR_MAX_FRAME_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(crate::decoder::DEFAULT_MAX_FRAME_BYTES),

            stats_interval_ms: std::env::var("STATS_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5_000),
        }
    }
}
