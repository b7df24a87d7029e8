//! Frame reporting boundary
//!
//! Turns completed frames into serializable records, keeping all string
//! and JSON concerns out of the decode path. Records are emitted as JSON
//! objects as frames arrive; [`to_json_array`] renders the whole session
//! in the reference format, a top-level array of quoted hex strings.

use serde::Serialize;

use crate::cir::TelemetryFrame;

/// One reported frame, ready for serialization
#[derive(Debug, Clone, Serialize)]
pub struct FrameRecord {
    pub device_id: String,
    pub timestamp_ms: u64,
    pub crc_ok: bool,
    pub length: usize,
    /// Reported bytes as lowercase hex, two digits per byte
    pub payload_hex: String,
    /// Error severity per decoded word, header word included
    pub word_errors: Vec<u8>,
    pub fec_errors: u32,
    /// Bits consumed by the decoder when the frame completed
    pub timestamp_bits: u64,
}

impl FrameRecord {
    pub fn from_frame(device_id: &str, frame: &TelemetryFrame) -> Self {
        Self {
            device_id: device_id.to_string(),
            timestamp_ms: chrono::Utc::now().timestamp_millis() as u64,
            crc_ok: frame.is_good(),
            length: frame.data.len(),
            payload_hex: frame.to_hex(),
            word_errors: frame.word_errors.iter().map(|e| e.as_u8()).collect(),
            fec_errors: frame.fec_errors,
            timestamp_bits: frame.timestamp_bits,
        }
    }
}

/// Render the session's frames in the reference encoding: a JSON array of
/// hex strings, one per reported frame.
pub fn to_json_array(records: &[FrameRecord]) -> String {
    let payloads: Vec<&str> = records.iter().map(|r| r.payload_hex.as_str()).collect();
    serde_json::to_string(&payloads).unwrap_or_else(|_| "[]".to_string())
}
