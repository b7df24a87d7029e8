//! Bit-level CIR decoding
//!
//! The decode chain, one demodulated bit at a time:
//! 1. Roll the bit through the 64-bit sync window until the preamble and
//!    frame-sync patterns match within tolerance
//! 2. After lock, collect 26-bit codewords and run BCH(26,16) correction
//! 3. Assemble 16-bit words into the frame buffer, header first
//! 4. Validate the CRC16 trailer and emit the frame

pub mod capture;
mod pipeline;
mod sync;

pub use capture::{BitCapture, CaptureStats, DemodConfig};
pub use pipeline::{CirDecoder, DecoderConfig, DecoderStats, DEFAULT_MAX_FRAME_BYTES};
pub use sync::{SyncDetector, SyncEvent, SyncLock, SyncThresholds};
pub use sync::{FRAME_SYNC_PATTERN, PREAMBLE_PATTERN};
