//! CIR frame data types

use super::bch::Severity;
use thiserror::Error;

/// Outcome of the trailing CRC check on a completed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// CRC trailer matched; payload is trustworthy
    Good,
    /// CRC trailer mismatched; payload reported as received
    BadCrc,
}

/// One completed telemetry frame, good or corrupt.
#[derive(Debug, Clone)]
pub struct TelemetryFrame {
    pub status: FrameStatus,
    /// Good frames carry the payload bytes only (mode word, length and
    /// data); corrupt frames carry the whole received buffer including the
    /// padded payload and CRC trailer.
    pub data: Vec<u8>,
    /// Error severity per decoded 16-bit word, header word included
    pub word_errors: Vec<Severity>,
    /// Codewords in this frame that exceeded the correction capability
    pub fec_errors: u32,
    /// Total bits consumed by the decoder when the frame completed
    pub timestamp_bits: u64,
}

impl TelemetryFrame {
    pub fn is_good(&self) -> bool {
        self.status == FrameStatus::Good
    }

    /// Payload as lowercase hex (like the verbose packet dump output)
    pub fn to_hex(&self) -> String {
        hex::encode(&self.data)
    }

    /// Diagnostic dump of a corrupt frame: one `xxxx-e` group per decoded
    /// word, where `e` is that word's error severity.
    pub fn word_dump(&self) -> String {
        self.data
            .chunks(2)
            .zip(self.word_errors.iter())
            .map(|(pair, err)| match pair {
                [hi, lo] => format!("{:02x}{:02x}-{}", hi, lo, err.as_u8()),
                _ => format!("{:02x}-{}", pair[0], err.as_u8()),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Decode failures surfaced to the caller of `feed_bit`.
///
/// These are ordinary control flow: the decoder resets itself to the
/// searching state before returning, so the bit stream keeps flowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("declared frame length {declared} needs {required} buffer bytes, capacity is {capacity}")]
    FrameTooLong {
        declared: usize,
        required: usize,
        capacity: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_dump() {
        let frame = TelemetryFrame {
            status: FrameStatus::BadCrc,
            data: vec![0x01, 0x04, 0xCA, 0xFE, 0x12, 0x34],
            word_errors: vec![
                Severity::Clean,
                Severity::Uncorrectable,
                Severity::SingleCorrected,
            ],
            fec_errors: 1,
            timestamp_bits: 161,
        };
        assert_eq!(frame.word_dump(), "0104-0 cafe-3 1234-1");
        assert_eq!(frame.to_hex(), "0104cafe1234");
        assert!(!frame.is_good());
    }
}
