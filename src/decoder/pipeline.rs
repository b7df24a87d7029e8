//! CIR frame decoding pipeline
//!
//! Basic wireless data frame, per TB/T 3052:
//!
//! | bit sync (51 bit) | frame sync (31 bit) | mode word (8 bit) | length = n (8 bit) | ..payload.. | crc16 (16 bit) |
//!   101010101...101         0x0DD4259F
//!                                           |<------------- protected by BCH(26,16) ------------------------------>|
//!                                           |<-        every 16 data bits are followed by 10 FEC bits            ->|
//!
//! One [`CirDecoder`] owns the whole per-channel state and is driven one
//! demodulated bit at a time. Codewords are collected 26 bits at a time
//! after lock; the first decoded word carries the mode byte and payload
//! length, and the frame completes when the padded payload plus the CRC
//! trailer have been buffered.

use tracing::{debug, trace};

use super::sync::{SyncDetector, SyncEvent, SyncThresholds};
use crate::cir::{bch, crc, required_buffer_len};
use crate::cir::{DecodeError, FrameStatus, Severity, TelemetryFrame};

/// Largest buffer any encodable frame can need: the 8-bit length field
/// maxes out at 255 payload bytes, padded to 256, plus the CRC trailer.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 258;

/// Decoder tuning knobs
#[derive(Debug, Clone, Copy)]
pub struct DecoderConfig {
    pub thresholds: SyncThresholds,
    /// Hard bound on the frame buffer; declared lengths needing more are
    /// rejected with [`DecodeError::FrameTooLong`]
    pub max_frame_bytes: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            thresholds: SyncThresholds::default(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Running decoder statistics
#[derive(Debug, Default)]
pub struct DecoderStats {
    pub bits_processed: u64,
    pub locks: u64,
    pub near_misses: u64,
    pub frames_decoded: u64,
    pub good_frames: u64,
    pub crc_errors: u64,
    pub corrected_words: u64,
    pub uncorrectable_words: u64,
    pub zero_length_discards: u64,
    pub oversize_rejects: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Hunting for the preamble + frame-sync patterns
    Searching,
    /// Locked; `bits` counts bits consumed since lock, the lock bit itself
    /// included as housekeeping
    Collecting { bits: u32 },
}

/// Per-channel CIR decoder: bit sync, codeword FEC, frame assembly and CRC
/// validation behind a single `feed_bit` entry point.
pub struct CirDecoder {
    sync: SyncDetector,
    phase: Phase,
    accumulator: u32,
    frame_buf: Vec<u8>,
    word_errors: Vec<Severity>,
    /// Payload length from the header word's low byte; 0 while unknown
    expected_length: usize,
    fec_errors: u32,
    max_frame_bytes: usize,
    total_bits: u64,
    pub stats: DecoderStats,
}

impl CirDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            sync: SyncDetector::new(config.thresholds),
            phase: Phase::Searching,
            accumulator: 0,
            frame_buf: Vec::with_capacity(config.max_frame_bytes),
            word_errors: Vec::new(),
            expected_length: 0,
            fec_errors: 0,
            max_frame_bytes: config.max_frame_bytes,
            total_bits: 0,
            stats: DecoderStats::default(),
        }
    }

    /// Consume one demodulated bit.
    ///
    /// Returns a completed frame (good or CRC-failed) when one finishes on
    /// this bit. Never panics: malformed input is ordinary control flow and
    /// the decoder always ends up back in a consistent state, so a live bit
    /// stream can be fed indefinitely.
    pub fn feed_bit(&mut self, bit: u8) -> Result<Option<TelemetryFrame>, DecodeError> {
        self.total_bits += 1;
        self.stats.bits_processed += 1;

        match self.phase {
            Phase::Searching => {
                match self.sync.feed_bit(bit) {
                    Some(SyncEvent::Lock(_)) => {
                        self.stats.locks += 1;
                        self.begin_frame();
                    }
                    Some(SyncEvent::NearMiss { .. }) => {
                        self.stats.near_misses += 1;
                    }
                    None => {}
                }
                Ok(None)
            }
            Phase::Collecting { bits } => {
                self.accumulator = (self.accumulator << 1) | (bit & 1) as u32;

                if bits % bch::CODEWORD_BITS == 0 {
                    let completed = self.complete_word()?;
                    if completed.is_some() || self.phase == Phase::Searching {
                        return Ok(completed);
                    }
                }

                if let Phase::Collecting { bits } = &mut self.phase {
                    *bits += 1;
                }
                Ok(None)
            }
        }
    }

    /// True while hunting for sync
    pub fn is_searching(&self) -> bool {
        self.phase == Phase::Searching
    }

    fn begin_frame(&mut self) {
        self.accumulator = 0;
        self.frame_buf.clear();
        self.word_errors.clear();
        self.expected_length = 0;
        self.fec_errors = 0;
        self.phase = Phase::Collecting { bits: 1 };
    }

    fn reset_to_search(&mut self) {
        self.accumulator = 0;
        self.frame_buf.clear();
        self.word_errors.clear();
        self.expected_length = 0;
        self.fec_errors = 0;
        self.phase = Phase::Searching;
    }

    /// A full 26-bit codeword has been accumulated: run FEC, store the
    /// word, and act on header/completion boundaries.
    fn complete_word(&mut self) -> Result<Option<TelemetryFrame>, DecodeError> {
        let raw = self.accumulator;
        self.accumulator = 0;

        let (mut value, severity) = bch::decode(raw);
        trace!(
            "word {:02} 0x{:04x} -> 0x{:04x} errors {}",
            self.word_errors.len(),
            raw >> bch::PARITY_BITS,
            value,
            severity.as_u8()
        );

        match severity {
            Severity::Clean => {}
            Severity::SingleCorrected | Severity::DoubleCorrected => {
                self.stats.corrected_words += 1;
            }
            Severity::Uncorrectable => {
                // Beyond the correction capability: keep the raw bits and
                // let the trailing CRC decide the frame's fate
                self.stats.uncorrectable_words += 1;
                self.fec_errors += 1;
                value = (raw >> bch::PARITY_BITS) as u16;
            }
        }

        self.frame_buf.extend_from_slice(&value.to_be_bytes());
        self.word_errors.push(severity);

        if self.frame_buf.len() == 2 {
            // Header word: mode in the high byte, payload length in the low
            let length = (value & 0xFF) as usize;
            if length == 0 {
                debug!("zero length header, discarding frame");
                self.stats.zero_length_discards += 1;
                self.reset_to_search();
                return Ok(None);
            }

            let required = required_buffer_len(length);
            if required > self.max_frame_bytes {
                self.stats.oversize_rejects += 1;
                self.reset_to_search();
                return Err(DecodeError::FrameTooLong {
                    declared: length,
                    required,
                    capacity: self.max_frame_bytes,
                });
            }

            self.expected_length = length;
            debug!("frame length {}", length);
            Ok(None)
        } else if self.frame_buf.len() == required_buffer_len(self.expected_length) {
            Ok(Some(self.finish_frame()))
        } else {
            Ok(None)
        }
    }

    /// Buffer is complete: validate the CRC trailer and emit the frame.
    fn finish_frame(&mut self) -> TelemetryFrame {
        self.stats.frames_decoded += 1;

        let n = self.expected_length;
        let frame = if crc::check_trailer(&self.frame_buf, n) {
            self.stats.good_frames += 1;
            TelemetryFrame {
                status: FrameStatus::Good,
                data: self.frame_buf[..n].to_vec(),
                word_errors: self.word_errors.clone(),
                fec_errors: self.fec_errors,
                timestamp_bits: self.total_bits,
            }
        } else {
            self.stats.crc_errors += 1;
            debug!("bad crc");
            TelemetryFrame {
                status: FrameStatus::BadCrc,
                data: self.frame_buf.clone(),
                word_errors: self.word_errors.clone(),
                fec_errors: self.fec_errors,
                timestamp_bits: self.total_bits,
            }
        };

        self.reset_to_search();
        frame
    }
}

impl Default for CirDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cir::bch::CHECK_MATRIX;
    use crate::decoder::sync::FRAME_SYNC_PATTERN;

    /// 51 alternating bit-sync bits, starting and ending on 1, so the last
    /// 32 of them line up with the preamble pattern
    fn preamble_bits() -> Vec<u8> {
        (0..51).map(|i| (i % 2 == 0) as u8).collect()
    }

    /// The `n` low bits of `word`, most significant first
    fn word_bits(word: u32, n: u32) -> Vec<u8> {
        (0..n).rev().map(|i| ((word >> i) & 1) as u8).collect()
    }

    /// Bit stream for one complete frame from 16-bit words (header,
    /// payload..., crc), each protected by the block code
    fn frame_bits(words: &[u16]) -> Vec<u8> {
        let mut bits = preamble_bits();
        bits.extend(word_bits(FRAME_SYNC_PATTERN, 32));
        for &w in words {
            bits.extend(word_bits(bch::encode(w), bch::CODEWORD_BITS));
        }
        bits
    }

    fn feed(decoder: &mut CirDecoder, bits: &[u8]) -> Vec<TelemetryFrame> {
        let mut frames = Vec::new();
        for &bit in bits {
            if let Ok(Some(frame)) = decoder.feed_bit(bit) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Header 0x0104 (mode 1, length 4), one data word, matching trailer
    fn good_frame_words() -> Vec<u16> {
        let header = 0x0104u16;
        let data = 0xCAFEu16;
        let crc = crc::crc16(&[0x01, 0x04, 0xCA, 0xFE]);
        vec![header, data, crc]
    }

    #[test]
    fn test_good_frame_end_to_end() {
        let mut decoder = CirDecoder::default();
        let frames = feed(&mut decoder, &frame_bits(&good_frame_words()));

        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.status, FrameStatus::Good);
        assert_eq!(frame.data, vec![0x01, 0x04, 0xCA, 0xFE]);
        assert_eq!(frame.word_errors, vec![Severity::Clean; 3]);
        assert_eq!(frame.fec_errors, 0);

        assert!(decoder.is_searching());
        assert_eq!(decoder.stats.locks, 1);
        assert_eq!(decoder.stats.good_frames, 1);
        assert_eq!(decoder.stats.crc_errors, 0);
    }

    #[test]
    fn test_corrupted_trailer_reports_bad_frame() {
        let mut words = good_frame_words();
        words[2] ^= 0x0001; // trailer word no longer matches the payload
        let mut decoder = CirDecoder::default();
        let frames = feed(&mut decoder, &frame_bits(&words));

        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.status, FrameStatus::BadCrc);
        // Bad frames carry the whole buffer: padded payload plus trailer
        assert_eq!(frame.data.len(), 6);
        assert_eq!(frame.data[..4], [0x01, 0x04, 0xCA, 0xFE]);
        assert_eq!(frame.word_errors.len(), 3);
        assert_eq!(decoder.stats.crc_errors, 1);
        assert_eq!(decoder.stats.good_frames, 0);
    }

    #[test]
    fn test_odd_length_padding() {
        // length 3: the trailer follows the payload immediately, so it
        // straddles the word boundary and the pad byte comes last
        let header = 0x0203u16;
        let crc = crc::crc16(&[0x02, 0x03, 0xAB]);
        let data = 0xAB00 | (crc >> 8);
        let trailer = crc << 8;
        let mut decoder = CirDecoder::default();
        let frames = feed(&mut decoder, &frame_bits(&[header, data, trailer]));

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].status, FrameStatus::Good);
        assert_eq!(frames[0].data, vec![0x02, 0x03, 0xAB]);
    }

    #[test]
    fn test_single_bit_error_in_payload_corrected() {
        let mut bits = frame_bits(&good_frame_words());
        // Flip one bit inside the payload codeword (after 51 + 32 + 26
        // preamble, sync and header bits)
        bits[51 + 32 + 26 + 7] ^= 1;

        let mut decoder = CirDecoder::default();
        let frames = feed(&mut decoder, &bits);

        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.status, FrameStatus::Good);
        assert_eq!(frame.data, vec![0x01, 0x04, 0xCA, 0xFE]);
        assert_eq!(frame.word_errors[1], Severity::SingleCorrected);
        assert_eq!(decoder.stats.corrected_words, 1);
    }

    #[test]
    fn test_uncorrectable_word_keeps_raw_bits() {
        // Find a triple of error positions whose syndrome matches no
        // correctable pattern, so the payload word comes through raw
        let mut correctable: std::collections::HashSet<u32> =
            CHECK_MATRIX.iter().copied().collect();
        for i in 0..26 {
            for j in (i + 1)..26 {
                correctable.insert(CHECK_MATRIX[i] ^ CHECK_MATRIX[j]);
            }
        }
        let (a, b, c) = (0..26)
            .flat_map(|a| (a + 1..26).flat_map(move |b| (b + 1..26).map(move |c| (a, b, c))))
            .find(|&(a, b, c)| {
                let s = CHECK_MATRIX[a] ^ CHECK_MATRIX[b] ^ CHECK_MATRIX[c];
                // a < 16 guarantees a data bit flips, so the CRC must fail
                a < 16 && s != 0 && !correctable.contains(&s)
            })
            .expect("code must detect some triple error");

        let mut bits = frame_bits(&good_frame_words());
        let payload_start = 51 + 32 + 26;
        for idx in [a, b, c] {
            bits[payload_start + idx] ^= 1;
        }

        let mut decoder = CirDecoder::default();
        let frames = feed(&mut decoder, &bits);

        // The frame is not discarded early; the mangled payload fails CRC
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.status, FrameStatus::BadCrc);
        assert_eq!(frame.word_errors[1], Severity::Uncorrectable);
        assert_eq!(frame.fec_errors, 1);
        assert_eq!(decoder.stats.uncorrectable_words, 1);
    }

    #[test]
    fn test_zero_length_discards_and_resyncs() {
        let mut decoder = CirDecoder::default();

        // Header with length 0: frame dropped without an event
        let mut bits = preamble_bits();
        bits.extend(word_bits(FRAME_SYNC_PATTERN, 32));
        bits.extend(word_bits(bch::encode(0x0500), bch::CODEWORD_BITS));
        assert!(feed(&mut decoder, &bits).is_empty());
        assert!(decoder.is_searching());
        assert_eq!(decoder.stats.zero_length_discards, 1);

        // A fresh frame right after decodes cleanly
        let frames = feed(&mut decoder, &frame_bits(&good_frame_words()));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].status, FrameStatus::Good);
    }

    #[test]
    fn test_resynchronization_between_frames() {
        let mut decoder = CirDecoder::default();

        let first = feed(&mut decoder, &frame_bits(&good_frame_words()));
        assert_eq!(first.len(), 1);

        // Second, independent frame with different content
        let header = 0x7F02u16;
        let data = 0x1234u16;
        let crc = crc::crc16(&[0x7F, 0x02]);
        let second = feed(&mut decoder, &frame_bits(&[header, data, crc]));

        assert_eq!(second.len(), 1);
        let frame = &second[0];
        assert_eq!(frame.status, FrameStatus::Good);
        assert_eq!(frame.data, vec![0x7F, 0x02]);
        assert_eq!(frame.word_errors.len(), 3);
        assert_eq!(decoder.stats.locks, 2);
        assert_eq!(decoder.stats.good_frames, 2);
    }

    #[test]
    fn test_oversize_length_rejected() {
        let config = DecoderConfig {
            max_frame_bytes: 16,
            ..DecoderConfig::default()
        };
        let mut decoder = CirDecoder::new(config);

        // Declared length 20 needs 22 buffer bytes, over the 16-byte bound
        let mut bits = preamble_bits();
        bits.extend(word_bits(FRAME_SYNC_PATTERN, 32));
        bits.extend(word_bits(bch::encode(0x0114), bch::CODEWORD_BITS));

        let mut rejected = None;
        for &bit in &bits {
            if let Err(e) = decoder.feed_bit(bit) {
                rejected = Some(e);
            }
        }
        assert_eq!(
            rejected,
            Some(DecodeError::FrameTooLong {
                declared: 20,
                required: 22,
                capacity: 16,
            })
        );
        assert!(decoder.is_searching());
        assert_eq!(decoder.stats.oversize_rejects, 1);

        // The decoder keeps running after the rejection
        let frames = feed(&mut decoder, &frame_bits(&good_frame_words()));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].status, FrameStatus::Good);
    }

    #[test]
    fn test_noisy_sync_within_tolerance_locks() {
        let mut bits = frame_bits(&good_frame_words());
        // Two errors in the preamble half, two in the frame-sync word:
        // exactly on the combined lock limit
        bits[20] ^= 1;
        bits[30] ^= 1;
        bits[51 + 3] ^= 1;
        bits[51 + 20] ^= 1;

        let mut decoder = CirDecoder::default();
        let frames = feed(&mut decoder, &bits);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].status, FrameStatus::Good);
    }
}
