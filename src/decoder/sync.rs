//! Bit synchronization for the CIR air interface
//!
//! Frames start with a 51-bit alternating bit-sync preamble followed by the
//! frame-sync word. The detector keeps the last 64 received bits in a
//! rolling window and compares the two halves against the expected
//! patterns, tolerating a tunable number of bit errors in each.

use tracing::debug;

/// Alternating bit-sync pattern occupying the upper window half
pub const PREAMBLE_PATTERN: u32 = 0x55555555;

/// Frame-sync word occupying the lower window half
pub const FRAME_SYNC_PATTERN: u32 = 0x0DD4259F;

/// Error budgets for declaring sync lock.
///
/// These are hand-tuned noise-tolerance values, not protocol requirements;
/// the defaults reproduce the field-proven behavior.
#[derive(Debug, Clone, Copy)]
pub struct SyncThresholds {
    /// Lock when preamble + frame-sync errors stay within this total
    pub combined_limit: u32,
    /// Alternate clause: preamble errors within this limit...
    pub preamble_limit: u32,
    /// ...and frame-sync errors within this one
    pub frame_sync_limit: u32,
    /// Report (but do not lock on) totals within this band
    pub near_miss_limit: u32,
}

impl Default for SyncThresholds {
    fn default() -> Self {
        Self {
            combined_limit: 4,
            preamble_limit: 6,
            frame_sync_limit: 2,
            near_miss_limit: 10,
        }
    }
}

/// Result of feeding one bit while searching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// Patterns matched within tolerance; codeword collection starts
    Lock(SyncLock),
    /// Close to the patterns but outside the lock criterion
    NearMiss {
        preamble_errors: u32,
        frame_sync_errors: u32,
    },
}

/// Residual bit errors at the moment of lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncLock {
    pub preamble_errors: u32,
    pub frame_sync_errors: u32,
}

/// Rolling-window sync detector.
///
/// The window holds exactly the last 64 received bits as two u32 halves,
/// most recent bit in the low-order position of the low half.
#[derive(Debug, Clone)]
pub struct SyncDetector {
    window: [u32; 2],
    thresholds: SyncThresholds,
}

impl SyncDetector {
    pub fn new(thresholds: SyncThresholds) -> Self {
        Self {
            window: [0, 0],
            thresholds,
        }
    }

    /// Shift one bit into the window and test for lock.
    ///
    /// On lock the window is cleared so stale frame bits cannot re-trigger
    /// once the caller returns to searching.
    pub fn feed_bit(&mut self, bit: u8) -> Option<SyncEvent> {
        self.window[1] = (self.window[1] << 1) | (self.window[0] >> 31);
        self.window[0] = (self.window[0] << 1) | (bit & 1) as u32;

        let preamble_errors = (self.window[1] ^ PREAMBLE_PATTERN).count_ones();
        let frame_sync_errors = (self.window[0] ^ FRAME_SYNC_PATTERN).count_ones();
        let total = preamble_errors + frame_sync_errors;

        if total <= self.thresholds.combined_limit
            || (preamble_errors <= self.thresholds.preamble_limit
                && frame_sync_errors <= self.thresholds.frame_sync_limit)
        {
            debug!(
                "sync lock, errors {} {}",
                preamble_errors, frame_sync_errors
            );
            self.window = [0, 0];
            Some(SyncEvent::Lock(SyncLock {
                preamble_errors,
                frame_sync_errors,
            }))
        } else if total <= self.thresholds.near_miss_limit {
            debug!(
                "sync near miss, errors {} {} window {:08x} {:08x}",
                preamble_errors, frame_sync_errors, self.window[1], self.window[0]
            );
            Some(SyncEvent::NearMiss {
                preamble_errors,
                frame_sync_errors,
            })
        } else {
            None
        }
    }

    /// Clear the window without touching the thresholds
    pub fn reset(&mut self) {
        self.window = [0, 0];
    }
}

impl Default for SyncDetector {
    fn default() -> Self {
        Self::new(SyncThresholds::default())
    }
}
