//! Race state digest support.
//!
//! A cheap 64-bit digest over engine state anchors determinism checks:
//! two engines that took the same tick sequence from the same seed must
//! agree on every digest, and the replay verifier compares the recorded
//! final digest against a re-simulation.

/// Digest algorithm identifier recorded in race record artifacts.
pub const RACE_DIGEST_ALGO_ID: &str = "racedigest-v1-fnv1a64-le-f64canon-heatorder";

/// FNV-1a 64-bit offset basis.
const FNV1A_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
const FNV1A_PRIME: u64 = 0x100_0000_01b3;

/// FNV-1a 64-bit hasher.
#[derive(Debug, Clone)]
pub struct Fnv1a64 {
    state: u64,
}

impl Fnv1a64 {
    pub fn new() -> Self {
        Self {
            state: FNV1A_OFFSET_BASIS,
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV1A_PRIME);
        }
    }

    pub fn finish(self) -> u64 {
        self.state
    }
}

impl Default for Fnv1a64 {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonicalize an f64 for deterministic hashing.
///
/// Rules:
/// - `-0.0` → `+0.0`
/// - Any NaN → quiet NaN bit pattern `0x7ff8000000000000`
pub fn canonicalize_f64(value: f64) -> u64 {
    const QUIET_NAN_BITS: u64 = 0x7ff8_0000_0000_0000;

    if value.is_nan() {
        QUIET_NAN_BITS
    } else if value == 0.0 {
        // Both +0.0 and -0.0 compare equal to 0.0.
        0u64
    } else {
        value.to_bits()
    }
}

// ============================================================================
// Tests
// ============================================================================
