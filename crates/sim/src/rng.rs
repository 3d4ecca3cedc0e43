//! Mulberry32 seeded PRNG plus the two derived utilities the generators
//! and the race engine consume: bounded integer draws and Fisher-Yates
//! shuffling.
//!
//! Everything downstream (roster, schedule, per-tick speed variation) is a
//! pure function of a seed and a draw count, so determinism of this module
//! is the determinism of the whole core.

/// RNG algorithm identifier recorded in race record artifacts.
pub const RNG_ALGO_ID: &str = "mulberry32";

/// Mulberry32 state advance constant (fixed odd increment).
const STATE_INCREMENT: u32 = 0x6D2B_79F5;

/// Seeded pseudo-random number generator (Mulberry32).
///
/// 32-bit integer state, advanced by a fixed odd constant per draw, then
/// mixed through two xor-shift/multiply rounds and normalized to [0, 1) by
/// dividing by 2^32. Same seed produces the identical unbounded sequence,
/// including across independent instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeededRng {
    state: u32,
}

impl SeededRng {
    /// Create a generator from a seed. Only the low 32 bits of the seed
    /// participate in the state.
    pub fn new(seed: u64) -> Self {
        Self { state: seed as u32 }
    }

    /// Next value in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        self.state = self.state.wrapping_add(STATE_INCREMENT);
        let s = self.state;
        let mut t = (s ^ (s >> 15)).wrapping_mul(s | 1);
        t = t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61)) ^ t;
        f64::from(t ^ (t >> 14)) / 4_294_967_296.0
    }

    /// Uniform integer in [min, max] inclusive. Consumes one draw.
    ///
    /// # Panics
    /// If `min > max` (input-contract violation; all call sites pass fixed
    /// constant bounds).
    pub fn next_int(&mut self, min: u32, max: u32) -> u32 {
        assert!(min <= max, "next_int: min {min} > max {max}");
        let span = f64::from(max - min + 1);
        (self.next_f64() * span).floor() as u32 + min
    }

    /// Fisher-Yates shuffle into a fresh `Vec`, leaving the input
    /// unmodified. Consumes exactly `items.len() - 1` draws (zero for
    /// empty or single-element inputs), so the generator state after the
    /// call is itself deterministic.
    pub fn shuffle<T: Clone>(&mut self, items: &[T]) -> Vec<T> {
        let mut result = items.to_vec();
        for i in (1..result.len()).rev() {
            let j = (self.next_f64() * (i as f64 + 1.0)).floor() as usize;
            result.swap(i, j);
        }
        result
    }
}

// ============================================================================
// Tests
// ============================================================================
