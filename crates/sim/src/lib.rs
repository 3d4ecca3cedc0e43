//! Derby Simulation Core
//!
//! This crate contains the deterministic, fixed-timestep race simulation:
//! seeded random generation, roster generation, schedule generation with
//! lane assignment, and the per-heat race engine that turns static horse
//! attributes into a reproducible ranked result.
//!
//! # Architecture Constraints
//!
//! The Simulation Core MUST NOT:
//! - Perform I/O operations (file, network, etc.)
//! - Read wall-clock time
//! - Use ambient/unseeded randomness
//! - Depend on frame rate or variable delta time
//!
//! Finish times are simulated time (tick count x tick duration), never
//! wall-clock time. The drive loop that decides when `tick()` is called
//! lives outside this crate (`derby-director`); the engine only guarantees
//! correctness given a sequence of tick calls and the fixed time unit.

#![deny(unsafe_code)]

pub mod digest;
pub mod race;
pub mod rng;
pub mod roster;
pub mod schedule;

pub use digest::{Fnv1a64, RACE_DIGEST_ALGO_ID, canonicalize_f64};
pub use race::{HorseProgress, RaceError, RaceResult, RaceSimulation, RankingEntry};
pub use rng::{RNG_ALGO_ID, SeededRng};
pub use roster::{Horse, RosterError, generate_horses, validate_roster};
pub use schedule::{LaneAssignment, Round, Schedule, ScheduleError, generate_schedule};

// ============================================================================
// Type Aliases
// ============================================================================

/// A single discrete simulation timestep; the atomic unit of race time.
pub type Tick = u64;

/// Stable per-session horse identifier, 1-based.
pub type HorseId = u32;

/// Starting lane within a heat, 1..=10.
pub type Lane = u8;

// ============================================================================
// Session Shape Constants
// ============================================================================

/// Roster size for a session.
pub const HORSES_TOTAL: usize = 20;

/// Number of rounds (heats) in a schedule.
pub const ROUNDS_TOTAL: usize = 6;

/// Entrants per full race round.
pub const HORSES_PER_ROUND: usize = 10;

/// Round distances in meters, in running order.
pub const ROUND_DISTANCES: [u32; ROUNDS_TOTAL] = [1200, 1400, 1600, 1800, 2000, 2200];

/// Condition rating bounds; the roster holds elite-tier horses only.
pub const CONDITION_MIN: u32 = 80;
pub const CONDITION_MAX: u32 = 100;

/// Lane priority order, swimming-style: strongest entrants in the center
/// lanes, weakest on the edges. Rank 0 gets lane 5, rank 1 gets lane 6, ...
pub const LANE_ORDER: [Lane; HORSES_PER_ROUND] = [5, 6, 4, 7, 3, 8, 2, 9, 1, 10];

// ============================================================================
// Tick / Speed Model Constants (Normative)
// ============================================================================

/// Logical tick duration in milliseconds of simulated time.
pub const TICK_MS: u64 = 100;

/// Logical tick duration in simulated seconds.
pub const TICK_SECONDS: f64 = TICK_MS as f64 / 1000.0;

/// Base speed in meters per simulated second.
pub const BASE_SPEED: f64 = 15.0;

/// Condition pivot for the condition speed factor.
pub const BASE_CONDITION: f64 = 90.0;

/// Weight of condition on speed.
pub const CONDITION_SPEED_FACTOR: f64 = 0.15;

/// Per-tick random variation bounds.
pub const MIN_VARIATION: f64 = 0.8;
pub const VARIATION_RANGE: f64 = 0.4;

/// Daily form bounds; drawn once per entrant per heat, applies whole race.
pub const MIN_DAILY_FORM: f64 = 0.95;
pub const DAILY_FORM_RANGE: f64 = 0.10;

/// Start burst bounds; drawn once per entrant per heat, active only while
/// race progress is within the first [`START_BURST_DURATION_PERCENT`].
pub const MIN_START_BURST: f64 = 0.92;
pub const START_BURST_RANGE: f64 = 0.16;
pub const START_BURST_DURATION_PERCENT: f64 = 20.0;

/// Race progress percentage past which the stamina effect engages.
pub const STAMINA_ACTIVATION_PERCENT: f64 = 50.0;

// Stamina condition bands.
pub const ELITE_STAMINA_MIN: u32 = 95;
pub const VERY_GOOD_STAMINA_MIN: u32 = 90;
pub const GOOD_STAMINA_MIN: u32 = 85;
pub const BELOW_AVERAGE_STAMINA_MIN: u32 = 82;

// Stamina effect magnitudes at 100% progress.
pub const ELITE_STAMINA_BOOST: f64 = 0.05;
pub const VERY_GOOD_STAMINA_BOOST: f64 = 0.02;
pub const BELOW_AVERAGE_STAMINA_PENALTY: f64 = 0.03;
pub const LOW_STAMINA_PENALTY: f64 = 0.10;

/// Finish times closer than this (simulated seconds) share a position.
pub const FINISH_TIE_EPSILON_SECONDS: f64 = 0.001;

// ============================================================================
// Seed Derivation Offsets
// ============================================================================

/// Schedule generation uses `session_seed + SCHEDULE_SEED_OFFSET` so the
/// schedule shuffles never correlate with the roster's condition draws.
pub const SCHEDULE_SEED_OFFSET: u64 = 1;

/// Round `i` (0-based) uses `session_seed + i + ROUND_SEED_OFFSET`.
pub const ROUND_SEED_OFFSET: u64 = 2;
