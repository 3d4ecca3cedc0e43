//! The race simulation engine: owns per-heat state, advances every entrant
//! one fixed-size time step per `tick()`, and finalizes a ranked result
//! with tie resolution.
//!
//! One engine instance consumes one [`Round`]. The instance is driven
//! externally tick-by-tick; it is agnostic to how often or how fast it is
//! driven and never reads a clock. Elapsed time is simulated time
//! (tick count x [`TICK_SECONDS`]), which is what ranking is built on.

use thiserror::Error;

use crate::digest::{Fnv1a64, canonicalize_f64};
use crate::rng::SeededRng;
use crate::roster::Horse;
use crate::schedule::Round;
use crate::{
    BASE_CONDITION, BASE_SPEED, BELOW_AVERAGE_STAMINA_MIN, BELOW_AVERAGE_STAMINA_PENALTY,
    CONDITION_MAX, CONDITION_SPEED_FACTOR, DAILY_FORM_RANGE, ELITE_STAMINA_BOOST,
    ELITE_STAMINA_MIN, FINISH_TIE_EPSILON_SECONDS, GOOD_STAMINA_MIN, HorseId, LOW_STAMINA_PENALTY,
    Lane, MIN_DAILY_FORM, MIN_START_BURST, MIN_VARIATION, STAMINA_ACTIVATION_PERCENT,
    START_BURST_DURATION_PERCENT, START_BURST_RANGE, TICK_SECONDS, Tick, VARIATION_RANGE,
    VERY_GOOD_STAMINA_BOOST, VERY_GOOD_STAMINA_MIN,
};

/// Engine usage-contract violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RaceError {
    #[error("results requested before every entrant finished ({finished}/{total})")]
    NotComplete { finished: usize, total: usize },
}

/// Per-entrant progress snapshot. `finish_rank` is present only once the
/// entrant has actually finished; it is cached incrementally at the finish
/// tick, never re-derived by sorting.
#[derive(Debug, Clone, PartialEq)]
pub struct HorseProgress {
    pub horse_id: HorseId,
    pub lane: Lane,
    /// Percentage of the round distance covered, clamped to [0, 100].
    pub progress: f64,
    pub finish_rank: Option<u32>,
}

/// One ranked entry of a finished heat.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingEntry {
    pub position: u32,
    pub horse: Horse,
    pub lane: Lane,
    /// Elapsed simulated time in seconds.
    pub time_seconds: f64,
}

/// Final ranked result of a heat. Produced exactly once, when the engine
/// completes; immutable afterward.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceResult {
    pub round_number: u32,
    pub distance: u32,
    pub rankings: Vec<RankingEntry>,
}

/// Per-entrant mutable simulation state.
#[derive(Debug, Clone)]
struct Entrant {
    horse: Horse,
    lane: Lane,
    /// Cumulative distance covered; monotonically non-decreasing, pinned
    /// to exactly the round distance once finished.
    distance: f64,
    /// Fixed for the whole heat, drawn at construction.
    daily_form: f64,
    /// Fixed for the whole heat, active only in the first 20% of distance.
    start_burst: f64,
    finished: bool,
    finish_time_seconds: Option<f64>,
    finish_rank: Option<u32>,
}

/// The per-heat race engine.
///
/// State machine: constructed ready for ticking, `running` until the last
/// entrant finishes, then `complete`. There is no cancellation state; a
/// caller stops ticking and drops the instance. `tick()` is a synchronous,
/// total state transition over exclusively owned state.
#[derive(Debug, Clone)]
pub struct RaceSimulation {
    round_number: u32,
    distance: u32,
    rng: SeededRng,
    entrants: Vec<Entrant>,
    tick_count: Tick,
    finished_count: usize,
}

impl RaceSimulation {
    /// Build an engine for a round. Draws two per-entrant constants from
    /// the shared generator in heat-participant order, daily form first,
    /// then start burst, so the constants are fully determined by
    /// (seed, heat composition, heat order).
    pub fn new(round: &Round, seed: u64) -> Self {
        let mut rng = SeededRng::new(seed);

        let entrants = round
            .lanes()
            .iter()
            .map(|assignment| {
                let daily_form = MIN_DAILY_FORM + rng.next_f64() * DAILY_FORM_RANGE;
                let start_burst = MIN_START_BURST + rng.next_f64() * START_BURST_RANGE;
                Entrant {
                    horse: assignment.horse.clone(),
                    lane: assignment.lane,
                    distance: 0.0,
                    daily_form,
                    start_burst,
                    finished: false,
                    finish_time_seconds: None,
                    finish_rank: None,
                }
            })
            .collect();

        Self {
            round_number: round.round_number(),
            distance: round.distance(),
            rng,
            entrants,
            tick_count: 0,
            finished_count: 0,
        }
    }

    /// Ticks processed so far.
    pub fn tick_count(&self) -> Tick {
        self.tick_count
    }

    /// Advance every not-yet-finished entrant by one fixed time step.
    ///
    /// Consumes exactly one RNG draw per unfinished entrant, in heat
    /// order; finished entrants consume none and never change again.
    pub fn tick(&mut self) {
        self.tick_count += 1;
        let elapsed_seconds = self.tick_count as f64 * TICK_SECONDS;
        let round_distance = f64::from(self.distance);

        for i in 0..self.entrants.len() {
            if self.entrants[i].finished {
                continue;
            }

            let race_progress = self.entrants[i].distance / round_distance * 100.0;
            let speed = self.instantaneous_speed(i, race_progress);
            let new_distance = self.entrants[i].distance + speed * TICK_SECONDS;

            let entrant = &mut self.entrants[i];
            if new_distance >= round_distance {
                entrant.distance = round_distance;
                entrant.finished = true;
                entrant.finish_time_seconds = Some(elapsed_seconds);
                self.finished_count += 1;
                // Same-tick finishers rank in heat-participant order.
                entrant.finish_rank = Some(self.finished_count as u32);
            } else {
                entrant.distance = new_distance;
            }
        }
    }

    /// The closed-form multiplicative speed model, evaluated fresh every
    /// tick. Consumes one draw for the per-tick variation.
    fn instantaneous_speed(&mut self, index: usize, race_progress: f64) -> f64 {
        let entrant = &self.entrants[index];
        let condition = entrant.horse.condition;

        let condition_factor =
            1.0 + ((f64::from(condition) - BASE_CONDITION) / f64::from(CONDITION_MAX))
                * CONDITION_SPEED_FACTOR;
        let daily_form = entrant.daily_form;
        let burst_factor = if race_progress <= START_BURST_DURATION_PERCENT {
            entrant.start_burst
        } else {
            1.0
        };
        let stamina = stamina_effect(condition, race_progress);
        let variation = MIN_VARIATION + self.rng.next_f64() * VARIATION_RANGE;

        BASE_SPEED * condition_factor * daily_form * burst_factor * variation * stamina
    }

    /// Side-effect-free progress snapshot, cheap enough to take every
    /// tick: no sorting, finish ranks come from the incremental cache.
    pub fn get_progress(&self) -> Vec<HorseProgress> {
        let round_distance = f64::from(self.distance);
        self.entrants
            .iter()
            .map(|entrant| HorseProgress {
                horse_id: entrant.horse.id,
                lane: entrant.lane,
                progress: (entrant.distance / round_distance * 100.0).min(100.0),
                finish_rank: entrant.finish_rank,
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.finished_count == self.entrants.len()
    }

    /// Final ranked result. Fails fast before completion; never returns a
    /// partial or fabricated ranking.
    pub fn results(&self) -> Result<RaceResult, RaceError> {
        if !self.is_complete() {
            return Err(RaceError::NotComplete {
                finished: self.finished_count,
                total: self.entrants.len(),
            });
        }

        let entries = self
            .entrants
            .iter()
            .map(|entrant| RankingEntry {
                position: 0, // assigned by rank_finishes
                horse: entrant.horse.clone(),
                lane: entrant.lane,
                // Invariant: every entrant of a complete heat has a time.
                time_seconds: entrant.finish_time_seconds.unwrap_or(f64::INFINITY),
            })
            .collect();

        Ok(RaceResult {
            round_number: self.round_number,
            distance: self.distance,
            rankings: rank_finishes(entries),
        })
    }

    /// Digest over the engine's observable state: tick count and, per
    /// entrant in heat order, id, canonicalized distance, finished flag,
    /// canonicalized finish time, and finish rank.
    pub fn state_digest(&self) -> u64 {
        let mut hasher = Fnv1a64::new();
        hasher.update(&self.tick_count.to_le_bytes());

        for entrant in &self.entrants {
            hasher.update(&entrant.horse.id.to_le_bytes());
            hasher.update(&canonicalize_f64(entrant.distance).to_le_bytes());
            hasher.update(&[u8::from(entrant.finished)]);
            hasher.update(&canonicalize_f64(entrant.finish_time_seconds.unwrap_or(0.0)).to_le_bytes());
            hasher.update(&entrant.finish_rank.unwrap_or(0).to_le_bytes());
        }

        hasher.finish()
    }
}

/// Condition-banded, progress-dependent stamina multiplier. Exactly 1.0
/// before the race midpoint; past it, high-condition entrants sprint and
/// low-condition entrants fade, scaling linearly to the finish line.
fn stamina_effect(condition: u32, race_progress: f64) -> f64 {
    if race_progress < STAMINA_ACTIVATION_PERCENT {
        return 1.0;
    }

    // 0.0 at the midpoint, 1.0 at the finish.
    let t = (race_progress - STAMINA_ACTIVATION_PERCENT) / (100.0 - STAMINA_ACTIVATION_PERCENT);

    if condition >= ELITE_STAMINA_MIN {
        1.0 + t * ELITE_STAMINA_BOOST
    } else if condition >= VERY_GOOD_STAMINA_MIN {
        1.0 + t * VERY_GOOD_STAMINA_BOOST
    } else if condition >= GOOD_STAMINA_MIN {
        1.0
    } else if condition >= BELOW_AVERAGE_STAMINA_MIN {
        1.0 - t * BELOW_AVERAGE_STAMINA_PENALTY
    } else {
        1.0 - t * LOW_STAMINA_PENALTY
    }
}

/// Sort entries by elapsed time ascending, breaking exact ties by lane
/// ascending, then assign positions 1..N and collapse near-equal
/// neighbors: an entry within [`FINISH_TIE_EPSILON_SECONDS`] of its
/// predecessor shares the predecessor's position. Only the immediate
/// neighbor is compared; a chain of near-equal times collapses onto one
/// position even when its endpoints differ by more than the epsilon.
/// That is the normative behavior, not full competition ranking.
fn rank_finishes(mut entries: Vec<RankingEntry>) -> Vec<RankingEntry> {
    entries.sort_by(|a, b| {
        a.time_seconds
            .total_cmp(&b.time_seconds)
            .then_with(|| a.lane.cmp(&b.lane))
    });

    for (i, entry) in entries.iter_mut().enumerate() {
        entry.position = i as u32 + 1;
    }

    for i in 1..entries.len() {
        if (entries[i].time_seconds - entries[i - 1].time_seconds).abs()
            < FINISH_TIE_EPSILON_SECONDS
        {
            entries[i].position = entries[i - 1].position;
        }
    }

    entries
}

// ============================================================================
// Tests
// ============================================================================
