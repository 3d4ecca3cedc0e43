//! Derby Race Director
//!
//! The director owns a full race session on behalf of whatever front end
//! drives it. It holds:
//! - Roster and schedule generation with the session seed contract
//! - Phase guards (no mid-race regeneration, no double starts)
//! - The frame-paced drive loop over the race engine
//! - Progress snapshot encoding for broadcast
//! - Race record accumulation for later verification
//!
//! The race engine is invoked only through `tick()` and queried through
//! its accessors. All pacing, wiring, and recording live here, so the
//! engine itself stays free of clocks and I/O.
//!
//! # Seed contract
//!
//! Roster generation uses the session seed directly. The schedule shuffle
//! uses `seed + 1`. Round `i` (0-based) seeds its engine with
//! `seed + i + 2`. Offsets are applied with wrapping arithmetic so every
//! u64 is a valid session seed.

#![deny(unsafe_code)]

pub mod pacing;

use derby_replay::RaceRecorder;
use derby_sim::{
    HorseProgress, Horse, ROUND_SEED_OFFSET, ROUNDS_TOTAL, RaceError, RaceResult, RaceSimulation,
    Round, SCHEDULE_SEED_OFFSET, Schedule, ScheduleError, TICK_MS, Tick, generate_horses,
    generate_schedule,
};
use derby_wire::{RaceRecordProto, encode_progress_snapshot};
use pacing::FramePacer;
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// Defaults
// ============================================================================

/// Real-time tick spacing matching the logical tick, 1x playback.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = TICK_MS;

/// Per-frame tick batch cap.
pub const DEFAULT_MAX_TICKS_PER_FRAME: u32 = 100;

/// Defensive per-round tick bound. The longest round finishes in well
/// under 3000 ticks; hitting this means the engine is not converging.
pub const DEFAULT_MAX_TICKS_PER_ROUND: u64 = 100_000;

// ============================================================================
// Phase
// ============================================================================

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No schedule yet. A roster may or may not exist.
    Idle,
    /// Schedule in place, no round currently in flight.
    Generated,
    /// A round is being ticked.
    Running,
    /// All rounds have completed.
    Finished,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Generated => "generated",
            Self::Running => "running",
            Self::Finished => "finished",
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Director configuration.
#[derive(Debug, Clone)]
pub struct DirectorConfig {
    pub seed: u64,
    /// Real-time pacing only. Shrinking this accelerates playback without
    /// touching the 100 ms logical tick.
    pub tick_interval_ms: u64,
    pub max_ticks_per_frame: u32,
    pub max_ticks_per_round: u64,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            max_ticks_per_frame: DEFAULT_MAX_TICKS_PER_FRAME,
            max_ticks_per_round: DEFAULT_MAX_TICKS_PER_ROUND,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Guard violation or drive-loop failure. Never a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectorError {
    #[error("{operation} is not allowed while the session is {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: &'static str,
    },
    #[error("no roster has been generated")]
    NoRoster,
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("round {round_number} exceeded the defensive bound of {limit} ticks")]
    RoundBudgetExceeded { round_number: u32, limit: u64 },
    #[error(transparent)]
    Race(#[from] RaceError),
}

// ============================================================================
// Frame outcome
// ============================================================================

/// What one call to [`RaceDirector::step_frame`] produced.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    /// Logical ticks run this frame.
    pub ticks_run: u32,
    /// Engine tick count after the frame.
    pub tick: Tick,
    /// Per-entrant progress in heat order.
    pub progress: Vec<HorseProgress>,
    /// Encoded progress snapshot, identical for every observer of the frame.
    pub snapshot_bytes: Vec<u8>,
    /// Set on the frame whose final tick completed the round.
    pub result: Option<RaceResult>,
}

// ============================================================================
// Director
// ============================================================================

/// Owns one race session end to end.
pub struct RaceDirector {
    config: DirectorConfig,
    phase: Phase,
    roster: Vec<Horse>,
    schedule: Option<Schedule>,
    /// While Running, the index of the in-flight round. Otherwise the
    /// index of the next round to start.
    round_cursor: usize,
    active: Option<RaceSimulation>,
    pacer: FramePacer,
    recorder: RaceRecorder,
    results: Vec<RaceResult>,
}

impl RaceDirector {
    pub fn new(config: DirectorConfig) -> Self {
        let pacer = FramePacer::new(config.tick_interval_ms, config.max_ticks_per_frame);
        let recorder = RaceRecorder::new(config.seed);
        Self {
            phase: Phase::Idle,
            roster: Vec::new(),
            schedule: None,
            round_cursor: 0,
            active: None,
            pacer,
            recorder,
            results: Vec::new(),
            config,
        }
    }

    fn guard(&self, operation: &'static str, allowed: &[Phase]) -> Result<(), DirectorError> {
        if allowed.contains(&self.phase) {
            return Ok(());
        }
        let err = DirectorError::InvalidPhase {
            operation,
            phase: self.phase.as_str(),
        };
        warn!(operation, phase = self.phase.as_str(), "operation rejected");
        Err(err)
    }

    fn schedule_seed(&self) -> u64 {
        self.config.seed.wrapping_add(SCHEDULE_SEED_OFFSET)
    }

    fn round_seed(&self, index: usize) -> u64 {
        self.config
            .seed
            .wrapping_add(index as u64)
            .wrapping_add(ROUND_SEED_OFFSET)
    }

    /// Generate (or regenerate) the roster from the session seed.
    ///
    /// Rejected mid-race. Clears the schedule and any accumulated results,
    /// back to Idle.
    pub fn generate_roster(&mut self) -> Result<&[Horse], DirectorError> {
        self.guard("generate_roster", &[Phase::Idle, Phase::Generated, Phase::Finished])?;

        self.roster = generate_horses(self.config.seed);
        self.schedule = None;
        self.round_cursor = 0;
        self.active = None;
        self.results.clear();
        self.recorder = RaceRecorder::new(self.config.seed);
        self.recorder.record_roster(&self.roster);
        self.phase = Phase::Idle;

        Ok(&self.roster)
    }

    /// Generate (or regenerate) the six-round schedule.
    ///
    /// Rejected mid-race and without a roster. Wholesale replacement:
    /// the round cursor and results reset with it.
    pub fn generate_schedule(&mut self) -> Result<&Schedule, DirectorError> {
        self.guard(
            "generate_schedule",
            &[Phase::Idle, Phase::Generated, Phase::Finished],
        )?;
        if self.roster.is_empty() {
            warn!("generate_schedule rejected: no roster");
            return Err(DirectorError::NoRoster);
        }

        let schedule = generate_schedule(&self.roster, self.schedule_seed())?;
        self.round_cursor = 0;
        self.active = None;
        self.results.clear();
        self.recorder = RaceRecorder::new(self.config.seed);
        self.recorder.record_roster(&self.roster);
        self.phase = Phase::Generated;

        Ok(self.schedule.insert(schedule))
    }

    /// Arm the next round's engine.
    ///
    /// Returns the round number started, or `None` when every round has
    /// already run (the session flips to Finished).
    pub fn start_next_round(&mut self) -> Result<Option<u32>, DirectorError> {
        self.guard("start_next_round", &[Phase::Generated])?;
        let Some(schedule) = &self.schedule else {
            warn!("start_next_round rejected: no schedule");
            return Err(DirectorError::InvalidPhase {
                operation: "start_next_round",
                phase: self.phase.as_str(),
            });
        };

        if self.round_cursor >= ROUNDS_TOTAL {
            self.phase = Phase::Finished;
            return Ok(None);
        }

        let round = &schedule.rounds()[self.round_cursor];
        let seed = self.round_seed(self.round_cursor);
        debug!(
            round_number = round.round_number(),
            distance = round.distance(),
            "round armed"
        );
        self.active = Some(RaceSimulation::new(round, seed));
        self.pacer.reset();
        self.phase = Phase::Running;

        Ok(Some(round.round_number()))
    }

    /// Run the tick batch the pacer owes for this frame.
    ///
    /// On the frame whose final tick completes the round, the result is
    /// collected, recorded, and the session returns to Generated (or
    /// Finished after the last round).
    pub fn step_frame(&mut self, now_ms: u64) -> Result<FrameOutcome, DirectorError> {
        self.guard("step_frame", &[Phase::Running])?;
        let round_number = self.round_cursor as u32 + 1;
        let Some(sim) = self.active.as_mut() else {
            return Err(DirectorError::InvalidPhase {
                operation: "step_frame",
                phase: self.phase.as_str(),
            });
        };

        let due = self.pacer.ticks_due(now_ms);
        let mut ticks_run = 0;
        for _ in 0..due {
            if sim.is_complete() {
                break;
            }
            sim.tick();
            ticks_run += 1;
            if sim.tick_count() >= self.config.max_ticks_per_round && !sim.is_complete() {
                warn!(
                    round_number,
                    limit = self.config.max_ticks_per_round,
                    "round tick budget exceeded"
                );
                return Err(DirectorError::RoundBudgetExceeded {
                    round_number,
                    limit: self.config.max_ticks_per_round,
                });
            }
        }

        let tick = sim.tick_count();
        let progress = sim.get_progress();
        let digest = sim.state_digest();
        let snapshot_bytes = encode_progress_snapshot(tick, progress.clone(), digest);

        let result = if sim.is_complete() {
            let result = sim.results()?;
            debug!(round_number, ticks = tick, "round complete");
            self.recorder.record_round(
                round_number,
                self.round_seed(self.round_cursor),
                tick,
                digest,
                result.clone(),
            );
            self.results.push(result.clone());
            self.active = None;
            self.round_cursor += 1;
            self.phase = if self.round_cursor >= ROUNDS_TOTAL {
                Phase::Finished
            } else {
                Phase::Generated
            };
            Some(result)
        } else {
            None
        };

        Ok(FrameOutcome {
            ticks_run,
            tick,
            progress,
            snapshot_bytes,
            result,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn roster(&self) -> &[Horse] {
        &self.roster
    }

    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    /// Results of the rounds completed so far, in running order.
    pub fn results(&self) -> &[RaceResult] {
        &self.results
    }

    /// Live progress of the in-flight round, if any.
    pub fn progress(&self) -> Option<Vec<HorseProgress>> {
        self.active.as_ref().map(RaceSimulation::get_progress)
    }

    /// The in-flight round, if any.
    pub fn current_round(&self) -> Option<&Round> {
        if self.phase != Phase::Running {
            return None;
        }
        self.schedule
            .as_ref()
            .map(|s| &s.rounds()[self.round_cursor])
    }

    /// Produce the checksummed race record. Only once every round has run.
    pub fn finalize(self) -> Result<RaceRecordProto, DirectorError> {
        if self.phase != Phase::Finished {
            warn!(phase = self.phase.as_str(), "finalize rejected");
            return Err(DirectorError::InvalidPhase {
                operation: "finalize",
                phase: self.phase.as_str(),
            });
        }
        Ok(self.recorder.finalize())
    }

    /// Back to Idle with everything cleared.
    pub fn reset(&mut self) {
        self.roster.clear();
        self.schedule = None;
        self.round_cursor = 0;
        self.active = None;
        self.results.clear();
        self.recorder = RaceRecorder::new(self.config.seed);
        self.pacer = FramePacer::new(self.config.tick_interval_ms, self.config.max_ticks_per_frame);
        self.phase = Phase::Idle;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use derby_sim::{HORSES_PER_ROUND, HORSES_TOTAL};
    use derby_wire::ProgressSnapshotProto;
    use prost::Message;

    fn accelerated(seed: u64) -> RaceDirector {
        // 1 ms per tick with a large batch cap keeps test clocks small.
        RaceDirector::new(DirectorConfig {
            seed,
            tick_interval_ms: 1,
            max_ticks_per_frame: 500,
            ..Default::default()
        })
    }

    /// Drive the in-flight round to completion, returning its result.
    fn run_round(director: &mut RaceDirector, clock_ms: &mut u64) -> RaceResult {
        loop {
            *clock_ms += 500;
            let outcome = director.step_frame(*clock_ms).unwrap();
            if let Some(result) = outcome.result {
                return result;
            }
        }
    }

    #[test]
    fn full_session_runs_all_six_rounds() {
        let mut director = accelerated(12345);
        director.generate_roster().unwrap();
        assert_eq!(director.roster().len(), HORSES_TOTAL);

        director.generate_schedule().unwrap();
        assert_eq!(director.phase(), Phase::Generated);

        let mut clock = 0;
        for expected_round in 1..=ROUNDS_TOTAL as u32 {
            let started = director.start_next_round().unwrap();
            assert_eq!(started, Some(expected_round));
            assert_eq!(director.phase(), Phase::Running);

            let result = run_round(&mut director, &mut clock);
            assert_eq!(result.round_number, expected_round);
            assert_eq!(result.rankings.len(), HORSES_PER_ROUND);
        }

        assert_eq!(director.phase(), Phase::Finished);
        assert_eq!(director.results().len(), ROUNDS_TOTAL);
    }

    #[test]
    fn finalized_record_verifies() {
        let mut director = accelerated(777);
        director.generate_roster().unwrap();
        director.generate_schedule().unwrap();

        let mut clock = 0;
        while director.phase() != Phase::Finished {
            director.start_next_round().unwrap();
            run_round(&mut director, &mut clock);
        }

        let record = director.finalize().unwrap();
        assert_eq!(record.rounds.len(), ROUNDS_TOTAL);
        assert!(derby_replay::verify_record(&record).is_ok());
    }

    #[test]
    fn equal_seeds_produce_equal_sessions() {
        let run = |frame_ms: u64| {
            let mut director = accelerated(42);
            director.generate_roster().unwrap();
            director.generate_schedule().unwrap();
            let mut clock = 0;
            let mut results = Vec::new();
            while director.phase() != Phase::Finished {
                director.start_next_round().unwrap();
                loop {
                    clock += frame_ms;
                    let outcome = director.step_frame(clock).unwrap();
                    if let Some(result) = outcome.result {
                        results.push(result);
                        break;
                    }
                }
            }
            results
        };

        // Frame cadence must not leak into race outcomes.
        assert_eq!(run(500), run(137));
    }

    #[test]
    fn guards_reject_out_of_phase_operations() {
        let mut director = accelerated(1);

        // Nothing exists yet.
        assert!(matches!(
            director.step_frame(0),
            Err(DirectorError::InvalidPhase { operation: "step_frame", .. })
        ));
        assert!(matches!(
            director.start_next_round(),
            Err(DirectorError::InvalidPhase { .. })
        ));
        assert!(matches!(
            director.generate_schedule(),
            Err(DirectorError::NoRoster)
        ));

        director.generate_roster().unwrap();
        director.generate_schedule().unwrap();
        director.start_next_round().unwrap();

        // Mid-race regeneration and double starts are rejected.
        assert!(director.generate_roster().is_err());
        assert!(director.generate_schedule().is_err());
        assert!(matches!(
            director.start_next_round(),
            Err(DirectorError::InvalidPhase { operation: "start_next_round", .. })
        ));
    }

    #[test]
    fn regenerating_the_schedule_resets_the_session() {
        let mut director = accelerated(9);
        director.generate_roster().unwrap();
        director.generate_schedule().unwrap();
        director.start_next_round().unwrap();
        let mut clock = 0;
        run_round(&mut director, &mut clock);
        assert_eq!(director.results().len(), 1);

        director.generate_schedule().unwrap();
        assert_eq!(director.results().len(), 0);
        assert_eq!(director.start_next_round().unwrap(), Some(1));
    }

    #[test]
    fn snapshot_bytes_decode_to_the_frame_state() {
        let mut director = accelerated(5);
        director.generate_roster().unwrap();
        director.generate_schedule().unwrap();
        director.start_next_round().unwrap();

        director.step_frame(0).unwrap();
        let outcome = director.step_frame(50).unwrap();
        assert!(outcome.ticks_run > 0);

        let decoded = ProgressSnapshotProto::decode(outcome.snapshot_bytes.as_slice()).unwrap();
        assert_eq!(decoded.tick, outcome.tick);
        assert_eq!(decoded.entries.len(), HORSES_PER_ROUND);
    }

    #[test]
    fn first_frame_anchors_without_ticking() {
        let mut director = accelerated(5);
        director.generate_roster().unwrap();
        director.generate_schedule().unwrap();
        director.start_next_round().unwrap();

        let outcome = director.step_frame(123_456).unwrap();
        assert_eq!(outcome.ticks_run, 0);
        assert_eq!(outcome.tick, 0);
    }

    #[test]
    fn round_budget_is_enforced() {
        let mut director = RaceDirector::new(DirectorConfig {
            seed: 5,
            tick_interval_ms: 1,
            max_ticks_per_frame: 500,
            max_ticks_per_round: 10,
        });
        director.generate_roster().unwrap();
        director.generate_schedule().unwrap();
        director.start_next_round().unwrap();

        director.step_frame(0).unwrap();
        let err = director.step_frame(500).unwrap_err();
        assert_eq!(
            err,
            DirectorError::RoundBudgetExceeded {
                round_number: 1,
                limit: 10
            }
        );
    }

    #[test]
    fn finalize_requires_a_finished_session() {
        let mut director = accelerated(5);
        director.generate_roster().unwrap();
        director.generate_schedule().unwrap();
        assert!(director.finalize().is_err());
    }

    #[test]
    fn reset_returns_to_a_clean_idle() {
        let mut director = accelerated(5);
        director.generate_roster().unwrap();
        director.generate_schedule().unwrap();
        director.start_next_round().unwrap();

        director.reset();
        assert_eq!(director.phase(), Phase::Idle);
        assert!(director.roster().is_empty());
        assert!(director.schedule().is_none());
        assert!(director.results().is_empty());
        assert!(director.progress().is_none());
    }
}
