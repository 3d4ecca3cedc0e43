//! Derby Replay System
//!
//! Race record artifacts capture everything needed to reproduce a session:
//! the session seed, the roster it produced, and per round the derived
//! engine seed, the tick count to completion, the final engine digest, and
//! the ranked result. Verification re-derives the roster and schedule and
//! re-simulates every recorded round, comparing digests and results.
//!
//! The artifact carries a SHA-256 content checksum so a tampered or
//! truncated file is rejected before any re-simulation happens.

#![deny(unsafe_code)]

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use prost::Message;
use sha2::{Digest, Sha256};
use thiserror::Error;

use derby_sim::{
    RACE_DIGEST_ALGO_ID, RNG_ALGO_ID, ROUND_SEED_OFFSET, ROUNDS_TOTAL, RaceResult, RaceSimulation,
    SCHEDULE_SEED_OFFSET, TICK_MS, Horse, generate_horses, generate_schedule,
};
use derby_wire::{HorseProto, RECORD_FORMAT_VERSION, RaceRecordProto, RoundRecordProto};

// ============================================================================
// Recorder
// ============================================================================

/// Collects session data while the director runs, then finalizes it into
/// a checksummed [`RaceRecordProto`].
#[derive(Debug, Default)]
pub struct RaceRecorder {
    session_seed: u64,
    roster: Vec<Horse>,
    rounds: Vec<RoundRecordProto>,
}

impl RaceRecorder {
    pub fn new(session_seed: u64) -> Self {
        Self {
            session_seed,
            roster: Vec::new(),
            rounds: Vec::new(),
        }
    }

    /// Record the generated roster.
    pub fn record_roster(&mut self, roster: &[Horse]) {
        self.roster = roster.to_vec();
    }

    /// Record one completed round.
    pub fn record_round(
        &mut self,
        round_number: u32,
        seed: u64,
        tick_count: u64,
        final_digest: u64,
        result: RaceResult,
    ) {
        self.rounds.push(RoundRecordProto {
            round_number,
            seed,
            tick_count,
            final_digest,
            result: Some(result.into()),
        });
    }

    /// Number of rounds recorded so far.
    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    /// Produce the final artifact with its content checksum.
    pub fn finalize(self) -> RaceRecordProto {
        let mut record = RaceRecordProto {
            record_format_version: RECORD_FORMAT_VERSION,
            session_seed: self.session_seed,
            rng_algorithm: RNG_ALGO_ID.to_string(),
            digest_algorithm: RACE_DIGEST_ALGO_ID.to_string(),
            tick_ms: TICK_MS,
            roster: self.roster.into_iter().map(HorseProto::from).collect(),
            rounds: self.rounds,
            content_sha256: String::new(),
        };
        record.content_sha256 = content_checksum(&record);
        record
    }
}

/// SHA-256 (hex) over the encoded record with the checksum field empty.
pub fn content_checksum(record: &RaceRecordProto) -> String {
    let mut unsigned = record.clone();
    unsigned.content_sha256 = String::new();
    let mut hasher = Sha256::new();
    hasher.update(unsigned.encode_to_vec());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Verification
// ============================================================================

/// Race record verification failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("unsupported record format version {actual}, expected {expected}")]
    UnsupportedVersion { expected: u32, actual: u32 },
    #[error("content checksum mismatch: recorded {recorded}, computed {computed}")]
    ChecksumMismatch { recorded: String, computed: String },
    #[error("{field} algorithm mismatch: recorded {recorded}, this build uses {current}")]
    AlgorithmMismatch {
        field: &'static str,
        recorded: String,
        current: &'static str,
    },
    #[error("tick unit mismatch: recorded {recorded} ms, this build uses {current} ms")]
    TickUnitMismatch { recorded: u64, current: u64 },
    #[error("recorded roster does not match the roster regenerated from seed {seed}")]
    RosterMismatch { seed: u64 },
    #[error("record holds {actual} rounds, a session has at most {max}")]
    RoundCountExceeded { actual: usize, max: usize },
    #[error("round record {index} is numbered {round_number}, expected {expected}")]
    RoundNumberMismatch {
        index: usize,
        round_number: u32,
        expected: u32,
    },
    #[error("round {round_number} recorded seed {recorded}, derivation expects {expected}")]
    SeedMismatch {
        round_number: u32,
        recorded: u64,
        expected: u64,
    },
    #[error("round {round_number} record is missing its result")]
    MissingResult { round_number: u32 },
    #[error("round {round_number} is not complete after the recorded {ticks} ticks")]
    IncompleteAfterTicks { round_number: u32, ticks: u64 },
    #[error("round {round_number} digest mismatch: recorded {recorded:#x}, got {computed:#x}")]
    DigestMismatch {
        round_number: u32,
        recorded: u64,
        computed: u64,
    },
    #[error("round {round_number} result does not match the re-simulation")]
    ResultMismatch { round_number: u32 },
    #[error("recorded session does not regenerate: {0}")]
    ScheduleInvalid(String),
    #[error("invalid record format: {0}")]
    InvalidFormat(String),
}

/// Verify that a race record reproduces under re-simulation.
///
/// Steps:
/// 1. Format version and content checksum.
/// 2. RNG / digest algorithm and tick unit identity.
/// 3. Roster regeneration from the session seed.
/// 4. Schedule regeneration (session seed + schedule offset).
/// 5. Per recorded round: seed derivation, exact tick-count re-simulation,
///    completion, final digest, and ranked result.
pub fn verify_record(record: &RaceRecordProto) -> Result<(), VerifyError> {
    if record.record_format_version != RECORD_FORMAT_VERSION {
        return Err(VerifyError::UnsupportedVersion {
            expected: RECORD_FORMAT_VERSION,
            actual: record.record_format_version,
        });
    }

    let computed = content_checksum(record);
    if computed != record.content_sha256 {
        return Err(VerifyError::ChecksumMismatch {
            recorded: record.content_sha256.clone(),
            computed,
        });
    }

    if record.rng_algorithm != RNG_ALGO_ID {
        return Err(VerifyError::AlgorithmMismatch {
            field: "rng",
            recorded: record.rng_algorithm.clone(),
            current: RNG_ALGO_ID,
        });
    }
    if record.digest_algorithm != RACE_DIGEST_ALGO_ID {
        return Err(VerifyError::AlgorithmMismatch {
            field: "digest",
            recorded: record.digest_algorithm.clone(),
            current: RACE_DIGEST_ALGO_ID,
        });
    }
    if record.tick_ms != TICK_MS {
        return Err(VerifyError::TickUnitMismatch {
            recorded: record.tick_ms,
            current: TICK_MS,
        });
    }

    // Roster regeneration anchor.
    let roster = generate_horses(record.session_seed);
    let recorded_roster: Vec<Horse> = record.roster.iter().cloned().map(Horse::from).collect();
    if roster != recorded_roster {
        return Err(VerifyError::RosterMismatch {
            seed: record.session_seed,
        });
    }

    let schedule = generate_schedule(&roster, record.session_seed.wrapping_add(SCHEDULE_SEED_OFFSET))
        .map_err(|e| VerifyError::ScheduleInvalid(e.to_string()))?;

    if record.rounds.len() > ROUNDS_TOTAL {
        return Err(VerifyError::RoundCountExceeded {
            actual: record.rounds.len(),
            max: ROUNDS_TOTAL,
        });
    }

    for (index, round_record) in record.rounds.iter().enumerate() {
        let expected_number = index as u32 + 1;
        if round_record.round_number != expected_number {
            return Err(VerifyError::RoundNumberMismatch {
                index,
                round_number: round_record.round_number,
                expected: expected_number,
            });
        }

        let expected_seed = record
            .session_seed
            .wrapping_add(index as u64)
            .wrapping_add(ROUND_SEED_OFFSET);
        if round_record.seed != expected_seed {
            return Err(VerifyError::SeedMismatch {
                round_number: round_record.round_number,
                recorded: round_record.seed,
                expected: expected_seed,
            });
        }

        let recorded_result: RaceResult = round_record
            .result
            .clone()
            .ok_or(VerifyError::MissingResult {
                round_number: round_record.round_number,
            })?
            .try_into()
            .map_err(|e: derby_wire::WireError| VerifyError::InvalidFormat(e.to_string()))?;

        // Re-simulate for exactly the recorded tick count.
        let mut sim = RaceSimulation::new(&schedule.rounds()[index], round_record.seed);
        for _ in 0..round_record.tick_count {
            if sim.is_complete() {
                break;
            }
            sim.tick();
        }

        if !sim.is_complete() || sim.tick_count() != round_record.tick_count {
            return Err(VerifyError::IncompleteAfterTicks {
                round_number: round_record.round_number,
                ticks: round_record.tick_count,
            });
        }

        let computed_digest = sim.state_digest();
        if computed_digest != round_record.final_digest {
            return Err(VerifyError::DigestMismatch {
                round_number: round_record.round_number,
                recorded: round_record.final_digest,
                computed: computed_digest,
            });
        }

        let computed_result = sim
            .results()
            .map_err(|e| VerifyError::InvalidFormat(e.to_string()))?;
        if computed_result != recorded_result {
            return Err(VerifyError::ResultMismatch {
                round_number: round_record.round_number,
            });
        }
    }

    Ok(())
}

// ============================================================================
// Record I/O
// ============================================================================

/// Write a race record to a file. Refuses to overwrite.
pub fn write_record(record: &RaceRecordProto, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    if path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("race record already exists at {}", path.display()),
        ));
    }

    let encoded = record.encode_to_vec();
    let mut file = fs::File::create(path)?;
    file.write_all(&encoded)?;

    Ok(())
}

/// Read a race record from a file.
pub fn read_record(path: &Path) -> io::Result<RaceRecordProto> {
    let data = fs::read(path)?;
    RaceRecordProto::decode(data.as_slice()).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("failed to decode race record: {e}"),
        )
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Run a full session the way the director would and record it.
    fn record_session(session_seed: u64, rounds_to_run: usize) -> RaceRecordProto {
        let roster = generate_horses(session_seed);
        let schedule =
            generate_schedule(&roster, session_seed.wrapping_add(SCHEDULE_SEED_OFFSET)).unwrap();

        let mut recorder = RaceRecorder::new(session_seed);
        recorder.record_roster(&roster);

        for (i, round) in schedule.rounds().iter().take(rounds_to_run).enumerate() {
            let seed = session_seed
                .wrapping_add(i as u64)
                .wrapping_add(ROUND_SEED_OFFSET);
            let mut sim = RaceSimulation::new(round, seed);
            while !sim.is_complete() {
                sim.tick();
            }
            recorder.record_round(
                round.round_number(),
                seed,
                sim.tick_count(),
                sim.state_digest(),
                sim.results().unwrap(),
            );
        }

        recorder.finalize()
    }

    #[test]
    fn full_session_record_verifies() {
        let record = record_session(12345, ROUNDS_TOTAL);
        assert_eq!(record.rounds.len(), ROUNDS_TOTAL);
        assert!(verify_record(&record).is_ok());
    }

    #[test]
    fn partial_session_record_verifies() {
        let record = record_session(777, 2);
        assert!(verify_record(&record).is_ok());
    }

    #[test]
    fn record_carries_algorithm_identity() {
        let record = record_session(1, 1);
        assert_eq!(record.record_format_version, RECORD_FORMAT_VERSION);
        assert_eq!(record.rng_algorithm, RNG_ALGO_ID);
        assert_eq!(record.digest_algorithm, RACE_DIGEST_ALGO_ID);
        assert_eq!(record.tick_ms, TICK_MS);
        assert!(!record.content_sha256.is_empty());
    }

    #[test]
    fn tampered_digest_is_detected() {
        let mut record = record_session(42, 1);
        record.rounds[0].final_digest ^= 0xDEAD_BEEF;
        record.content_sha256 = content_checksum(&record);

        assert!(matches!(
            verify_record(&record),
            Err(VerifyError::DigestMismatch { round_number: 1, .. })
        ));
    }

    #[test]
    fn tampered_content_fails_the_checksum() {
        let mut record = record_session(42, 1);
        record.roster[0].condition = 101;

        assert!(matches!(
            verify_record(&record),
            Err(VerifyError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn tampered_result_is_detected() {
        let mut record = record_session(42, 1);
        if let Some(result) = &mut record.rounds[0].result {
            result.rankings.swap(0, 1);
        }
        record.content_sha256 = content_checksum(&record);

        assert!(matches!(
            verify_record(&record),
            Err(VerifyError::ResultMismatch { round_number: 1 })
        ));
    }

    #[test]
    fn wrong_round_seed_is_detected() {
        let mut record = record_session(42, 1);
        record.rounds[0].seed += 1;
        record.content_sha256 = content_checksum(&record);

        assert!(matches!(
            verify_record(&record),
            Err(VerifyError::SeedMismatch { round_number: 1, .. })
        ));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut record = record_session(42, 1);
        record.record_format_version = 99;

        assert_eq!(
            verify_record(&record),
            Err(VerifyError::UnsupportedVersion {
                expected: RECORD_FORMAT_VERSION,
                actual: 99
            })
        );
    }

    #[test]
    fn record_round_trips_through_a_file() {
        let record = record_session(314, 1);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.derbyrec");

        write_record(&record, &path).unwrap();
        let loaded = read_record(&path).unwrap();

        assert_eq!(loaded, record);
        assert!(verify_record(&loaded).is_ok());
    }

    #[test]
    fn write_refuses_to_overwrite() {
        let record = record_session(314, 1);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.derbyrec");

        write_record(&record, &path).unwrap();
        let err = write_record(&record, &path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}
