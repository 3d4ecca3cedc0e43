//! Derby Wire Types
//!
//! Protobuf message types for the serializable boundary around the
//! simulation core: roster and schedule snapshots handed to a
//! presentation layer, per-frame progress broadcasts, final race results,
//! and the race record artifact consumed by `derby-replay`.
//!
//! The core itself owns no wire format; everything here is a projection
//! of `derby-sim` types plus validating conversions back.

#![deny(unsafe_code)]

use prost::Message;
use thiserror::Error;

use derby_sim::{
    HORSES_PER_ROUND, Horse, HorseProgress, LaneAssignment, RaceResult, RankingEntry, Round,
};

/// Current race record artifact format version.
pub const RECORD_FORMAT_VERSION: u32 = 1;

/// Conversion failures from wire messages back into sim types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("lane {0} does not fit in a lane number")]
    LaneOverflow(u32),
    #[error("lane assignment is missing its horse")]
    MissingHorse,
    #[error("round record is missing its result")]
    MissingResult,
    #[error("invalid round: {0}")]
    InvalidRound(String),
}

// ============================================================================
// Roster / Schedule Messages
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct HorseProto {
    #[prost(uint32, tag = "1")]
    pub id: u32,

    #[prost(string, tag = "2")]
    pub name: String,

    #[prost(string, tag = "3")]
    pub color: String,

    #[prost(uint32, tag = "4")]
    pub condition: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct LaneAssignmentProto {
    #[prost(message, optional, tag = "1")]
    pub horse: Option<HorseProto>,

    /// Lane 1..=10; wire as u32 for protobuf compatibility.
    #[prost(uint32, tag = "2")]
    pub lane: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct RoundProto {
    #[prost(uint32, tag = "1")]
    pub round_number: u32,

    /// Distance in meters.
    #[prost(uint32, tag = "2")]
    pub distance: u32,

    /// Entrants in heat-participant order.
    #[prost(message, repeated, tag = "3")]
    pub lanes: Vec<LaneAssignmentProto>,
}

// ============================================================================
// Progress / Result Messages
// ============================================================================

/// One entrant's progress inside a frame broadcast.
#[derive(Clone, PartialEq, Message)]
pub struct ProgressEntryProto {
    #[prost(uint32, tag = "1")]
    pub horse_id: u32,

    #[prost(uint32, tag = "2")]
    pub lane: u32,

    /// Percentage of the round distance covered, in [0, 100].
    #[prost(double, tag = "3")]
    pub progress: f64,

    /// Present only once the entrant finished.
    #[prost(uint32, optional, tag = "4")]
    pub finish_rank: Option<u32>,
}

/// Per-frame progress broadcast; byte-identical for every observer of the
/// same frame.
#[derive(Clone, PartialEq, Message)]
pub struct ProgressSnapshotProto {
    /// Logical tick count of the engine at this frame.
    #[prost(uint64, tag = "1")]
    pub tick: u64,

    /// Entries in heat-participant order.
    #[prost(message, repeated, tag = "2")]
    pub entries: Vec<ProgressEntryProto>,

    /// Engine state digest at this frame.
    #[prost(uint64, tag = "3")]
    pub digest: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct RankingEntryProto {
    #[prost(uint32, tag = "1")]
    pub position: u32,

    #[prost(message, optional, tag = "2")]
    pub horse: Option<HorseProto>,

    #[prost(uint32, tag = "3")]
    pub lane: u32,

    /// Elapsed simulated time in seconds.
    #[prost(double, tag = "4")]
    pub time_seconds: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct RaceResultProto {
    #[prost(uint32, tag = "1")]
    pub round_number: u32,

    #[prost(uint32, tag = "2")]
    pub distance: u32,

    /// Ranked entries, position ascending.
    #[prost(message, repeated, tag = "3")]
    pub rankings: Vec<RankingEntryProto>,
}

// ============================================================================
// Race Record Artifact
// ============================================================================

/// One finished round inside a race record.
#[derive(Clone, PartialEq, Message)]
pub struct RoundRecordProto {
    #[prost(uint32, tag = "1")]
    pub round_number: u32,

    /// Engine seed for this round.
    #[prost(uint64, tag = "2")]
    pub seed: u64,

    /// Ticks the engine took to complete.
    #[prost(uint64, tag = "3")]
    pub tick_count: u64,

    /// Engine state digest at completion.
    #[prost(uint64, tag = "4")]
    pub final_digest: u64,

    #[prost(message, optional, tag = "5")]
    pub result: Option<RaceResultProto>,
}

/// Complete race record artifact for a session: enough to re-derive the
/// roster and schedule and re-simulate every round for verification.
#[derive(Clone, PartialEq, Message)]
pub struct RaceRecordProto {
    #[prost(uint32, tag = "1")]
    pub record_format_version: u32,

    /// Session seed; roster uses it directly, schedule and rounds derive
    /// their seeds from it by fixed offsets.
    #[prost(uint64, tag = "2")]
    pub session_seed: u64,

    /// RNG algorithm identifier (e.g. "mulberry32").
    #[prost(string, tag = "3")]
    pub rng_algorithm: String,

    /// State digest algorithm identifier.
    #[prost(string, tag = "4")]
    pub digest_algorithm: String,

    /// Logical tick duration in milliseconds of simulated time.
    #[prost(uint64, tag = "5")]
    pub tick_ms: u64,

    /// The generated roster, id ascending.
    #[prost(message, repeated, tag = "6")]
    pub roster: Vec<HorseProto>,

    /// One record per completed round, in running order.
    #[prost(message, repeated, tag = "7")]
    pub rounds: Vec<RoundRecordProto>,

    /// SHA-256 (hex) over the encoded record with this field empty.
    #[prost(string, tag = "8")]
    pub content_sha256: String,
}

// ============================================================================
// Conversions
// ============================================================================

impl From<Horse> for HorseProto {
    fn from(h: Horse) -> Self {
        Self {
            id: h.id,
            name: h.name,
            color: h.color,
            condition: h.condition,
        }
    }
}

impl From<HorseProto> for Horse {
    fn from(p: HorseProto) -> Self {
        Self {
            id: p.id,
            name: p.name,
            color: p.color,
            condition: p.condition,
        }
    }
}

impl From<LaneAssignment> for LaneAssignmentProto {
    fn from(a: LaneAssignment) -> Self {
        Self {
            horse: Some(a.horse.into()),
            lane: u32::from(a.lane),
        }
    }
}

impl TryFrom<LaneAssignmentProto> for LaneAssignment {
    type Error = WireError;

    fn try_from(p: LaneAssignmentProto) -> Result<Self, Self::Error> {
        if p.lane > HORSES_PER_ROUND as u32 {
            return Err(WireError::LaneOverflow(p.lane));
        }
        let horse = p.horse.ok_or(WireError::MissingHorse)?;
        Ok(Self {
            horse: horse.into(),
            lane: p.lane as u8,
        })
    }
}

impl From<&Round> for RoundProto {
    fn from(round: &Round) -> Self {
        Self {
            round_number: round.round_number(),
            distance: round.distance(),
            lanes: round.lanes().iter().cloned().map(Into::into).collect(),
        }
    }
}

impl TryFrom<RoundProto> for Round {
    type Error = WireError;

    fn try_from(p: RoundProto) -> Result<Self, Self::Error> {
        let lanes: Result<Vec<LaneAssignment>, WireError> =
            p.lanes.into_iter().map(TryInto::try_into).collect();
        // Round::new re-checks the lane invariants on decode.
        Round::new(p.round_number, p.distance, lanes?)
            .map_err(|e| WireError::InvalidRound(e.to_string()))
    }
}

impl From<HorseProgress> for ProgressEntryProto {
    fn from(p: HorseProgress) -> Self {
        Self {
            horse_id: p.horse_id,
            lane: u32::from(p.lane),
            progress: p.progress,
            finish_rank: p.finish_rank,
        }
    }
}

impl From<RankingEntry> for RankingEntryProto {
    fn from(e: RankingEntry) -> Self {
        Self {
            position: e.position,
            horse: Some(e.horse.into()),
            lane: u32::from(e.lane),
            time_seconds: e.time_seconds,
        }
    }
}

impl TryFrom<RankingEntryProto> for RankingEntry {
    type Error = WireError;

    fn try_from(p: RankingEntryProto) -> Result<Self, Self::Error> {
        if p.lane > HORSES_PER_ROUND as u32 {
            return Err(WireError::LaneOverflow(p.lane));
        }
        let horse = p.horse.ok_or(WireError::MissingHorse)?;
        Ok(Self {
            position: p.position,
            horse: horse.into(),
            lane: p.lane as u8,
            time_seconds: p.time_seconds,
        })
    }
}

impl From<RaceResult> for RaceResultProto {
    fn from(r: RaceResult) -> Self {
        Self {
            round_number: r.round_number,
            distance: r.distance,
            rankings: r.rankings.into_iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<RaceResultProto> for RaceResult {
    type Error = WireError;

    fn try_from(p: RaceResultProto) -> Result<Self, Self::Error> {
        let rankings: Result<Vec<RankingEntry>, WireError> =
            p.rankings.into_iter().map(TryInto::try_into).collect();
        Ok(Self {
            round_number: p.round_number,
            distance: p.distance,
            rankings: rankings?,
        })
    }
}

/// Encode a progress snapshot for broadcast.
pub fn encode_progress_snapshot(tick: u64, progress: Vec<HorseProgress>, digest: u64) -> Vec<u8> {
    let proto = ProgressSnapshotProto {
        tick,
        entries: progress.into_iter().map(Into::into).collect(),
        digest,
    };
    proto.encode_to_vec()
}

// ============================================================================
// Tests
// ============================================================================
