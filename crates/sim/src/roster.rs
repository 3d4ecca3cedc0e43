//! Roster generation: a fixed-size list of uniquely named and colored
//! horses with seeded condition ratings.
//!
//! Names and colors are positionally fixed pools, so they never collide
//! within a roster by construction, independent of randomness; only the
//! condition draws vary between seeds.

use thiserror::Error;

use crate::rng::SeededRng;
use crate::{CONDITION_MAX, CONDITION_MIN, HORSES_TOTAL, HorseId};

/// Fixed name pool, entry `i` belongs to horse id `i + 1`.
pub const HORSE_NAMES: [&str; HORSES_TOTAL] = [
    "Thunder",
    "Lightning",
    "Storm",
    "Blaze",
    "Shadow",
    "Comet",
    "Eclipse",
    "Tornado",
    "Avalanche",
    "Mirage",
    "Phantom",
    "Meteor",
    "Cyclone",
    "Ember",
    "Frostbite",
    "Galahad",
    "Hurricane",
    "Inferno",
    "Juniper",
    "Kestrel",
];

/// Fixed color pool, entry `i` belongs to horse id `i + 1`. All distinct.
pub const HORSE_COLORS: [&str; HORSES_TOTAL] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#F7B731", "#5D5D81", "#26DE81", "#A55EEA", "#FD9644",
    "#2BCBBA", "#778CA3", "#EB3B5A", "#3867D6", "#8854D0", "#FA8231", "#20BF6B", "#0FB9B1",
    "#4B6584", "#F8A5C2", "#63CDDA", "#786FA6",
];

/// A competitor. Identity is immutable once created; condition is an
/// elite-tier fitness score in [80, 100].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Horse {
    pub id: HorseId,
    pub name: String,
    pub color: String,
    pub condition: u32,
}

/// Roster invariant violations, rejected at the generation boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    #[error("roster must contain exactly {expected} horses, got {actual}")]
    WrongCount { expected: usize, actual: usize },
    #[error("duplicate horse id {0} in roster")]
    DuplicateId(HorseId),
    #[error("duplicate color {color} in roster (horse id {id})")]
    DuplicateColor { id: HorseId, color: String },
    #[error("horse {id} condition {condition} outside [{CONDITION_MIN}, {CONDITION_MAX}]")]
    ConditionOutOfRange { id: HorseId, condition: u32 },
}

/// Generate the 20-horse session roster from a seed.
///
/// Ids are 1-based and sequential; name and color come from the fixed
/// pools by position; condition is one bounded draw per horse from a
/// single generator. Identical seed, identical roster.
pub fn generate_horses(seed: u64) -> Vec<Horse> {
    let mut rng = SeededRng::new(seed);

    (0..HORSES_TOTAL)
        .map(|i| Horse {
            id: i as HorseId + 1,
            name: HORSE_NAMES[i].to_string(),
            color: HORSE_COLORS[i].to_string(),
            condition: rng.next_int(CONDITION_MIN, CONDITION_MAX),
        })
        .collect()
}

/// Fail-fast roster validation for rosters arriving from outside
/// [`generate_horses`] (which is valid by construction).
pub fn validate_roster(horses: &[Horse]) -> Result<(), RosterError> {
    if horses.len() != HORSES_TOTAL {
        return Err(RosterError::WrongCount {
            expected: HORSES_TOTAL,
            actual: horses.len(),
        });
    }

    for (i, horse) in horses.iter().enumerate() {
        if !(CONDITION_MIN..=CONDITION_MAX).contains(&horse.condition) {
            return Err(RosterError::ConditionOutOfRange {
                id: horse.id,
                condition: horse.condition,
            });
        }
        for earlier in &horses[..i] {
            if earlier.id == horse.id {
                return Err(RosterError::DuplicateId(horse.id));
            }
            if earlier.color == horse.color {
                return Err(RosterError::DuplicateColor {
                    id: horse.id,
                    color: horse.color.clone(),
                });
            }
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
