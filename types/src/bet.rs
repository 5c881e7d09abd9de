use std::fmt;
use std::ops::RangeInclusive;

use crate::{Identity, SecretSeed, OVER_MAX, OVER_MIN, UNDER_MAX, UNDER_MIN};

/// Which side of the threshold a bet wins on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Under,
    Over,
}

impl Direction {
    pub fn from_roll_under(roll_under: bool) -> Self {
        if roll_under {
            Direction::Under
        } else {
            Direction::Over
        }
    }

    pub fn is_under(self) -> bool {
        matches!(self, Direction::Under)
    }

    /// Inclusive range of thresholds accepted for this direction.
    pub fn threshold_range(self) -> RangeInclusive<u16> {
        match self {
            Direction::Under => UNDER_MIN..=UNDER_MAX,
            Direction::Over => OVER_MIN..=OVER_MAX,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Under => f.write_str("under"),
            Direction::Over => f.write_str("over"),
        }
    }
}

/// A resolved bet. Immutable once stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BetRecord {
    /// Assigned by the store on insert.
    pub id: u64,
    pub identity: Identity,
    /// Wager in cents.
    pub wager: u64,
    pub direction: Direction,
    pub threshold: u16,
    pub outcome: u16,
    pub won: bool,
    /// The seed consumed by this bet (revealed).
    pub secret_seed: SecretSeed,
    pub created_at: u64,
}
