//! # Primitives
//!
//! Fixed-point score arithmetic and crate-wide limits.
//!
//! Every score in gearstep is an integer number of millionths. Backends that
//! report floats are converted once at the app boundary; from there on all
//! ranking is integer arithmetic, so repeated runs order candidates
//! identically.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One whole unit, in millionths.
pub const SCALE: u32 = 1_000_000;

/// Upper bound on candidates kept from a single strategy call.
pub const MAX_STRATEGY_HITS: usize = 500;

/// Default cap on the consolidated candidate list.
pub const DEFAULT_MAX_RESULTS: usize = 20;

// =============================================================================
// SCORE
// =============================================================================

/// A normalized score in `[0, 1]`, stored as millionths.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Score(u32);

impl Score {
    pub const ZERO: Score = Score(0);
    pub const FULL: Score = Score(SCALE);

    /// Build from millionths, clamping to `[0, SCALE]`.
    #[must_use]
    pub fn from_millionths(value: u32) -> Self {
        Self(value.min(SCALE))
    }

    /// Build from an integer percentage (0-100).
    #[must_use]
    pub fn from_percent(percent: u8) -> Self {
        Self::from_millionths(u32::from(percent.min(100)).saturating_mul(10_000))
    }

    /// `part / whole` as a score. A zero `whole` yields zero.
    #[must_use]
    pub fn ratio(part: u64, whole: u64) -> Self {
        if whole == 0 {
            return Self::ZERO;
        }
        let part = part.min(whole);
        let scaled = part.saturating_mul(u64::from(SCALE)) / whole;
        Self::from_millionths(scaled as u32)
    }

    #[must_use]
    pub fn millionths(self) -> u32 {
        self.0
    }

    /// Integer percentage, rounded down.
    #[must_use]
    pub fn percent(self) -> u8 {
        (self.0 / 10_000) as u8
    }
}

// =============================================================================
// WEIGHT
// =============================================================================

/// Relative weight of a strategy, stored as millionths (1.0 = `SCALE`).
///
/// Unlike [`Score`], weights may exceed one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Weight(u32);

impl Weight {
    pub const ZERO: Weight = Weight(0);
    pub const UNIT: Weight = Weight(SCALE);

    #[must_use]
    pub fn from_millionths(value: u32) -> Self {
        Self(value)
    }

    /// Build from a percentage; `150` is a weight of 1.5.
    #[must_use]
    pub fn from_percent(percent: u32) -> Self {
        Self(percent.saturating_mul(10_000))
    }

    #[must_use]
    pub fn millionths(self) -> u32 {
        self.0
    }

    /// `weight * score`, in millionths.
    #[must_use]
    pub fn apply(self, score: Score) -> CombinedScore {
        let product = u64::from(self.0).saturating_mul(u64::from(score.millionths()));
        CombinedScore(product / u64::from(SCALE))
    }
}

// =============================================================================
// COMBINED SCORE
// =============================================================================

/// Sum of weighted strategy scores, in millionths. Unbounded above.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CombinedScore(pub u64);

impl CombinedScore {
    pub const ZERO: CombinedScore = CombinedScore(0);

    #[must_use]
    pub fn saturating_add(self, other: CombinedScore) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    #[must_use]
    pub fn millionths(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CombinedScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = u64::from(SCALE);
        write!(f, "{}.{:06}", self.0 / scale, self.0 % scale)
    }
}

// =============================================================================
// TESTS
// =============================================================================
