use std::fmt;
use std::iter::Sum;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A validated number of effort hours.
///
/// Always finite and non-negative. Single values enter the system through
/// [`EffortHours::new`] or [`EffortInput::parse`] and are capped at
/// [`EffortHours::MAX_HOURS`], so sums over any realistic number of tasks stay
/// finite.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct EffortHours(f64);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EffortError {
    #[error("effort hours must be a number, got {0:?}")]
    NotANumber(String),
    #[error("effort hours must be finite")]
    NotFinite,
    #[error("effort hours cannot be negative")]
    Negative,
    #[error("effort hours cannot exceed {}", EffortHours::MAX_HOURS)]
    TooLarge,
}

impl EffortHours {
    pub const ZERO: EffortHours = EffortHours(0.0);
    /// Largest effort a single task may record.
    pub const MAX_HOURS: f64 = 1_000_000.0;

    pub fn new(hours: f64) -> Result<Self, EffortError> {
        let total = Self::total(hours)?;
        if hours > Self::MAX_HOURS {
            return Err(EffortError::TooLarge);
        }
        Ok(total)
    }

    /// An aggregate read back from a response. Totals may exceed
    /// `MAX_HOURS` but are still finite and non-negative.
    fn total(hours: f64) -> Result<Self, EffortError> {
        if !hours.is_finite() {
            return Err(EffortError::NotFinite);
        }
        if hours < 0.0 {
            return Err(EffortError::Negative);
        }
        Ok(Self(hours))
    }

    pub fn hours(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for EffortHours {
    type Error = EffortError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::total(value)
    }
}

impl From<EffortHours> for f64 {
    fn from(value: EffortHours) -> Self {
        value.0
    }
}

impl fmt::Display for EffortHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Sum for EffortHours {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|h| h.0).sum())
    }
}

/// Raw effort value as submitted by a client.
///
/// Forms tend to send numbers as strings, so both shapes are accepted here and
/// turned into an [`EffortHours`] by [`EffortInput::parse`]. A blank string
/// means "no value".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EffortInput {
    Number(f64),
    Text(String),
}

impl EffortInput {
    pub fn parse(&self) -> Result<Option<EffortHours>, EffortError> {
        match self {
            Self::Number(n) => EffortHours::new(*n).map(Some),
            Self::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                let n: f64 = trimmed
                    .parse()
                    .map_err(|_| EffortError::NotANumber(s.clone()))?;
                EffortHours::new(n).map(Some)
            }
        }
    }
}

impl From<f64> for EffortInput {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for EffortInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Sum the values that are present, counting missing ones as zero.
pub fn sum_present<I>(values: I) -> EffortHours
where
    I: IntoIterator<Item = Option<EffortHours>>,
{
    values.into_iter().flatten().sum()
}
