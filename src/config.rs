//! Loading of the [`PointPolicy`] business bounds.
//!
//! Defaults match the historical constants (a ceiling of 1,000,000 points and a floor of
//! zero). Either bound may be overridden from the environment or deserialized from any serde
//! format, with missing fields falling back to their defaults.

use std::env;

use crate::domain::PointPolicy;

/// Environment variable overriding [`PointPolicy::max_points`].
pub const MAX_POINTS_VAR: &str = "POINT_LEDGER_MAX_POINTS";

/// Environment variable overriding [`PointPolicy::min_points`].
pub const MIN_POINTS_VAR: &str = "POINT_LEDGER_MIN_POINTS";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("minimum of {min_points} points is above the maximum of {max_points}")]
    InvertedBounds { min_points: u64, max_points: u64 },
}

impl PointPolicy {
    /// Default policy with any bound set in the environment applied on top
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Same as [`PointPolicy::from_env`], reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut policy = Self::default();
        if let Some(max_points) = parse_var(&lookup, MAX_POINTS_VAR)? {
            policy.max_points = max_points;
        }
        if let Some(min_points) = parse_var(&lookup, MIN_POINTS_VAR)? {
            policy.min_points = min_points;
        }

        policy.validate()
    }

    /// Reject a policy whose floor sits above its ceiling
    pub fn validate(self) -> Result<Self, Error> {
        if self.min_points > self.max_points {
            return Err(Error::InvertedBounds {
                min_points: self.min_points,
                max_points: self.max_points,
            });
        }

        Ok(self)
    }
}

fn parse_var<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, Error>
where
    F: Fn(&'static str) -> Option<String>,
{
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| Error::InvalidValue { var, value })
        })
        .transpose()
}
