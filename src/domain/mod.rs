use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a point holder
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Current point balance of a user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: UserId,

    /// Current amount of points
    pub points: u64,

    /// Time of the last committed mutation
    ///
    /// A user that never transacted reports the Unix epoch, so that two reads of an untouched
    /// user return the same record.
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// Zero balance for a user that has no stored record yet
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            points: 0,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    /// Points were added to the balance
    Charge,
    /// Points were spent from the balance
    Use,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Charge => f.write_str("CHARGE"),
            TransactionType::Use => f.write_str("USE"),
        }
    }
}

/// Committed charge or use, as recorded in the history
///
/// Records are immutable once appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Identifier assigned by the history store at append time
    pub id: u64,
    pub user_id: UserId,
    /// Always strictly positive; the direction is given by `kind`
    pub amount: u64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub timestamp: DateTime<Utc>,
}

/// Business bounds applied to charges and uses
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointPolicy {
    /// Highest balance a user may hold
    #[serde(default = "default_max_points")]
    pub max_points: u64,
    /// Lowest balance a `use` may bring a user down to
    ///
    /// Only spending is bounded by it. Charges are always allowed to raise a balance that sits
    /// below the floor, which is where every user starts.
    #[serde(default)]
    pub min_points: u64,
}

pub const DEFAULT_MAX_POINTS: u64 = 1_000_000;

fn default_max_points() -> u64 {
    DEFAULT_MAX_POINTS
}

impl Default for PointPolicy {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MAX_POINTS,
            min_points: 0,
        }
    }
}

/// Reason a mutation was refused by [`PointPolicy`]
#[derive(Debug, PartialEq, Eq)]
pub enum Rejection {
    InvalidAmount,
    LimitExceeded,
    InsufficientBalance,
}

impl PointPolicy {
    /// Validate a requested amount, returning it as an unsigned quantity
    pub fn check_amount(&self, amount: i64) -> Result<u64, Rejection> {
        match u64::try_from(amount) {
            Ok(amount) if amount > 0 => Ok(amount),
            _ => Err(Rejection::InvalidAmount),
        }
    }

    /// New balance after charging `amount` onto `current`
    pub fn charged(&self, current: u64, amount: u64) -> Result<u64, Rejection> {
        current
            .checked_add(amount)
            .filter(|points| *points <= self.max_points)
            .ok_or(Rejection::LimitExceeded)
    }

    /// New balance after using `amount` from `current`
    pub fn used(&self, current: u64, amount: u64) -> Result<u64, Rejection> {
        current
            .checked_sub(amount)
            .filter(|points| *points >= self.min_points)
            .ok_or(Rejection::InsufficientBalance)
    }
}
