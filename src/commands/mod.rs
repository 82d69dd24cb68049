use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::OwnedMutexGuard;
use tracing::{error, Instrument};

use crate::{
    domain::{Balance, PointPolicy, Transaction, TransactionType, UserId},
    ports::{balance::BalanceStorePort, history::HistoryStorePort},
};

pub mod charge;
pub mod use_points;

/// Ledger service over a balance store and a history store
///
/// Every operation for a given user runs while holding that user's lock, so mutations for one
/// user are serialized while different users proceed independently.
pub struct DomainLogic<B, H> {
    pub(crate) balances: Arc<B>,
    pub(crate) history: Arc<H>,
    pub(crate) locks: UserLocks,
    pub(crate) policy: PointPolicy,
}

impl<B, H> DomainLogic<B, H> {
    pub fn new(balances: Arc<B>, history: Arc<H>) -> Self {
        Self::with_policy(balances, history, PointPolicy::default())
    }

    pub fn with_policy(balances: Arc<B>, history: Arc<H>, policy: PointPolicy) -> Self {
        Self {
            balances,
            history,
            locks: UserLocks::default(),
            policy,
        }
    }
}

// Clones share the stores and the lock table, so they can serve concurrent callers.
impl<B, H> Clone for DomainLogic<B, H> {
    fn clone(&self) -> Self {
        Self {
            balances: self.balances.clone(),
            history: self.history.clone(),
            locks: self.locks.clone(),
            policy: self.policy,
        }
    }
}

type LockTable = Arc<Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>>;

/// Table of per-user exclusion locks
///
/// The outer mutex only guards lookups in the table and is never held across an await. The
/// per-user locks are tokio mutexes, which grant access in FIFO order. An entry only lives while
/// some caller holds or waits for it.
#[derive(Clone, Debug, Default)]
pub struct UserLocks {
    locks: LockTable,
}

impl UserLocks {
    /// Wait for exclusive access to the user
    pub async fn acquire(&self, user_id: UserId) -> Result<UserGuard, Error> {
        let lock = self
            .locks
            .lock()
            .map_err(|err| Error::Unexpected(err.to_string().into()))?
            .entry(user_id)
            .or_default()
            .clone();
        let guard = lock.clone().lock_owned().await;

        Ok(UserGuard {
            user_id,
            lock,
            guard: Some(guard),
            table: self.locks.clone(),
        })
    }
}

/// Exclusive access to one user, released on drop
#[derive(Debug)]
pub struct UserGuard {
    user_id: UserId,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    table: LockTable,
}

impl UserGuard {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl Drop for UserGuard {
    fn drop(&mut self) {
        self.guard.take();

        // Clones are only handed out under the table mutex, so once the table and this guard
        // are the last two owners nobody else can reach the entry.
        let Ok(mut table) = self.table.lock() else {
            return;
        };
        let idle = table
            .get(&self.user_id)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2);
        if idle {
            table.remove(&self.user_id);
        }
    }
}

/// Read, validate and commit one mutation for the user behind `guard`
///
/// `next_points` maps the current point total to the new one, or rejects the mutation. The work
/// runs on its own task holding the guard, so a caller that stops polling (a timeout, a
/// `select!`) cannot cut it off between the balance write and the history append.
pub(crate) async fn mutate<B, H, F>(
    guard: UserGuard,
    balances: Arc<B>,
    history: Arc<H>,
    amount: u64,
    kind: TransactionType,
    next_points: F,
) -> Result<(Balance, Transaction), Error>
where
    B: BalanceStorePort + 'static,
    H: HistoryStorePort + 'static,
    F: FnOnce(u64) -> Result<u64, Error> + Send + 'static,
{
    let task = tokio::spawn(
        async move {
            let current = balances.get(guard.user_id()).await?;
            let points = next_points(current.points)?;
            commit(&*balances, &*history, &guard, current, points, amount, kind).await
        }
        .in_current_span(),
    );

    task.await.map_err(|err| Error::Unexpected(Box::new(err)))?
}

/// Write the new balance, then append the matching history record
///
/// Must run while holding the user's lock, which the `_held` guard stands for. If the append
/// fails, the previous record is restored before returning the error, so the two stores never
/// disagree once the lock is released.
async fn commit<B, H>(
    balances: &B,
    history: &H,
    _held: &UserGuard,
    current: Balance,
    points: u64,
    amount: u64,
    kind: TransactionType,
) -> Result<(Balance, Transaction), Error>
where
    B: BalanceStorePort + ?Sized,
    H: HistoryStorePort + ?Sized,
{
    let user_id = current.user_id;
    let updated = balances.set(user_id, points).await?;

    match history
        .append(user_id, amount, kind, updated.updated_at)
        .await
    {
        Ok(transaction) => Ok((updated, transaction)),
        Err(err) => {
            error!(%user_id, %kind, amount, error = %err, "history append failed, restoring balance");
            balances.restore(current).await?;
            Err(err.into())
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("amount must be greater than zero, got {amount}")]
    InvalidAmount { amount: i64 },

    #[error("charging {amount} onto {current_points} points exceeds the maximum of {max_points}")]
    LimitExceeded {
        current_points: u64,
        amount: u64,
        max_points: u64,
    },

    #[error("insufficient balance: cannot use {amount} from {current_points} points")]
    InsufficientBalance { current_points: u64, amount: u64 },

    /// Failure from an underlying store
    #[error("unexpected error: {0}")]
    Unexpected(Box<dyn std::error::Error + Send + Sync>),
}

/// Discriminant of an [`Error`], for callers that map failures onto their own vocabulary
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidAmount,
    LimitExceeded,
    InsufficientBalance,
    Unexpected,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            Error::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            Error::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Error::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}

impl From<crate::ports::balance::Error> for Error {
    fn from(err: crate::ports::balance::Error) -> Self {
        Self::Unexpected(Box::new(err))
    }
}

impl From<crate::ports::history::Error> for Error {
    fn from(err: crate::ports::history::Error) -> Self {
        Self::Unexpected(Box::new(err))
    }
}
