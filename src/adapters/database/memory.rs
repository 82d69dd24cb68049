use crate::{
    domain::{Balance, Transaction, TransactionType, UserId},
    ports::{
        balance::{self, BalanceStorePort},
        history::{self, HistoryStorePort},
    },
};
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

#[derive(Clone, Debug, Default)]
pub struct MemoryBalanceStore {
    balances: Arc<Mutex<HashMap<UserId, Balance>>>,
}

#[async_trait::async_trait]
impl BalanceStorePort for MemoryBalanceStore {
    async fn get(&self, user_id: UserId) -> Result<Balance, balance::Error> {
        // Absent users are not materialized on read
        let balance = self
            .balances
            .lock()?
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Balance::empty(user_id));

        Ok(balance)
    }

    async fn set(&self, user_id: UserId, points: u64) -> Result<Balance, balance::Error> {
        let balance = Balance {
            user_id,
            points,
            updated_at: Utc::now(),
        };
        self.balances.lock()?.insert(user_id, balance.clone());

        Ok(balance)
    }

    async fn restore(&self, previous: Balance) -> Result<(), balance::Error> {
        let mut balances = self.balances.lock()?;
        if previous == Balance::empty(previous.user_id) {
            balances.remove(&previous.user_id);
        } else {
            balances.insert(previous.user_id, previous);
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
struct HistoryTable {
    next_id: u64,
    by_user: HashMap<UserId, Vec<Transaction>>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryHistoryStore {
    table: Arc<Mutex<HistoryTable>>,
}

#[async_trait::async_trait]
impl HistoryStorePort for MemoryHistoryStore {
    async fn append(
        &self,
        user_id: UserId,
        amount: u64,
        kind: TransactionType,
        timestamp: DateTime<Utc>,
    ) -> Result<Transaction, history::Error> {
        let mut table = self.table.lock()?;
        table.next_id += 1;
        let transaction = Transaction {
            id: table.next_id,
            user_id,
            amount,
            kind,
            timestamp,
        };
        table
            .by_user
            .entry(user_id)
            .or_default()
            .push(transaction.clone());

        Ok(transaction)
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Transaction>, history::Error> {
        let transactions = self
            .table
            .lock()?
            .by_user
            .get(&user_id)
            .cloned()
            .unwrap_or_default();

        Ok(transactions)
    }
}

/// Erased [`PoisonError`]
///
/// `PoisonError` keeps the `MutexGuard` internally, which is not send. Thus we erase the error
/// and only keep the string representation instead.
#[derive(Debug, thiserror::Error)]
#[error("poison error: {0}")]
pub struct ErasedPoisonError(String);

impl<T> From<PoisonError<T>> for balance::Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError(err.to_string())))
    }
}

impl<T> From<PoisonError<T>> for history::Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError(err.to_string())))
    }
}
