use chrono::{DateTime, Utc};

use crate::domain::{Transaction, TransactionType, UserId};

/// Append-only log of committed transactions
#[mockall::automock]
#[async_trait::async_trait]
pub trait HistoryStorePort: Send + Sync {
    /// Record a transaction and return it with its assigned identifier
    ///
    /// Identifiers are unique across all users.
    async fn append(
        &self,
        user_id: UserId,
        amount: u64,
        kind: TransactionType,
        timestamp: DateTime<Utc>,
    ) -> Result<Transaction, Error>;

    /// All transactions of the user, in append order
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Transaction>, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
