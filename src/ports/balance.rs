use crate::domain::{Balance, UserId};

/// Storage for the current point balance of each user
///
/// The store does not enforce any business rule: it records whatever it is told to. Ordering of
/// concurrent `set` calls for a single user is the caller's responsibility.
#[mockall::automock]
#[async_trait::async_trait]
pub trait BalanceStorePort: Send + Sync {
    /// Current balance for the user, or a zero balance if nothing was ever stored
    async fn get(&self, user_id: UserId) -> Result<Balance, Error>;

    /// Overwrite the balance for the user, stamping it with the current time
    async fn set(&self, user_id: UserId, points: u64) -> Result<Balance, Error>;

    /// Put back a record previously returned by `get`, timestamp included
    ///
    /// Restoring the zero record of a user with nothing stored removes whatever was written
    /// since, so the user reads as untouched again.
    async fn restore(&self, previous: Balance) -> Result<(), Error>;
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
