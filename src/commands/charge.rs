use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    domain::{Balance, TransactionType, UserId},
    ports::{balance::BalanceStorePort, history::HistoryStorePort},
};
use tower::{Service, ServiceExt};
use tracing::{info, info_span, warn, Instrument};

use super::{mutate, DomainLogic, Error};

/// Add points to a user's balance
#[derive(Clone, Debug)]
pub struct ChargeRequest {
    pub user_id: UserId,
    /// Requested amount; anything below 1 is rejected
    pub amount: i64,
}

impl<B, H> Service<ChargeRequest> for DomainLogic<B, H>
where
    B: BalanceStorePort + 'static,
    H: HistoryStorePort + 'static,
{
    type Response = Balance;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ChargeRequest) -> Self::Future {
        let balances = self.balances.clone();
        let history = self.history.clone();
        let locks = self.locks.clone();
        let policy = self.policy;
        let span = info_span!("charge", user_id = %req.user_id, amount = req.amount);

        Box::pin(
            async move {
                // Reject invalid amounts before touching the stores
                let amount = policy
                    .check_amount(req.amount)
                    .map_err(|_| Error::InvalidAmount { amount: req.amount })
                    .inspect_err(|err| warn!(%err, "charge rejected"))?;

                let guard = locks.acquire(req.user_id).await?;
                let (balance, transaction) = mutate(
                    guard,
                    balances,
                    history,
                    amount,
                    TransactionType::Charge,
                    move |current_points| {
                        policy
                            .charged(current_points, amount)
                            .map_err(|_| Error::LimitExceeded {
                                current_points,
                                amount,
                                max_points: policy.max_points,
                            })
                            .inspect_err(|err| warn!(%err, "charge rejected"))
                    },
                )
                .await?;
                info!(
                    points = balance.points,
                    transaction_id = transaction.id,
                    "charge committed"
                );

                Ok(balance)
            }
            .instrument(span),
        )
    }
}

impl<B, H> DomainLogic<B, H>
where
    B: BalanceStorePort + 'static,
    H: HistoryStorePort + 'static,
{
    /// Charge `amount` points onto the user's balance, returning the updated balance
    pub async fn charge(&self, user_id: UserId, amount: i64) -> Result<Balance, Error> {
        self.clone()
            .oneshot(ChargeRequest { user_id, amount })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        commands::ErrorKind,
        domain::{PointPolicy, Transaction},
        ports::{balance::MockBalanceStorePort, history::MockHistoryStorePort},
    };
    use chrono::Utc;
    use mockall::{predicate::*, Sequence};
    use rstest::*;
    use speculoos::prelude::*;
    use std::sync::Arc;
    use tower::BoxError;

    #[fixture]
    fn user_id() -> UserId {
        UserId(1)
    }

    fn balance(user_id: UserId, points: u64) -> Balance {
        Balance {
            user_id,
            points,
            updated_at: Utc::now(),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_call(user_id: UserId) -> Result<(), BoxError> {
        // GIVEN
        // * a user holding 1000 points
        // * a history store accepting the record
        let mut seq = Sequence::new();
        let mut balances = MockBalanceStorePort::new();
        balances
            .expect_get()
            .times(1)
            .with(eq(user_id))
            .in_sequence(&mut seq)
            .returning(|user_id| Ok(balance(user_id, 1000)));
        balances
            .expect_set()
            .times(1)
            .with(eq(user_id), eq(6000))
            .in_sequence(&mut seq)
            .returning(|user_id, points| Ok(balance(user_id, points)));
        let mut history = MockHistoryStorePort::new();
        history
            .expect_append()
            .times(1)
            .with(eq(user_id), eq(5000), eq(TransactionType::Charge), always())
            .in_sequence(&mut seq)
            .returning(|user_id, amount, kind, timestamp| {
                Ok(Transaction {
                    id: 2,
                    user_id,
                    amount,
                    kind,
                    timestamp,
                })
            });

        let mut domain = DomainLogic::new(Arc::new(balances), Arc::new(history));

        // WHEN calling the service
        let req = ChargeRequest {
            user_id,
            amount: 5000,
        };
        let res = ServiceExt::<ChargeRequest>::ready(&mut domain)
            .await?
            .call(req)
            .await;

        // THEN
        // * It returns the updated balance
        // * The balance is written before the history record
        assert_that!(res)
            .is_ok()
            .matches(|balance| balance.user_id == user_id && balance.points == 6000);
        Arc::into_inner(domain.balances).unwrap().checkpoint();
        Arc::into_inner(domain.history).unwrap().checkpoint();

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_invalid_amount(
        user_id: UserId,
        #[values(0, -1, -5000)] amount: i64,
    ) -> Result<(), BoxError> {
        // GIVEN stores that must not be touched
        let mut balances = MockBalanceStorePort::new();
        balances.expect_get().never();
        balances.expect_set().never();
        let mut history = MockHistoryStorePort::new();
        history.expect_append().never();

        let mut domain = DomainLogic::new(Arc::new(balances), Arc::new(history));

        // WHEN charging a non-positive amount
        let res = ServiceExt::<ChargeRequest>::ready(&mut domain)
            .await?
            .call(ChargeRequest { user_id, amount })
            .await;

        // THEN it is rejected as an invalid amount
        assert_that!(res.map_err(|err| err.kind()))
            .is_err()
            .is_equal_to(ErrorKind::InvalidAmount);

        Ok(())
    }

    #[rstest]
    #[case(1_000_000, 1)]
    #[case(1_000_000, 1000)]
    #[case(999_000, 1001)]
    #[tokio::test]
    async fn test_limit_exceeded(
        user_id: UserId,
        #[case] current: u64,
        #[case] amount: i64,
    ) -> Result<(), BoxError> {
        // GIVEN a balance near the maximum
        let mut balances = MockBalanceStorePort::new();
        balances
            .expect_get()
            .times(1)
            .returning(move |user_id| Ok(balance(user_id, current)));
        balances.expect_set().never();
        let mut history = MockHistoryStorePort::new();
        history.expect_append().never();

        let mut domain = DomainLogic::new(Arc::new(balances), Arc::new(history));

        // WHEN charging past the maximum
        let res = ServiceExt::<ChargeRequest>::ready(&mut domain)
            .await?
            .call(ChargeRequest { user_id, amount })
            .await;

        // THEN nothing is written
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::LimitExceeded { max_points: 1_000_000, .. }));

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_configured_maximum(user_id: UserId) -> Result<(), BoxError> {
        let mut balances = MockBalanceStorePort::new();
        balances
            .expect_get()
            .returning(|user_id| Ok(balance(user_id, 90)));
        balances.expect_set().never();
        let mut history = MockHistoryStorePort::new();
        history.expect_append().never();

        let policy = PointPolicy {
            max_points: 100,
            min_points: 0,
        };
        let domain = DomainLogic::with_policy(Arc::new(balances), Arc::new(history), policy);

        let res = domain.charge(user_id, 11).await;

        assert_that!(res.map_err(|err| err.kind()))
            .is_err()
            .is_equal_to(ErrorKind::LimitExceeded);

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_history_failure_restores_balance(user_id: UserId) -> Result<(), BoxError> {
        // GIVEN a history store that fails on append
        let previous = balance(user_id, 1000);
        let stored = previous.clone();
        let mut seq = Sequence::new();
        let mut balances = MockBalanceStorePort::new();
        balances
            .expect_get()
            .returning(move |_| Ok(stored.clone()));
        balances
            .expect_set()
            .times(1)
            .with(eq(user_id), eq(1500))
            .in_sequence(&mut seq)
            .returning(|user_id, points| Ok(balance(user_id, points)));
        let mut history = MockHistoryStorePort::new();
        history
            .expect_append()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| {
                Err(crate::ports::history::Error::Adapter("disk full".into()))
            });
        balances
            .expect_restore()
            .times(1)
            .with(eq(previous))
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let domain = DomainLogic::new(Arc::new(balances), Arc::new(history));

        // WHEN charging
        let res = domain.charge(user_id, 500).await;

        // THEN the failure surfaces as unexpected and the previous record is put back as is
        assert_that!(res.map_err(|err| err.kind()))
            .is_err()
            .is_equal_to(ErrorKind::Unexpected);
        Arc::into_inner(domain.balances).unwrap().checkpoint();

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_balance_failure(user_id: UserId) -> Result<(), BoxError> {
        let mut balances = MockBalanceStorePort::new();
        balances
            .expect_get()
            .returning(|_| Err(crate::ports::balance::Error::Adapter("offline".into())));
        balances.expect_set().never();
        let mut history = MockHistoryStorePort::new();
        history.expect_append().never();

        let domain = DomainLogic::new(Arc::new(balances), Arc::new(history));

        let res = domain.charge(user_id, 500).await;

        assert_that!(res.map_err(|err| err.kind()))
            .is_err()
            .is_equal_to(ErrorKind::Unexpected);

        Ok(())
    }
}
