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

/// Spend points from a user's balance
#[derive(Clone, Debug)]
pub struct UsePointsRequest {
    pub user_id: UserId,
    /// Requested amount; anything below 1 is rejected, same as for charges
    pub amount: i64,
}

impl<B, H> Service<UsePointsRequest> for DomainLogic<B, H>
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

    fn call(&mut self, req: UsePointsRequest) -> Self::Future {
        let balances = self.balances.clone();
        let history = self.history.clone();
        let locks = self.locks.clone();
        let policy = self.policy;
        let span = info_span!("use_points", user_id = %req.user_id, amount = req.amount);

        Box::pin(
            async move {
                let amount = policy
                    .check_amount(req.amount)
                    .map_err(|_| Error::InvalidAmount { amount: req.amount })
                    .inspect_err(|err| warn!(%err, "use rejected"))?;

                let guard = locks.acquire(req.user_id).await?;
                let (balance, transaction) = mutate(
                    guard,
                    balances,
                    history,
                    amount,
                    TransactionType::Use,
                    move |current_points| {
                        policy
                            .used(current_points, amount)
                            .map_err(|_| Error::InsufficientBalance {
                                current_points,
                                amount,
                            })
                            .inspect_err(|err| warn!(%err, "use rejected"))
                    },
                )
                .await?;
                info!(
                    points = balance.points,
                    transaction_id = transaction.id,
                    "use committed"
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
    /// Use `amount` points from the user's balance, returning the updated balance
    pub async fn use_points(&self, user_id: UserId, amount: i64) -> Result<Balance, Error> {
        self.clone()
            .oneshot(UsePointsRequest { user_id, amount })
            .await
    }
}
