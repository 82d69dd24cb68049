use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    commands::{DomainLogic, Error},
    domain::{Balance, UserId},
    ports::{balance::BalanceStorePort, history::HistoryStorePort},
};
use tower::{Service, ServiceExt};
use tracing::{debug, debug_span, Instrument};

#[derive(Clone, Debug)]
pub struct GetBalanceRequest {
    pub user_id: UserId,
}

impl<B, H> Service<GetBalanceRequest> for DomainLogic<B, H>
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

    fn call(&mut self, req: GetBalanceRequest) -> Self::Future {
        let balances = self.balances.clone();
        let locks = self.locks.clone();
        let span = debug_span!("get_balance", user_id = %req.user_id);

        Box::pin(
            async move {
                let _guard = locks.acquire(req.user_id).await?;
                let balance = balances.get(req.user_id).await?;
                debug!(points = balance.points, "balance read");

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
    /// Current balance of the user
    ///
    /// A user that never transacted gets a zero balance, which is not stored.
    pub async fn get_balance(&self, user_id: UserId) -> Result<Balance, Error> {
        self.clone().oneshot(GetBalanceRequest { user_id }).await
    }
}
