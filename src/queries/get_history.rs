use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    commands::{DomainLogic, Error},
    domain::{Transaction, UserId},
    ports::{balance::BalanceStorePort, history::HistoryStorePort},
};
use tower::{Service, ServiceExt};
use tracing::{debug, debug_span, Instrument};

#[derive(Clone, Debug)]
pub struct GetHistoryRequest {
    pub user_id: UserId,
}

impl<B, H> Service<GetHistoryRequest> for DomainLogic<B, H>
where
    B: BalanceStorePort + 'static,
    H: HistoryStorePort + 'static,
{
    /// Snapshot of the history, oldest first
    type Response = Vec<Transaction>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: GetHistoryRequest) -> Self::Future {
        let history = self.history.clone();
        let locks = self.locks.clone();
        let span = debug_span!("get_history", user_id = %req.user_id);

        Box::pin(
            async move {
                let _guard = locks.acquire(req.user_id).await?;
                let transactions = history.list_by_user(req.user_id).await?;
                debug!(count = transactions.len(), "history read");

                Ok(transactions)
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
    /// Every committed transaction of the user, in commit order
    pub async fn get_history(&self, user_id: UserId) -> Result<Vec<Transaction>, Error> {
        self.clone().oneshot(GetHistoryRequest { user_id }).await
    }
}
