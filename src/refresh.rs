use std::sync::Arc;

use tracing::debug;

use crate::{
    api::{ApiClient, OperationError},
    present::View,
    state::{MachineSnapshot, MirrorHandle},
};

/// Fetches one facet of the machine, writes it into the mirror and renders.
///
/// Shared by the poller and the controller so both paths update the mirror
/// the same way.
#[derive(Clone)]
pub struct Refresher {
    api: ApiClient,
    mirror: MirrorHandle,
    view: Arc<dyn View>,
}

impl Refresher {
    pub fn new(api: ApiClient, mirror: MirrorHandle, view: Arc<dyn View>) -> Self {
        Self { api, mirror, view }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn mirror(&self) -> &MirrorHandle {
        &self.mirror
    }

    /// State and available cash, fetched together. Whatever succeeded is
    /// applied; the first failure is returned.
    pub async fn refresh_state(&self) -> Result<(), OperationError> {
        let (state, cash) = tokio::join!(self.api.state(), self.api.available_cash());
        let mut failure = None;
        match state {
            Ok(state) => self.mirror.set_state(state).await,
            Err(err) => failure = Some(err),
        }
        match cash {
            Ok(amount) => self.mirror.set_available_cash(amount).await,
            Err(err) => {
                failure.get_or_insert(err);
            }
        }
        self.render().await;
        failure.map_or(Ok(()), Err)
    }

    /// Any failure is treated as "no transaction": the backend reports
    /// absence through an error envelope.
    pub async fn refresh_transaction(&self) {
        match self.api.current_transaction().await {
            Ok(transaction) => self.mirror.set_transaction(transaction).await,
            Err(err) => {
                debug!(%err, "no current transaction");
                self.mirror.clear_transaction().await;
            }
        }
        self.render().await;
    }

    pub async fn refresh_products(&self) -> Result<(), OperationError> {
        let products = self.api.products().await?;
        self.mirror.set_products(products).await;
        self.render().await;
        Ok(())
    }

    pub async fn refresh_history(&self) -> Result<(), OperationError> {
        let history = self.api.history().await?;
        self.mirror.set_history(history).await;
        self.render().await;
        Ok(())
    }

    pub async fn render(&self) -> MachineSnapshot {
        let snapshot = self.mirror.snapshot().await;
        self.view.render(&snapshot);
        snapshot
    }
}
