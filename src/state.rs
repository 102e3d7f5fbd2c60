use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::{Amount, MachineState, Product, Transaction, sort_products};

/// Client-side mirror of the server-owned machine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MachineSnapshot {
    pub state: MachineState,
    pub products: BTreeMap<String, Product>,
    /// False until the catalogue has been fetched at least once.
    pub products_loaded: bool,
    pub transaction: Option<Transaction>,
    /// `None` until the first successful fetch.
    pub available_cash: Option<Amount>,
    pub history: Vec<Transaction>,
    /// Bumped on every update.
    pub revision: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MachineSnapshot {
    pub fn sorted_products(&self) -> Vec<Product> {
        let mut products: Vec<Product> = self.products.values().cloned().collect();
        sort_products(&mut products);
        products
    }
}

/// Shared handle to the mirror. Every write goes through a named update.
#[derive(Debug, Clone, Default)]
pub struct MirrorHandle {
    inner: Arc<RwLock<MachineSnapshot>>,
}

impl MirrorHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> MachineSnapshot {
        self.inner.read().await.clone()
    }

    pub async fn set_state(&self, state: MachineState) {
        self.update(|snap| {
            if snap.state != state {
                info!(from = %snap.state, to = %state, "machine state changed");
            }
            snap.state = state;
        })
        .await;
    }

    pub async fn set_available_cash(&self, amount: Amount) {
        self.update(|snap| snap.available_cash = Some(amount)).await;
    }

    pub async fn set_products(&self, products: BTreeMap<String, Product>) {
        self.update(|snap| {
            snap.products = products;
            snap.products_loaded = true;
        })
        .await;
    }

    pub async fn set_transaction(&self, transaction: Option<Transaction>) {
        self.update(|snap| {
            if let (Some(prev), Some(next)) = (&snap.transaction, &transaction)
                && prev.id.is_some()
                && prev.id == next.id
                && next.amount_paid < prev.amount_paid
            {
                warn!(
                    transaction_id = ?next.id,
                    previous = prev.amount_paid,
                    reported = next.amount_paid,
                    "backend reported a lower paid amount for the active transaction"
                );
            }
            snap.transaction = transaction;
        })
        .await;
    }

    pub async fn clear_transaction(&self) {
        self.set_transaction(None).await;
    }

    pub async fn set_history(&self, history: Vec<Transaction>) {
        self.update(|snap| snap.history = history).await;
    }

    async fn update(&self, f: impl FnOnce(&mut MachineSnapshot)) {
        let mut snap = self.inner.write().await;
        f(&mut snap);
        snap.revision = snap.revision.saturating_add(1);
        snap.updated_at = Some(Utc::now());
    }
}
