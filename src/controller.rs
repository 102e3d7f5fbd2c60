use std::{fmt, future::Future, sync::Arc};

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::{
    api::{ApiClient, OperationError},
    classify::{Classifier, Severity},
    domain::{Amount, MIN_CUSTOM_AMOUNT, format_amount},
    present::{ConfirmRequest, Notification, Notifier, Prompt, View},
    refresh::Refresher,
    state::{MachineSnapshot, MirrorHandle},
};

pub const INITIAL_LOAD_FAILED: &str = "Error al cargar los datos de la máquina";
pub const PRODUCTS_LOAD_FAILED: &str = "Error al cargar productos";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Select,
    InsertMoney,
    ConfirmPayment,
    Dispense,
    Cancel,
    Reset,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::InsertMoney => "insert_money",
            Self::ConfirmPayment => "confirm_payment",
            Self::Dispense => "dispense",
            Self::Cancel => "cancel",
            Self::Reset => "reset",
        }
    }

    pub fn busy_label(self) -> &'static str {
        match self {
            Self::Select => "Seleccionando producto...",
            Self::InsertMoney => "Insertando dinero...",
            Self::ConfirmPayment => "Confirmando pago...",
            Self::Dispense => "Dispensando producto...",
            Self::Cancel => "Cancelando transacción...",
            Self::Reset => "Reiniciando máquina...",
        }
    }

    /// State, cash and the current transaction are always re-fetched; this
    /// says whether the catalogue is too (stock may have moved).
    pub fn refreshes_products(self) -> bool {
        !matches!(self, Self::InsertMoney | Self::ConfirmPayment)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an inserted amount came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountSource {
    /// One of the machine's bill/coin buttons.
    Preset,
    /// Typed by the user; subject to the minimum.
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The backend accepted the request.
    Completed { message: String, severity: Severity },
    /// The backend (or the network) refused it.
    Failed { message: String, severity: Severity },
    /// Refused locally; no request was sent.
    Invalid { message: String },
    /// The user declined the confirmation.
    Declined,
    /// Another action is still in flight.
    Busy,
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Declined)
    }
}

/// Drives user actions against the backend and keeps the mirror in step.
pub struct Controller {
    refresher: Refresher,
    classifier: Arc<Classifier>,
    view: Arc<dyn View>,
    notifier: Arc<dyn Notifier>,
    prompt: Arc<dyn Prompt>,
    in_flight: Semaphore,
}

impl Controller {
    pub fn new(
        api: ApiClient,
        view: Arc<dyn View>,
        notifier: Arc<dyn Notifier>,
        prompt: Arc<dyn Prompt>,
    ) -> Self {
        Self {
            refresher: Refresher::new(api, MirrorHandle::new(), view.clone()),
            classifier: Arc::new(Classifier::default()),
            view,
            notifier,
            prompt,
            in_flight: Semaphore::new(1),
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn refresher(&self) -> Refresher {
        self.refresher.clone()
    }

    pub fn mirror(&self) -> &MirrorHandle {
        self.refresher.mirror()
    }

    pub async fn snapshot(&self) -> MachineSnapshot {
        self.mirror().snapshot().await
    }

    /// Products, state+cash and the current transaction, fetched together.
    /// Any failure is reported once.
    pub async fn load_initial(&self) -> Result<(), OperationError> {
        let (products, state, ()) = tokio::join!(
            self.refresher.refresh_products(),
            self.refresher.refresh_state(),
            self.refresher.refresh_transaction(),
        );
        if let Err(err) = products.and(state) {
            warn!(%err, "initial load failed");
            self.notify(INITIAL_LOAD_FAILED, Severity::Error);
            return Err(err);
        }
        info!("machine data loaded");
        Ok(())
    }

    pub async fn select_product(&self, code: &str) -> ActionOutcome {
        let code = code.trim();
        if code.is_empty() {
            return self.invalid("Debe indicar un código de producto");
        }
        self.perform(Action::Select, self.refresher.api().select_product(code))
            .await
    }

    pub async fn insert_money(&self, amount: Amount, source: AmountSource) -> ActionOutcome {
        if amount == 0 {
            return self.invalid("El monto debe ser mayor a cero");
        }
        if source == AmountSource::Custom && amount < MIN_CUSTOM_AMOUNT {
            return self.invalid(&format!(
                "El monto mínimo es ${}",
                format_amount(MIN_CUSTOM_AMOUNT)
            ));
        }
        self.perform(Action::InsertMoney, self.refresher.api().insert_money(amount))
            .await
    }

    pub async fn confirm_payment(&self) -> ActionOutcome {
        self.perform(Action::ConfirmPayment, self.refresher.api().confirm_payment())
            .await
    }

    pub async fn dispense(&self) -> ActionOutcome {
        self.perform(Action::Dispense, self.refresher.api().dispense())
            .await
    }

    /// Asks for confirmation first; a declined prompt sends nothing.
    pub async fn cancel_transaction(&self) -> ActionOutcome {
        if self.in_flight.available_permits() == 0 {
            debug!(action = %Action::Cancel, "action refused: another action in flight");
            return ActionOutcome::Busy;
        }
        if !self
            .prompt
            .confirm(ConfirmRequest::cancel_transaction())
            .await
        {
            debug!("cancel declined");
            return ActionOutcome::Declined;
        }
        self.perform(Action::Cancel, self.refresher.api().cancel())
            .await
    }

    pub async fn reset_machine(&self) -> ActionOutcome {
        self.perform(Action::Reset, self.refresher.api().reset())
            .await
    }

    pub async fn refresh_history(&self) -> Result<(), OperationError> {
        self.refresher.refresh_history().await
    }

    async fn perform(
        &self,
        action: Action,
        request: impl Future<Output = Result<String, OperationError>>,
    ) -> ActionOutcome {
        let Ok(_permit) = self.in_flight.try_acquire() else {
            debug!(%action, "action refused: another action in flight");
            return ActionOutcome::Busy;
        };

        self.view.busy(Some(action.busy_label()));
        let outcome = match request.await {
            Ok(message) => {
                let severity = self.classifier.classify(&message);
                info!(%action, %severity, %message, "action completed");
                self.notify(&message, severity);
                ActionOutcome::Completed { message, severity }
            }
            Err(err) => {
                let severity = self.failure_severity(&err);
                warn!(%action, %severity, %err, "action failed");
                let message = err.message().to_string();
                self.notify(&message, severity);
                ActionOutcome::Failed { message, severity }
            }
        };

        self.refresh_after(action).await;
        self.view.busy(None);
        outcome
    }

    async fn refresh_after(&self, action: Action) {
        let products = async {
            if action.refreshes_products()
                && let Err(err) = self.refresher.refresh_products().await
            {
                warn!(%action, %err, "product refresh failed");
                self.notify(PRODUCTS_LOAD_FAILED, Severity::Error);
            }
        };
        let state = async {
            if let Err(err) = self.refresher.refresh_state().await {
                warn!(%action, %err, "state refresh failed");
            }
        };
        tokio::join!(state, self.refresher.refresh_transaction(), products);
    }

    /// Server-supplied text is classified; a failure without one is an error.
    fn failure_severity(&self, err: &OperationError) -> Severity {
        match err.server_message() {
            Some(message) => self.classifier.classify(message),
            None => Severity::Error,
        }
    }

    fn invalid(&self, message: &str) -> ActionOutcome {
        self.notify(message, Severity::Error);
        ActionOutcome::Invalid {
            message: message.to_string(),
        }
    }

    fn notify(&self, text: &str, severity: Severity) {
        self.notifier.notify(Notification::new(text, severity));
    }
}
