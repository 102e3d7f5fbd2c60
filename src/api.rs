use std::{collections::BTreeMap, fmt, time::Duration};

use reqwest::{Method, StatusCode, Url, header::CONTENT_TYPE};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

use crate::domain::{Amount, MachineState, Product, Transaction, de_amount};

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080/maquinaexpendedora/api/maquina";

/// Shown when the backend fails without saying why.
pub const GENERIC_FAILURE_MESSAGE: &str = "Error en la operación";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    State,
    Products,
    Select,
    InsertMoney,
    ConfirmPayment,
    Dispense,
    Cancel,
    CurrentTransaction,
    History,
    Reset,
    AvailableCash,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Self::State => "estado",
            Self::Products => "productos",
            Self::Select => "seleccionar",
            Self::InsertMoney => "insertar-dinero",
            Self::ConfirmPayment => "confirmar-pago",
            Self::Dispense => "dispensar",
            Self::Cancel => "cancelar",
            Self::CurrentTransaction => "transaccion-actual",
            Self::History => "historial",
            Self::Reset => "reiniciar",
            Self::AvailableCash => "dinero-disponible",
        }
    }

    pub fn method(self) -> Method {
        match self {
            Self::State
            | Self::Products
            | Self::CurrentTransaction
            | Self::History
            | Self::AvailableCash => Method::GET,
            Self::Select
            | Self::InsertMoney
            | Self::ConfirmPayment
            | Self::Dispense
            | Self::Cancel
            | Self::Reset => Method::POST,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} /{}", self.method(), self.path())
    }
}

/// `{success, message?, data?}` wrapper returned by every endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug)]
pub enum OperationError {
    /// No HTTP response (connect failure, timeout, broken body).
    Transport {
        endpoint: Endpoint,
        source: reqwest::Error,
    },
    /// Non-2xx response.
    Status {
        endpoint: Endpoint,
        status: StatusCode,
        message: Option<String>,
    },
    /// 2xx envelope with `success: false`.
    Rejected {
        endpoint: Endpoint,
        message: Option<String>,
    },
    /// 2xx body that is not an envelope, or whose data has the wrong shape.
    Decode { endpoint: Endpoint, reason: String },
    MissingData { endpoint: Endpoint },
}

impl OperationError {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::Transport { endpoint, .. }
            | Self::Status { endpoint, .. }
            | Self::Rejected { endpoint, .. }
            | Self::Decode { endpoint, .. }
            | Self::MissingData { endpoint } => *endpoint,
        }
    }

    /// Message supplied by the backend, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } | Self::Rejected { message, .. } => message
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty()),
            _ => None,
        }
    }

    /// Text to show the user.
    pub fn message(&self) -> &str {
        self.server_message().unwrap_or(GENERIC_FAILURE_MESSAGE)
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { endpoint, source } => write!(f, "{endpoint}: transport: {source}"),
            Self::Status {
                endpoint, status, ..
            } => write!(f, "{endpoint}: http {status}: {}", self.message()),
            Self::Rejected { endpoint, .. } => {
                write!(f, "{endpoint}: rejected: {}", self.message())
            }
            Self::Decode { endpoint, reason } => write!(f, "{endpoint}: decode: {reason}"),
            Self::MissingData { endpoint } => write!(f, "{endpoint}: missing data"),
        }
    }
}

impl std::error::Error for OperationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct WireAmount(#[serde(deserialize_with = "de_amount")] Amount);

/// Typed client for the machine REST API. Cheap to clone.
///
/// Every call is a single attempt: failures are returned to the caller as-is.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base: Url,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("invalid api base url {base_url:?}: {e}"))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            anyhow::bail!("invalid api base url {base_url:?}: expected an http(s) origin");
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("vending/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { base, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn url(&self, endpoint: Endpoint, arg: Option<&str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(endpoint.path());
            if let Some(arg) = arg {
                segments.push(arg);
            }
        }
        url
    }

    pub async fn state(&self) -> Result<MachineState, OperationError> {
        self.call(Endpoint::State, None).await
    }

    pub async fn products(&self) -> Result<BTreeMap<String, Product>, OperationError> {
        self.call(Endpoint::Products, None).await
    }

    pub async fn available_cash(&self) -> Result<Amount, OperationError> {
        let WireAmount(amount) = self.call(Endpoint::AvailableCash, None).await?;
        Ok(amount)
    }

    /// `Ok(None)` when the backend reports success with no transaction.
    pub async fn current_transaction(&self) -> Result<Option<Transaction>, OperationError> {
        self.call_optional(Endpoint::CurrentTransaction, None).await
    }

    pub async fn history(&self) -> Result<Vec<Transaction>, OperationError> {
        Ok(self
            .call_optional(Endpoint::History, None)
            .await?
            .unwrap_or_default())
    }

    pub async fn select_product(&self, code: &str) -> Result<String, OperationError> {
        self.call(Endpoint::Select, Some(code)).await
    }

    pub async fn insert_money(&self, amount: Amount) -> Result<String, OperationError> {
        self.call(Endpoint::InsertMoney, Some(&amount.to_string()))
            .await
    }

    pub async fn confirm_payment(&self) -> Result<String, OperationError> {
        self.call(Endpoint::ConfirmPayment, None).await
    }

    pub async fn dispense(&self) -> Result<String, OperationError> {
        self.call(Endpoint::Dispense, None).await
    }

    pub async fn cancel(&self) -> Result<String, OperationError> {
        self.call(Endpoint::Cancel, None).await
    }

    pub async fn reset(&self) -> Result<String, OperationError> {
        self.call(Endpoint::Reset, None).await
    }

    pub async fn call<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        arg: Option<&str>,
    ) -> Result<T, OperationError> {
        self.call_optional(endpoint, arg)
            .await?
            .ok_or(OperationError::MissingData { endpoint })
    }

    pub async fn call_optional<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        arg: Option<&str>,
    ) -> Result<Option<T>, OperationError> {
        let envelope = self.send(endpoint, arg).await?;
        match envelope.data {
            None | Some(Value::Null) => Ok(None),
            Some(data) => serde_json::from_value(data)
                .map(Some)
                .map_err(|e| OperationError::Decode {
                    endpoint,
                    reason: e.to_string(),
                }),
        }
    }

    async fn send(
        &self,
        endpoint: Endpoint,
        arg: Option<&str>,
    ) -> Result<Envelope<Value>, OperationError> {
        let url = self.url(endpoint, arg);
        debug!(%endpoint, %url, "api request");

        let transport = |source| OperationError::Transport { endpoint, source };
        let resp = self
            .client
            .request(endpoint.method(), url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(transport)?;
        let parsed = serde_json::from_slice::<Envelope<Value>>(&body);

        if !status.is_success() {
            let message = parsed.ok().and_then(|e| e.message);
            debug!(%endpoint, %status, ?message, "api request failed");
            return Err(OperationError::Status {
                endpoint,
                status,
                message,
            });
        }

        let envelope = parsed.map_err(|e| OperationError::Decode {
            endpoint,
            reason: e.to_string(),
        })?;
        if !envelope.success {
            debug!(%endpoint, message = ?envelope.message, "api request rejected");
            return Err(OperationError::Rejected {
                endpoint,
                message: envelope.message,
            });
        }
        Ok(envelope)
    }
}
