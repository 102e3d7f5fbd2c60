use std::{cmp::Ordering, fmt, sync::LazyLock};

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Whole currency units.
pub type Amount = u64;

/// Stock below this is shown as running low.
pub const LOW_STOCK_THRESHOLD: u32 = 5;

/// Smallest amount accepted when the user types a custom amount.
pub const MIN_CUSTOM_AMOUNT: Amount = 100;

/// Coarse machine status as reported by the backend.
///
/// Unknown wire values are preserved instead of rejected so a newer backend
/// never breaks state polling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MachineState {
    #[default]
    Selecting,
    AwaitingPayment,
    ProcessingPayment,
    Dispensing,
    NoChange,
    Other(String),
}

impl MachineState {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim() {
            "SELECCIONANDO" => Self::Selecting,
            "ESPERANDO_PAGO" => Self::AwaitingPayment,
            "PROCESANDO_PAGO" => Self::ProcessingPayment,
            "DISPENSANDO" => Self::Dispensing,
            "SIN_CAMBIO" => Self::NoChange,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Selecting => "SELECCIONANDO",
            Self::AwaitingPayment => "ESPERANDO_PAGO",
            Self::ProcessingPayment => "PROCESANDO_PAGO",
            Self::Dispensing => "DISPENSANDO",
            Self::NoChange => "SIN_CAMBIO",
            Self::Other(raw) => raw,
        }
    }

    /// True while a purchase is in progress on the server.
    pub fn has_transaction(&self) -> bool {
        matches!(
            self,
            Self::AwaitingPayment | Self::ProcessingPayment | Self::Dispensing | Self::NoChange
        )
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MachineState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MachineState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default)]
    pub description: Option<String>,
    #[serde(rename = "precio", deserialize_with = "de_amount")]
    pub price: Amount,
    pub stock: u32,
}

impl Product {
    pub fn is_available(&self) -> bool {
        self.stock > 0
    }

    pub fn is_low_stock(&self) -> bool {
        self.stock < LOW_STOCK_THRESHOLD
    }

    pub fn category(&self) -> Option<char> {
        self.code.chars().next().map(|c| c.to_ascii_uppercase())
    }
}

static PRODUCT_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z])(\d+)$").expect("valid product code regex"));

/// A product code split into its shelf letter and slot number (`A10` -> `A`, `10`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProductCode {
    pub letter: char,
    pub number: u32,
}

impl ProductCode {
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = PRODUCT_CODE_RE.captures(raw.trim())?;
        let letter = caps[1].chars().next()?.to_ascii_uppercase();
        let number = caps[2].parse().ok()?;
        Some(Self { letter, number })
    }
}

impl fmt::Display for ProductCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.letter, self.number)
    }
}

/// Orders codes by letter, then by numeric suffix. Malformed codes sort last,
/// in plain string order.
pub fn compare_codes(a: &str, b: &str) -> Ordering {
    match (ProductCode::parse(a), ProductCode::parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

pub fn sort_products(products: &mut [Product]) {
    products.sort_by(|a, b| compare_codes(&a.code, &b.code));
}

pub fn category_name(letter: char) -> String {
    match letter {
        'A' => "Bebidas Gaseosas".to_string(),
        'B' => "Bebidas Naturales".to_string(),
        'C' => "Snacks y Dulces".to_string(),
        'D' => "Productos Premium".to_string(),
        other => format!("Categoría {other}"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    InProgress,
    Completed,
    Cancelled,
    Failed,
    Other(String),
}

impl TransactionStatus {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim() {
            "EN_PROCESO" => Self::InProgress,
            "COMPLETADA" => Self::Completed,
            "CANCELADA" => Self::Cancelled,
            "ERROR" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::InProgress => "EN_PROCESO",
            Self::Completed => "COMPLETADA",
            Self::Cancelled => "CANCELADA",
            Self::Failed => "ERROR",
            Self::Other(raw) => raw,
        }
    }
}

impl Serialize for TransactionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TransactionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "producto")]
    pub product: Product,
    #[serde(rename = "montoPagado", deserialize_with = "de_amount")]
    pub amount_paid: Amount,
    #[serde(
        rename = "fechaTransaccion",
        default,
        deserialize_with = "de_lenient_datetime"
    )]
    pub created_at: Option<NaiveDateTime>,
    #[serde(rename = "estado", default)]
    pub status: Option<TransactionStatus>,
}

/// Where a transaction stands relative to the product price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentProgress {
    Remaining(Amount),
    Change(Amount),
}

impl Transaction {
    pub fn is_paid(&self) -> bool {
        self.amount_paid >= self.product.price
    }

    pub fn progress(&self) -> PaymentProgress {
        if self.is_paid() {
            PaymentProgress::Change(self.amount_paid - self.product.price)
        } else {
            PaymentProgress::Remaining(self.product.price - self.amount_paid)
        }
    }

    pub fn change(&self) -> Option<Amount> {
        match self.progress() {
            PaymentProgress::Change(change) => Some(change),
            PaymentProgress::Remaining(_) => None,
        }
    }
}

/// Formats an amount with `.` thousands separators (`50000` -> `50.000`).
pub fn format_amount(amount: Amount) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

/// Converts a JSON number into whole currency units; the backend serializes
/// amounts as doubles.
pub fn amount_from_f64(raw: f64) -> Option<Amount> {
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    Some(raw.round() as Amount)
}

pub(crate) fn de_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    amount_from_f64(raw).ok_or_else(|| serde::de::Error::custom(format!("invalid amount: {raw}")))
}

fn de_lenient_datetime<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<NaiveDateTime>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .and_then(|s| s.parse::<NaiveDateTime>().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn product(code: &str, price: Amount) -> Product {
        Product {
            code: code.to_string(),
            name: format!("Producto {code}"),
            description: None,
            price,
            stock: 10,
        }
    }

    #[test]
    fn product_sort_is_letter_then_number() {
        let mut products: Vec<Product> = ["B2", "A10", "A2", "B1"]
            .into_iter()
            .map(|c| product(c, 1000))
            .collect();
        sort_products(&mut products);
        let codes: Vec<&str> = products.iter().map(|p| p.code.as_str()).collect();
        assert_eq!(codes, vec!["A2", "A10", "B1", "B2"]);
    }

    #[test]
    fn malformed_codes_sort_after_valid_ones() {
        assert_eq!(compare_codes("Z9", "??"), Ordering::Less);
        assert_eq!(compare_codes("bad", "A1"), Ordering::Greater);
        assert_eq!(compare_codes("a3", "A3"), Ordering::Equal);
    }

    #[test]
    fn product_code_parse_normalizes_letter() {
        assert_eq!(
            ProductCode::parse(" c12 "),
            Some(ProductCode {
                letter: 'C',
                number: 12
            })
        );
        assert_eq!(ProductCode::parse("12"), None);
        assert_eq!(ProductCode::parse("AB1"), None);
    }

    #[test]
    fn machine_state_keeps_unknown_values() {
        assert_eq!(
            MachineState::from_wire("ESPERANDO_PAGO"),
            MachineState::AwaitingPayment
        );
        let state: MachineState = serde_json::from_value(json!("MANTENIMIENTO")).unwrap();
        assert_eq!(state, MachineState::Other("MANTENIMIENTO".to_string()));
        assert_eq!(state.to_string(), "MANTENIMIENTO");
        assert!(!MachineState::Selecting.has_transaction());
        assert!(MachineState::Dispensing.has_transaction());
    }

    #[test]
    fn decodes_backend_transaction_with_float_amounts() {
        let raw = json!({
            "id": "9b1f",
            "producto": {
                "codigo": "A1",
                "nombre": "Coca-Cola",
                "precio": 4000.0,
                "stock": 7,
                "descripcion": "Gaseosa 350ml"
            },
            "montoPagado": 5000.0,
            "cambio": 1000.0,
            "fechaTransaccion": "2025-05-01T10:15:30.123456",
            "estado": "EN_PROCESO"
        });
        let tx: Transaction = serde_json::from_value(raw).unwrap();
        assert_eq!(tx.product.price, 4000);
        assert_eq!(tx.amount_paid, 5000);
        assert_eq!(tx.status, Some(TransactionStatus::InProgress));
        assert!(tx.created_at.is_some());
        assert_eq!(tx.progress(), PaymentProgress::Change(1000));
    }

    #[test]
    fn unparseable_timestamp_does_not_reject_transaction() {
        let raw = json!({
            "producto": { "codigo": "B1", "nombre": "Agua", "precio": 2500, "stock": 0 },
            "montoPagado": 1000,
            "fechaTransaccion": [2025, 5, 1, 10, 15]
        });
        let tx: Transaction = serde_json::from_value(raw).unwrap();
        assert_eq!(tx.created_at, None);
        assert_eq!(tx.progress(), PaymentProgress::Remaining(1500));
        assert!(!tx.product.is_available());
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let raw = json!({ "codigo": "A1", "nombre": "x", "precio": -1.0, "stock": 1 });
        assert!(serde_json::from_value::<Product>(raw).is_err());
        assert_eq!(amount_from_f64(f64::NAN), None);
        assert_eq!(amount_from_f64(99.6), Some(100));
    }

    #[test]
    fn formats_thousands_with_dots() {
        assert_eq!(format_amount(0), "0");
        assert_eq!(format_amount(950), "950");
        assert_eq!(format_amount(1000), "1.000");
        assert_eq!(format_amount(50000), "50.000");
        assert_eq!(format_amount(1234567), "1.234.567");
    }

    #[test]
    fn category_names_fall_back_to_letter() {
        assert_eq!(category_name('A'), "Bebidas Gaseosas");
        assert_eq!(category_name('Q'), "Categoría Q");
        assert_eq!(product("d3", 1).category(), Some('D'));
    }
}
