//! Terminal implementations of the presentation seams, plus the plain-text
//! renderers they share with the one-shot commands.

use std::{
    fmt::Write as _,
    sync::Mutex,
    time::{Duration, Instant},
};

use dialoguer::Confirm;
use futures_util::future::BoxFuture;
use tracing::warn;

use crate::{
    classify::Severity,
    domain::{
        Amount, MachineState, PaymentProgress, Product, Transaction, category_name, format_amount,
    },
    controller::AmountSource,
    present::{ConfirmRequest, Notification, NotificationCenter, Notifier, Prompt, View},
    state::MachineSnapshot,
};

pub fn money(amount: Amount) -> String {
    format!("${}", format_amount(amount))
}

pub fn render_status(state: &MachineState, available_cash: Option<Amount>) -> String {
    let cash = available_cash.map_or_else(|| "-".to_string(), money);
    format!("Estado: {state}   Dinero disponible: {cash}\n")
}

/// Products grouped under their category headings, in code order.
pub fn render_products(products: &[Product]) -> String {
    if products.is_empty() {
        return "No hay productos disponibles\n".to_string();
    }
    let mut out = String::new();
    let mut current: Option<Option<char>> = None;
    for product in products {
        let category = product.category();
        if current != Some(category) {
            let heading = category.map_or_else(|| "Otros".to_string(), category_name);
            let _ = writeln!(out, "== {heading} ==");
            current = Some(category);
        }
        let mut marker = String::new();
        if !product.is_available() {
            marker.push_str("  AGOTADO");
        } else if product.is_low_stock() {
            marker.push_str("  (stock bajo)");
        }
        let _ = writeln!(
            out,
            "  {:<4} {:<24} {:>10}  stock {:>3}{marker}",
            product.code,
            product.name,
            money(product.price),
            product.stock
        );
        if let Some(description) = product.description.as_deref().filter(|d| !d.is_empty()) {
            let _ = writeln!(out, "       {description}");
        }
    }
    out
}

/// Empty when there is no transaction: the panel is hidden.
pub fn render_transaction(transaction: Option<&Transaction>) -> String {
    let Some(tx) = transaction else {
        return String::new();
    };
    let mut out = String::from("-- Transacción actual --\n");
    let _ = writeln!(out, "  Producto: {} ({})", tx.product.name, tx.product.code);
    let _ = writeln!(out, "  Precio:   {}", money(tx.product.price));
    let _ = writeln!(out, "  Pagado:   {}", money(tx.amount_paid));
    match tx.progress() {
        PaymentProgress::Change(change) => {
            let _ = writeln!(out, "  Cambio:   {}", money(change));
        }
        PaymentProgress::Remaining(missing) => {
            let _ = writeln!(out, "  Falta:    {}", money(missing));
        }
    }
    out
}

pub fn render_history(history: &[Transaction]) -> String {
    if history.is_empty() {
        return "Sin transacciones registradas\n".to_string();
    }
    let mut out = String::from("-- Historial --\n");
    for tx in history {
        let when = tx
            .created_at
            .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
        let status = tx.status.as_ref().map_or("-", |s| s.as_str());
        let change = tx.change().map_or_else(|| "-".to_string(), money);
        let _ = writeln!(
            out,
            "  {when:<16}  {:<4} {:<20} pagado {:>10}  cambio {:>8}  {status}",
            tx.product.code,
            tx.product.name,
            money(tx.amount_paid),
            change
        );
    }
    out
}

pub fn render_snapshot(snapshot: &MachineSnapshot, sections: Sections) -> String {
    let mut out = String::new();
    if sections.machine {
        out.push_str(&render_status(&snapshot.state, snapshot.available_cash));
        out.push('\n');
        if snapshot.products_loaded {
            out.push_str(&render_products(&snapshot.sorted_products()));
        }
        let panel = render_transaction(snapshot.transaction.as_ref());
        if !panel.is_empty() {
            out.push('\n');
            out.push_str(&panel);
        }
    }
    if sections.history {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&render_history(&snapshot.history));
    }
    out
}

pub fn render_notification(notification: &Notification) -> String {
    format!(
        "{} [{}] {}",
        notification.severity.icon(),
        notification.severity,
        notification.text
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sections {
    pub machine: bool,
    pub history: bool,
}

impl Sections {
    pub const MACHINE: Self = Self {
        machine: true,
        history: false,
    };
    pub const HISTORY: Self = Self {
        machine: false,
        history: true,
    };
    pub const ALL: Self = Self {
        machine: true,
        history: true,
    };
}

/// Prints the machine to stdout.
///
/// Live views print on every change; buffered views keep only the latest
/// frame until `flush`.
#[derive(Debug)]
pub struct TerminalView {
    sections: Sections,
    live: bool,
    last: Mutex<Option<String>>,
}

impl TerminalView {
    pub fn live(sections: Sections) -> Self {
        Self {
            sections,
            live: true,
            last: Mutex::new(None),
        }
    }

    pub fn buffered(sections: Sections) -> Self {
        Self {
            sections,
            live: false,
            last: Mutex::new(None),
        }
    }

    pub fn flush(&self) {
        if let Ok(last) = self.last.lock()
            && let Some(frame) = last.as_deref()
        {
            print!("{frame}");
        }
    }

    /// Stores the frame; returns whether it differs from the previous one.
    fn store(&self, frame: String) -> bool {
        let Ok(mut last) = self.last.lock() else {
            return false;
        };
        if last.as_deref() == Some(frame.as_str()) {
            return false;
        }
        *last = Some(frame);
        true
    }
}

impl View for TerminalView {
    fn render(&self, snapshot: &MachineSnapshot) {
        let frame = render_snapshot(snapshot, self.sections);
        if self.store(frame.clone()) && self.live {
            println!("\n{frame}");
        }
    }

    fn busy(&self, label: Option<&str>) {
        if self.live
            && let Some(label) = label
        {
            println!("... {label}");
        }
    }
}

/// Prints every banner and tracks which are still visible.
#[derive(Debug)]
pub struct TerminalNotifier {
    center: Mutex<NotificationCenter>,
}

impl TerminalNotifier {
    pub fn new(ttl: Duration) -> Self {
        Self {
            center: Mutex::new(NotificationCenter::new(ttl)),
        }
    }

    pub fn dismiss_all(&self) {
        if let Ok(mut center) = self.center.lock() {
            center.dismiss_all();
        }
    }

    pub fn visible(&self) -> Vec<Notification> {
        self.center
            .lock()
            .map(|mut center| {
                center
                    .active(Instant::now())
                    .iter()
                    .map(|a| a.notification.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Notifier for TerminalNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut center) = self.center.lock() {
            center.push(notification.clone(), Instant::now());
        }
        let line = render_notification(&notification);
        if notification.severity == Severity::Error {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
}

/// Interactive yes/no through `dialoguer`; any prompt failure counts as "no".
#[derive(Debug, Clone, Copy, Default)]
pub struct DialoguerPrompt;

impl Prompt for DialoguerPrompt {
    fn confirm(&self, request: ConfirmRequest) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let text = format!(
                "{}: {} {} [{} / {}]",
                request.header,
                request.title,
                request.detail,
                request.confirm_label,
                request.cancel_label
            );
            let answer = tokio::task::spawn_blocking(move || {
                Confirm::new().with_prompt(text).default(false).interact()
            })
            .await;
            match answer {
                Ok(Ok(answer)) => answer,
                Ok(Err(err)) => {
                    warn!(%err, "confirmation prompt failed");
                    false
                }
                Err(err) => {
                    warn!(%err, "confirmation prompt task failed");
                    false
                }
            }
        })
    }
}

/// A line typed into the interactive console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Select(String),
    Insert(Amount, AmountSource),
    Confirm,
    Dispense,
    Cancel,
    Reset,
    Show,
    History,
    Clear,
    Help,
    Quit,
}

pub const CONSOLE_HELP: &str = "\
Comandos:
  select <CÓDIGO>   seleccionar producto (s)
  insert <MONTO>    insertar dinero (i), mínimo $100
  insert <MONTO> preset
                    billete/moneda de la máquina, sin mínimo
  confirm           confirmar pago (c)
  dispense          dispensar producto (d)
  cancel            cancelar transacción (x)
  reset             reiniciar máquina
  show              volver a mostrar la máquina (p)
  history           mostrar historial (h)
  clear             descartar notificaciones
  help              esta ayuda (?)
  quit              salir (q)
";

impl ConsoleCommand {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let verb_lower = verb.to_lowercase();
        let arg = words.next();
        let modifier = words.next();
        if words.next().is_some()
            || (modifier.is_some() && !matches!(verb_lower.as_str(), "insert" | "i"))
        {
            return Err(format!("Demasiados argumentos para '{verb}'"));
        }
        let command = match (verb_lower.as_str(), arg) {
            ("select" | "s", Some(code)) => Self::Select(code.to_uppercase()),
            ("select" | "s", None) => return Err("Uso: select <CÓDIGO>".to_string()),
            ("insert" | "i", Some(raw)) => {
                let source = match modifier.map(str::to_lowercase).as_deref() {
                    None => AmountSource::Custom,
                    Some("preset" | "p") => AmountSource::Preset,
                    Some(other) => {
                        return Err(format!(
                            "Modificador desconocido: '{other}' (use 'preset')"
                        ));
                    }
                };
                Self::Insert(parse_amount(raw)?, source)
            }
            ("insert" | "i", None) => return Err("Uso: insert <MONTO> [preset]".to_string()),
            ("confirm" | "c", None) => Self::Confirm,
            ("dispense" | "d", None) => Self::Dispense,
            ("cancel" | "x", None) => Self::Cancel,
            ("reset", None) => Self::Reset,
            ("show" | "p", None) => Self::Show,
            ("history" | "h", None) => Self::History,
            ("clear", None) => Self::Clear,
            ("help" | "?", None) => Self::Help,
            ("quit" | "q" | "exit", None) => Self::Quit,
            (_, Some(_)) if is_known(verb) => {
                return Err(format!("'{verb}' no acepta argumentos"));
            }
            _ => return Err(format!("Comando desconocido: '{verb}' (escriba 'help')")),
        };
        Ok(Some(command))
    }
}

fn is_known(verb: &str) -> bool {
    matches!(
        verb.to_lowercase().as_str(),
        "confirm"
            | "c"
            | "dispense"
            | "d"
            | "cancel"
            | "x"
            | "reset"
            | "show"
            | "p"
            | "history"
            | "h"
            | "clear"
            | "help"
            | "?"
            | "quit"
            | "q"
            | "exit"
    )
}

/// Accepts `5000`, `5.000` and `$5.000`.
fn parse_amount(raw: &str) -> Result<Amount, String> {
    let digits: String = raw
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != '.')
        .collect();
    digits
        .parse::<Amount>()
        .map_err(|_| format!("Monto inválido: '{raw}'"))
}
