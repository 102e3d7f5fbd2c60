use std::{fmt, sync::LazyLock};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Success => "✅",
            Self::Error => "❌",
            Self::Warning => "⚠️",
            Self::Info => "ℹ️",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicate over a message that has already been trimmed and lowercased.
///
/// Needles must be lowercase. `All(vec![])` matches everything and
/// `Any(vec![])` matches nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    StartsWith(&'static str),
    Contains(&'static str),
    All(Vec<Matcher>),
    Any(Vec<Matcher>),
}

impl Matcher {
    pub fn contains_any(needles: &[&'static str]) -> Self {
        Self::Any(needles.iter().copied().map(Self::Contains).collect())
    }

    pub fn contains_all(needles: &[&'static str]) -> Self {
        Self::All(needles.iter().copied().map(Self::Contains).collect())
    }

    fn matches(&self, normalized: &str) -> bool {
        match self {
            Self::StartsWith(prefix) => normalized.starts_with(prefix),
            Self::Contains(needle) => normalized.contains(needle),
            Self::All(matchers) => matchers.iter().all(|m| m.matches(normalized)),
            Self::Any(matchers) => matchers.iter().any(|m| m.matches(normalized)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: &'static str,
    pub matcher: Matcher,
    pub severity: Severity,
}

impl Rule {
    pub fn new(name: &'static str, matcher: Matcher, severity: Severity) -> Self {
        Self {
            name,
            matcher,
            severity,
        }
    }
}

/// Result of classifying a message, including which rule decided it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub severity: Severity,
    /// `None` when no rule matched and the fallback applied.
    pub rule: Option<&'static str>,
}

/// Ordered rule table; the first matching rule wins.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<Rule>,
    fallback: Severity,
}

impl Classifier {
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            fallback: Severity::Info,
        }
    }

    /// Appends a rule after the existing ones, ahead of the fallback.
    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn classify(&self, message: &str) -> Severity {
        self.explain(message).severity
    }

    pub fn explain(&self, message: &str) -> Classification {
        let normalized = message.trim().to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(&normalized))
            .map(|rule| Classification {
                severity: rule.severity,
                rule: Some(rule.name),
            })
            .unwrap_or(Classification {
                severity: self.fallback,
                rule: None,
            })
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::with_rules(default_rules())
    }
}

static DEFAULT_CLASSIFIER: LazyLock<Classifier> = LazyLock::new(Classifier::default);

/// Classifies a backend status message with the built-in rule table.
pub fn classify(message: &str) -> Severity {
    DEFAULT_CLASSIFIER.classify(message)
}

/// Rule table for the backend's Spanish status messages.
pub fn default_rules() -> Vec<Rule> {
    use Matcher::{All, Contains, StartsWith};
    use Severity::{Error, Info, Success, Warning};

    vec![
        // Technical failures.
        Rule::new("error-prefix", StartsWith("error:"), Error),
        Rule::new(
            "system-failure",
            Matcher::contains_any(&[
                "error en",
                "no encontrado",
                "problemas técnicos",
                "falla del sistema",
                "fallo del sistema",
            ]),
            Error,
        ),
        // Completed steps.
        Rule::new(
            "step-completed",
            Matcher::contains_any(&[
                "producto dispensado",
                "gracias por su compra",
                "pago confirmado",
                "dispensando producto",
                "dinero adicional insertado",
                "máquina reiniciada correctamente",
            ]),
            Success,
        ),
        Rule::new(
            "product-selected",
            Matcher::contains_all(&["producto seleccionado", "inserte el dinero"]),
            Success,
        ),
        // Must run before the warning rules: "falta:" is normal progress.
        Rule::new(
            "payment-progress",
            All(vec![
                Contains("dinero insertado"),
                Matcher::contains_any(&["total:", "falta:", "presione confirmar"]),
            ]),
            Info,
        ),
        // Situations the user has to act on.
        Rule::new("out-of-stock", Contains("agotado"), Warning),
        Rule::new(
            "insufficient-payment",
            Matcher::contains_all(&["no es suficiente", "pago"]),
            Warning,
        ),
        Rule::new(
            "pending-action",
            Matcher::contains_any(&[
                "debe insertar el dinero suficiente",
                "debe confirmar el pago",
                "debe completar el pago",
                "primero debe seleccionar un producto",
                "complete la transacción o cancélela",
            ]),
            Warning,
        ),
        Rule::new(
            "already-in-progress",
            Matcher::contains_any(&[
                "ya hay un producto seleccionado",
                "ya hay una transacción en proceso",
                "esperando que termine",
                "siendo dispensado",
            ]),
            Warning,
        ),
        Rule::new(
            "insufficient-change",
            Contains("no hay suficiente cambio disponible"),
            Warning,
        ),
        Rule::new(
            "action-refused",
            Matcher::contains_any(&["no se puede cancelar", "no puede insertar dinero"]),
            Warning,
        ),
        // Neutral notices.
        Rule::new(
            "neutral-notice",
            Matcher::contains_any(&[
                "transacción cancelada",
                "dinero devuelto",
                "no hay transacción para cancelar",
                "no hay ninguna transacción",
                "el cambio se devuelve automáticamente",
                "no hay transacción en proceso",
                "no hay producto seleccionado para dispensar",
            ]),
            Info,
        ),
        // Contextual fallbacks for wording the rules above do not cover.
        Rule::new(
            "cancellation-context",
            All(vec![
                Contains("cancelad"),
                Matcher::contains_any(&["transacción", "dinero devuelto"]),
            ]),
            Info,
        ),
        Rule::new(
            "obligation-context",
            All(vec![
                Matcher::contains_any(&["debe", "primero"]),
                Matcher::contains_any(&["antes", "primero"]),
            ]),
            Warning,
        ),
        Rule::new(
            "already-context",
            All(vec![
                Contains("ya "),
                Matcher::contains_any(&["seleccionado", "proceso", "confirmado"]),
            ]),
            Warning,
        ),
    ]
}
