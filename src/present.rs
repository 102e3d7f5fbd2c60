use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;

use crate::{classify::Severity, state::MachineSnapshot};

/// How long a banner stays up unless dismissed.
pub const DEFAULT_NOTIFICATION_TTL: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub text: String,
    pub severity: Severity,
}

impl Notification {
    pub fn new(text: impl Into<String>, severity: Severity) -> Self {
        Self {
            text: text.into(),
            severity,
        }
    }
}

/// Renders the mirrored machine. Called after every refresh, so it must be
/// idempotent over the latest snapshot.
pub trait View: Send + Sync {
    fn render(&self, snapshot: &MachineSnapshot);

    /// `Some(label)` while an action is in flight, `None` once it settles.
    fn busy(&self, label: Option<&str>);
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmRequest {
    pub header: String,
    pub title: String,
    pub detail: String,
    pub confirm_label: String,
    pub cancel_label: String,
}

impl ConfirmRequest {
    pub fn cancel_transaction() -> Self {
        Self {
            header: "Cancelar Transacción".to_string(),
            title: "¿Está seguro de que desea cancelar la transacción?".to_string(),
            detail: "Se devolverá el dinero insertado".to_string(),
            confirm_label: "Sí, cancelar".to_string(),
            cancel_label: "No, continuar".to_string(),
        }
    }
}

/// Asks the user a yes/no question; resolves to `false` on dismissal.
pub trait Prompt: Send + Sync {
    fn confirm(&self, request: ConfirmRequest) -> BoxFuture<'_, bool>;
}

/// Answers every confirmation with a fixed value (`--yes`, scripted runs).
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Prompt for FixedAnswer {
    fn confirm(&self, _request: ConfirmRequest) -> BoxFuture<'_, bool> {
        let answer = self.0;
        Box::pin(async move { answer })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveNotification {
    pub id: u64,
    pub notification: Notification,
    pub expires_at: Instant,
}

/// Tracks banners that are still visible.
#[derive(Debug)]
pub struct NotificationCenter {
    ttl: Duration,
    next_id: u64,
    active: Vec<ActiveNotification>,
}

impl NotificationCenter {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            next_id: 1,
            active: Vec::new(),
        }
    }

    /// Returns the new banner's id. Repeats get their own banner.
    pub fn push(&mut self, notification: Notification, now: Instant) -> u64 {
        self.prune(now);
        let id = self.next_id;
        self.next_id += 1;
        self.active.push(ActiveNotification {
            id,
            notification,
            expires_at: now + self.ttl,
        });
        id
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.active.len();
        self.active.retain(|a| a.id != id);
        self.active.len() != before
    }

    pub fn dismiss_all(&mut self) {
        self.active.clear();
    }

    pub fn prune(&mut self, now: Instant) {
        self.active.retain(|a| a.expires_at > now);
    }

    pub fn active(&mut self, now: Instant) -> &[ActiveNotification] {
        self.prune(now);
        &self.active
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_TTL)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn banners_expire_after_ttl() {
        let start = Instant::now();
        let mut center = NotificationCenter::new(Duration::from_secs(4));
        center.push(Notification::new("Pago confirmado", Severity::Success), start);

        assert_eq!(center.active(start + Duration::from_secs(3)).len(), 1);
        assert!(center.active(start + Duration::from_secs(4)).is_empty());
    }

    #[test]
    fn identical_banners_each_get_an_id() {
        let start = Instant::now();
        let mut center = NotificationCenter::new(Duration::from_secs(4));
        let n = Notification::new("Producto agotado", Severity::Warning);

        assert_eq!(center.push(n.clone(), start), 1);
        assert_eq!(center.push(n.clone(), start + Duration::from_secs(1)), 2);
        assert_eq!(center.active(start + Duration::from_secs(2)).len(), 2);
        assert_eq!(center.active(start + Duration::from_secs(4)).len(), 1);
    }

    #[test]
    fn dismiss_removes_only_the_given_banner() {
        let now = Instant::now();
        let mut center = NotificationCenter::default();
        let a = center.push(Notification::new("a", Severity::Info), now);
        let b = center.push(Notification::new("b", Severity::Info), now);

        assert!(center.dismiss(a));
        assert!(!center.dismiss(a));
        let ids: Vec<u64> = center.active(now).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![b]);

        center.dismiss_all();
        assert!(center.active(now).is_empty());
    }

    #[tokio::test]
    async fn fixed_answer_resolves_immediately() {
        assert!(FixedAnswer(true).confirm(ConfirmRequest::cancel_transaction()).await);
        assert!(!FixedAnswer(false).confirm(ConfirmRequest::cancel_transaction()).await);
    }
}
