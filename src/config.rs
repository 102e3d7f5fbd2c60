use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::api::DEFAULT_API_BASE_URL;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "vending",
    about = "Console client for the vending machine service",
    version = crate::version::VERSION,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Interactive console with live polling (default).
    Watch(WatchArgs),

    /// Print machine state and available cash.
    Status,

    /// Print the product catalogue grouped by category.
    Products,

    /// Print the transaction in progress, if any.
    Current,

    /// Print the transaction history.
    History(HistoryArgs),

    /// Select a product by code (e.g. A1).
    Select(SelectArgs),

    /// Insert money into the current transaction.
    Insert(InsertArgs),

    /// Confirm the inserted payment.
    Confirm,

    /// Dispense the paid product.
    Dispense,

    /// Cancel the current transaction and return the inserted money.
    Cancel(CancelArgs),

    /// Reset the machine.
    Reset,

    /// Classify a status message offline and print its severity.
    Classify(ClassifyArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct WatchArgs {
    /// Also poll and show the transaction history.
    #[arg(long)]
    pub history: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct HistoryArgs {
    /// Keep polling and reprint when the history changes.
    #[arg(long)]
    pub follow: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SelectArgs {
    #[arg(value_name = "CODE")]
    pub code: String,
}

#[derive(Args, Debug, Clone)]
pub struct InsertArgs {
    #[arg(value_name = "AMOUNT", value_parser = clap::value_parser!(u64).range(1..))]
    pub amount: u64,

    /// Treat the amount as a machine bill/coin button (no minimum).
    #[arg(long)]
    pub preset: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct CancelArgs {
    /// Skip the confirmation prompt.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ClassifyArgs {
    #[arg(value_name = "MESSAGE")]
    pub message: String,

    /// Also print the rule that matched.
    #[arg(long)]
    pub explain: bool,
}

#[derive(Args, Debug, Clone)]
pub struct Config {
    #[arg(
        long,
        global = true,
        env = "VENDING_API_BASE_URL",
        value_name = "URL",
        default_value = DEFAULT_API_BASE_URL
    )]
    pub api_base_url: String,

    #[arg(
        long = "state-interval-ms",
        global = true,
        env = "VENDING_STATE_INTERVAL_MS",
        value_name = "MS",
        default_value_t = 2000,
        value_parser = clap::value_parser!(u64).range(100..=60000)
    )]
    pub state_interval_ms: u64,

    #[arg(
        long = "history-interval-ms",
        global = true,
        env = "VENDING_HISTORY_INTERVAL_MS",
        value_name = "MS",
        default_value_t = 10000,
        value_parser = clap::value_parser!(u64).range(1000..=600000)
    )]
    pub history_interval_ms: u64,

    #[arg(
        long = "request-timeout-ms",
        global = true,
        env = "VENDING_REQUEST_TIMEOUT_MS",
        value_name = "MS",
        default_value_t = 5000,
        value_parser = clap::value_parser!(u64).range(100..=60000)
    )]
    pub request_timeout_ms: u64,

    /// How long a notification banner stays visible.
    #[arg(
        long = "notification-ttl-ms",
        global = true,
        env = "VENDING_NOTIFICATION_TTL_MS",
        value_name = "MS",
        default_value_t = 4000
    )]
    pub notification_ttl_ms: u64,
}

impl Config {
    pub fn state_interval(&self) -> Duration {
        Duration::from_millis(self.state_interval_ms)
    }

    pub fn history_interval(&self) -> Duration {
        Duration::from_millis(self.history_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::from_millis(self.notification_ttl_ms)
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            state_interval_ms: 2000,
            history_interval_ms: 10000,
            request_timeout_ms: 5000,
            notification_ttl_ms: 4000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_apply_when_flags_absent() {
        let cli = Cli::try_parse_from(["vending"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(cli.config.state_interval(), Duration::from_secs(2));
        assert_eq!(cli.config.history_interval(), Duration::from_secs(10));
        assert_eq!(cli.config.request_timeout(), Duration::from_secs(5));
        assert_eq!(cli.config.notification_ttl(), Duration::from_secs(4));
    }

    #[test]
    fn global_flags_apply_after_subcommand() {
        let cli = Cli::try_parse_from([
            "vending",
            "status",
            "--api-base-url",
            "http://machine.local:9000/api",
            "--request-timeout-ms",
            "250",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Command::Status)));
        assert_eq!(cli.config.api_base_url, "http://machine.local:9000/api");
        assert_eq!(cli.config.request_timeout_ms, 250);
    }

    #[test]
    fn parses_action_arguments() {
        let cli = Cli::try_parse_from(["vending", "insert", "5000", "--preset"]).unwrap();
        match cli.command {
            Some(Command::Insert(args)) => {
                assert_eq!(args.amount, 5000);
                assert!(args.preset);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["vending", "cancel", "-y"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Cancel(CancelArgs { yes: true }))));

        let cli = Cli::try_parse_from(["vending", "history", "--follow"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::History(HistoryArgs { follow: true }))
        ));
    }

    #[test]
    fn rejects_zero_insert_amount() {
        assert!(Cli::try_parse_from(["vending", "insert", "0"]).is_err());
        assert!(Cli::try_parse_from(["vending", "insert", "-5"]).is_err());
    }

    #[test]
    fn rejects_invalid_state_interval_ms() {
        let err = Cli::try_parse_from(["vending", "--state-interval-ms", "0"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("--state-interval-ms"));
        assert!(msg.contains("100..=60000"));
    }

    #[test]
    fn rejects_invalid_history_interval_ms() {
        let err = Cli::try_parse_from(["vending", "--history-interval-ms", "10"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("--history-interval-ms"));
        assert!(msg.contains("1000..=600000"));
    }

    #[test]
    fn rejects_invalid_request_timeout_ms() {
        let err = Cli::try_parse_from(["vending", "--request-timeout-ms", "60001"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("--request-timeout-ms"));
        assert!(msg.contains("100..=60000"));
    }
}
