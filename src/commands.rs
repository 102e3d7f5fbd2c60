use std::{process::ExitCode, sync::Arc};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::{
    api::ApiClient,
    classify::Classifier,
    config::{Command, Config, WatchArgs},
    console::{
        CONSOLE_HELP, ConsoleCommand, DialoguerPrompt, Sections, TerminalNotifier, TerminalView,
        render_history, render_products, render_snapshot, render_status, render_transaction,
    },
    controller::{ActionOutcome, AmountSource, Controller},
    poller::{RefreshSchedule, spawn_poller},
    present::{FixedAnswer, Prompt},
};

const NO_TRANSACTION: &str = "No hay ninguna transacción en proceso";

pub async fn run(config: Config, command: Command) -> Result<ExitCode> {
    match command {
        Command::Classify(args) => {
            let classifier = Classifier::default();
            let classification = classifier.explain(&args.message);
            match (args.explain, classification.rule) {
                (true, Some(rule)) => println!("{} (rule: {rule})", classification.severity),
                (true, None) => println!("{} (fallback)", classification.severity),
                (false, _) => println!("{}", classification.severity),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch(args) => watch(&config, args).await,
        Command::History(args) if args.follow => follow_history(&config).await,
        Command::Status => {
            let api = client(&config)?;
            let (state, cash) = tokio::join!(api.state(), api.available_cash());
            print!("{}", render_status(&state?, Some(cash?)));
            Ok(ExitCode::SUCCESS)
        }
        Command::Products => {
            let api = client(&config)?;
            let mut products: Vec<_> = api.products().await?.into_values().collect();
            crate::domain::sort_products(&mut products);
            print!("{}", render_products(&products));
            Ok(ExitCode::SUCCESS)
        }
        Command::Current => {
            // The backend reports "no transaction" through an error envelope.
            match client(&config)?.current_transaction().await {
                Ok(Some(tx)) => print!("{}", render_transaction(Some(&tx))),
                Ok(None) => println!("{NO_TRANSACTION}"),
                Err(err) => {
                    debug!(%err, "no current transaction");
                    println!("{NO_TRANSACTION}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::History(_) => {
            let history = client(&config)?.history().await?;
            print!("{}", render_history(&history));
            Ok(ExitCode::SUCCESS)
        }
        Command::Select(args) => {
            one_shot(&config, Arc::new(FixedAnswer(true)), |c| async move {
                c.select_product(&args.code).await
            })
            .await
        }
        Command::Insert(args) => {
            let source = if args.preset {
                AmountSource::Preset
            } else {
                AmountSource::Custom
            };
            one_shot(&config, Arc::new(FixedAnswer(true)), |c| async move {
                c.insert_money(args.amount, source).await
            })
            .await
        }
        Command::Confirm => {
            one_shot(&config, Arc::new(FixedAnswer(true)), |c| async move {
                c.confirm_payment().await
            })
            .await
        }
        Command::Dispense => {
            one_shot(&config, Arc::new(FixedAnswer(true)), |c| async move {
                c.dispense().await
            })
            .await
        }
        Command::Cancel(args) => {
            let prompt: Arc<dyn Prompt> = if args.yes {
                Arc::new(FixedAnswer(true))
            } else {
                Arc::new(DialoguerPrompt)
            };
            one_shot(&config, prompt, |c| async move {
                c.cancel_transaction().await
            })
            .await
        }
        Command::Reset => {
            one_shot(&config, Arc::new(FixedAnswer(true)), |c| async move {
                c.reset_machine().await
            })
            .await
        }
    }
}

fn client(config: &Config) -> Result<ApiClient> {
    ApiClient::new(&config.api_base_url, config.request_timeout())
}

fn controller(
    config: &Config,
    view: Arc<TerminalView>,
    prompt: Arc<dyn Prompt>,
) -> Result<Controller> {
    Ok(Controller::new(
        client(config)?,
        view,
        Arc::new(TerminalNotifier::new(config.notification_ttl())),
        prompt,
    ))
}

/// Runs one action, then prints the machine as it looks afterwards.
async fn one_shot<F, Fut>(
    config: &Config,
    prompt: Arc<dyn Prompt>,
    action: F,
) -> Result<ExitCode>
where
    F: FnOnce(Arc<Controller>) -> Fut,
    Fut: Future<Output = ActionOutcome>,
{
    let view = Arc::new(TerminalView::buffered(Sections::MACHINE));
    let controller = Arc::new(controller(config, view.clone(), prompt)?);
    let outcome = action(controller).await;
    view.flush();
    Ok(exit_code(&outcome))
}

fn exit_code(outcome: &ActionOutcome) -> ExitCode {
    if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn follow_history(config: &Config) -> Result<ExitCode> {
    let view = Arc::new(TerminalView::live(Sections::HISTORY));
    let controller = controller(config, view, Arc::new(FixedAnswer(false)))?;
    let poller = spawn_poller(controller.refresher(), RefreshSchedule::history_only(config));
    let _ = tokio::signal::ctrl_c().await;
    poller.shutdown().await;
    Ok(ExitCode::SUCCESS)
}

async fn watch(config: &Config, args: WatchArgs) -> Result<ExitCode> {
    let sections = if args.history {
        Sections::ALL
    } else {
        Sections::MACHINE
    };
    let view = Arc::new(TerminalView::live(sections));
    let notifier = Arc::new(TerminalNotifier::new(config.notification_ttl()));
    let controller = Controller::new(
        client(config)?,
        view,
        notifier.clone(),
        Arc::new(DialoguerPrompt),
    );

    info!(api = %config.api_base_url, "connecting to machine");
    // Failures are already shown to the user; polling keeps retrying.
    let _ = controller.load_initial().await;
    let poller = spawn_poller(
        controller.refresher(),
        RefreshSchedule::from_config(config, args.history),
    );
    print!("{CONSOLE_HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match ConsoleCommand::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(Some(command)) => dispatch(&controller, &notifier, command).await,
                    Err(message) => eprintln!("{message}"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.shutdown().await;
    Ok(ExitCode::SUCCESS)
}

async fn dispatch(
    controller: &Controller,
    notifier: &TerminalNotifier,
    command: ConsoleCommand,
) {
    match command {
        ConsoleCommand::Select(code) => {
            controller.select_product(&code).await;
        }
        ConsoleCommand::Insert(amount, source) => {
            controller.insert_money(amount, source).await;
        }
        ConsoleCommand::Confirm => {
            controller.confirm_payment().await;
        }
        ConsoleCommand::Dispense => {
            controller.dispense().await;
        }
        ConsoleCommand::Cancel => {
            controller.cancel_transaction().await;
        }
        ConsoleCommand::Reset => {
            controller.reset_machine().await;
        }
        ConsoleCommand::Show => {
            let snapshot = controller.snapshot().await;
            print!(
                "{}",
                render_snapshot(&snapshot, Sections::MACHINE)
            );
        }
        ConsoleCommand::History => {
            if controller.refresh_history().await.is_ok() {
                print!("{}", render_history(&controller.snapshot().await.history));
            } else {
                eprintln!("No se pudo cargar el historial");
            }
        }
        ConsoleCommand::Clear => notifier.dismiss_all(),
        ConsoleCommand::Help => print!("{CONSOLE_HELP}"),
        ConsoleCommand::Quit => {}
    }
}
