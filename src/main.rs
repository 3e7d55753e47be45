use std::io::IsTerminal;

use clap::Parser;
use inquire::Confirm;

use vmdeck::backend;
use vmdeck::backend::libvirt::LibvirtBackend;
use vmdeck::cli::{Cli, Command, NetworkCommand, OutputFormat};
use vmdeck::config::{self, BusyPolicy, Config};
use vmdeck::dispatch::delete::{StorageChoice, checked_storage, default_storage};
use vmdeck::dispatch::{ActionRequest, Dispatcher, Outcome};
use vmdeck::eligibility::delete_forces_off;
use vmdeck::error::DeckError;
use vmdeck::logging::{self, TerminalLog};
use vmdeck::nav::{RecordingNavigator, Route};
use vmdeck::network::{NetworkAction, NetworkKey};
use vmdeck::output;
use vmdeck::progress::ActionSpinner;
use vmdeck::store::Store;
use vmdeck::vm_state::{Connection, Vm, VmKey};
use vmdeck::{helpers, paths};

type Deck = Dispatcher<LibvirtBackend, RecordingNavigator>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let terminal = match (cli.output, cli.verbose) {
        (OutputFormat::Json, _) => TerminalLog::Off,
        (OutputFormat::Plain, true) => TerminalLog::Verbose,
        (OutputFormat::Plain, false) => TerminalLog::Normal,
    };
    let log_file = logging::init(terminal);

    let config = config::load_config(cli.config.as_deref())?;
    if let Err(e) = log_file.attach(&paths::log_file()) {
        tracing::debug!("action log unavailable: {e}");
    }

    let helpers = helpers::probe(&config.helpers).await;
    let deck = Dispatcher::new(
        backend::create_backend(&config),
        RecordingNavigator::new(),
        Store::default(),
        helpers,
    )
    .with_busy_policy(config.busy_policy());

    let connection = Connection::from(cli.connection);
    let format = cli.output;

    match cli.command {
        Command::List => {
            deck.refresh(connection).await?;
            let rows = deck.store().read(|s| output::vm_rows(s, deck.helpers()));
            print!("{}", output::render_vm_list(&rows, format));
        }
        Command::Actions { name } => {
            deck.refresh(connection).await?;
            let vm = deck.find(&VmKey::new(connection, name))?;
            print!("{}", output::render_actions(&vm, deck.helpers(), format));
        }
        Command::Delete {
            name,
            keep_storage,
            keep,
            yes,
        } => {
            deck.refresh(connection).await?;
            let key = VmKey::new(connection, name);
            let vm = deck.find(&key)?;

            let mut choices = default_storage(&vm);
            for choice in &mut choices {
                if keep_storage || keep.contains(&choice.disk.target) {
                    choice.checked = false;
                }
            }
            if !yes && !confirm_delete(&key, &vm, &choices)? {
                println!("Cancelled.");
                return Ok(());
            }

            let request = ActionRequest::Delete {
                storage: checked_storage(&choices),
            };
            run_action(&deck, &config, &key, request, format).await?;
        }
        Command::Network { action } => run_network(&deck, connection, action, format).await?,
        other => {
            let Some((name, request)) = other.into_vm_request() else {
                return Ok(());
            };
            deck.refresh(connection).await?;
            run_action(&deck, &config, &VmKey::new(connection, name), request, format).await?;
        }
    }

    Ok(())
}

/// Dispatch one VM action, show progress and report the outcome. A failed
/// action exits non-zero after its notification has been printed.
async fn run_action(
    deck: &Deck,
    config: &Config,
    key: &VmKey,
    request: ActionRequest,
    format: OutputFormat,
) -> miette::Result<()> {
    let action = request.action();
    let spinner = ActionSpinner::start(
        format!("{action} {}...", key.name),
        format == OutputFormat::Plain && std::io::stderr().is_terminal(),
    );

    let outcome = match deck.dispatch(key, request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            spinner.clear();
            return Err(e.into());
        }
    };

    if outcome == Outcome::Completed
        && action.shows_busy()
        && config.busy_policy() == BusyPolicy::StateChange
        && deck.navigator().last() != Some(Route::VmList)
    {
        spinner.set_message(format!("waiting for {} to change state...", key.name));
        if !deck.await_state_change(key, config.state_change_timeout()).await? {
            tracing::warn!(vm = %key, "state did not change before timeout");
        }
    }

    match &outcome {
        Outcome::Completed => spinner.succeed(format!("{action} {}", key.name)),
        Outcome::Failed { text, .. } => spinner.fail(text.clone()),
    }

    if let Some(line) = output::render_outcome(&key.name, action.as_str(), &outcome, format) {
        println!("{line}");
    }
    if format == OutputFormat::Plain && deck.navigator().last() == Some(Route::VmList) {
        println!("VM '{}' is no longer defined.", key.name);
    }

    match outcome {
        Outcome::Completed => Ok(()),
        Outcome::Failed { text, detail, .. } => Err(DeckError::ActionFailed { text, detail }.into()),
    }
}

async fn run_network(
    deck: &Deck,
    connection: Connection,
    command: NetworkCommand,
    format: OutputFormat,
) -> miette::Result<()> {
    deck.refresh_networks(connection).await?;

    let (name, action) = match command {
        NetworkCommand::List => {
            let rows = deck.store().read(output::network_rows);
            print!("{}", output::render_network_list(&rows, format));
            return Ok(());
        }
        NetworkCommand::Activate { name } => (name, NetworkAction::Activate),
        NetworkCommand::Deactivate { name } => (name, NetworkAction::Deactivate),
        NetworkCommand::Delete { name, yes } => {
            if !yes && !confirm(&format!("Delete network '{name}'?"))? {
                println!("Cancelled.");
                return Ok(());
            }
            (name, NetworkAction::Delete)
        }
    };

    let key = NetworkKey { connection, name };
    let outcome = deck.dispatch_network(&key, action).await?;
    if let Some(line) = output::render_outcome(&key.name, action.as_str(), &outcome, format) {
        println!("{line}");
    }
    match outcome {
        Outcome::Completed => Ok(()),
        Outcome::Failed { text, detail, .. } => Err(DeckError::ActionFailed { text, detail }.into()),
    }
}

fn confirm_delete(key: &VmKey, vm: &Vm, choices: &[StorageChoice]) -> Result<bool, DeckError> {
    println!("Deleting VM '{}' on the {} connection.", key.name, key.connection);
    if delete_forces_off(vm) {
        println!("  the VM is {} and will be forced off", vm.state);
    }
    if !vm.snapshots.is_empty() {
        println!("  {} snapshot(s) will be deleted", vm.snapshots.len());
    }
    for choice in choices {
        let source = choice
            .disk
            .file
            .as_deref()
            .or(choice.disk.volume.as_deref())
            .unwrap_or("-");
        let fate = if choice.checked { "delete" } else { "keep" };
        println!("  {fate:<6} {} {source}", choice.disk.target);
    }
    confirm("Delete this VM?")
}

fn confirm(question: &str) -> Result<bool, DeckError> {
    if !std::io::stdin().is_terminal() {
        return Err(DeckError::Validation {
            message: "refusing to delete without confirmation; pass --yes".into(),
        });
    }
    Confirm::new(question)
        .with_default(false)
        .prompt()
        .map_err(map_inquire_err)
}

fn map_inquire_err(e: inquire::InquireError) -> DeckError {
    match e {
        inquire::InquireError::OperationCanceled | inquire::InquireError::OperationInterrupted => {
            DeckError::Cancelled
        }
        other => DeckError::Validation {
            message: format!("prompt error: {other}"),
        },
    }
}
