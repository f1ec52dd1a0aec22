//! Binary entry point for the drydock CLI.

mod cli;

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use drydock::config::{ConnectionConfig, discovery, load_provider_config};
use drydock::{
    ActionError, ActionRunner, Collaborators, ConsoleUi, FileIdentityStore, GoogleConnector,
    InterruptFlag, LifecycleState, NoGuestHooks, RunOptions, SshInfo, StdinConfirmer, TcpProbe,
    Verb, install_ctrl_c_handler,
};

use crate::cli::{Cli, Command, DestroyCommand};

const LOG_ENV_VAR: &str = "DRYDOCK_LOG";
const EXIT_FAILURE: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error("machine '{0}' has no SSH endpoint; is it running?")]
    NoSshInfo(String),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

impl CliError {
    const fn exit_code(&self) -> i32 {
        match self {
            Self::Action(ActionError::Interrupted) => EXIT_INTERRUPTED,
            _ => EXIT_FAILURE,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            err.exit_code()
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

const fn verb_for(command: &Command) -> Verb {
    match command {
        Command::Up => Verb::Up,
        Command::Halt => Verb::Halt,
        Command::Destroy(_) => Verb::Destroy,
        Command::Reload => Verb::Reload,
        Command::Provision => Verb::Provision,
        Command::Status => Verb::ReadState,
        Command::SshConfig => Verb::ReadSshInfo,
    }
}

const fn options_for(command: &Command) -> RunOptions {
    RunOptions {
        force_destroy: matches!(command, Command::Destroy(DestroyCommand { force: true })),
    }
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let Cli { machine, command } = cli;
    let runner = build_runner(&machine)?;
    let outcome = runner
        .run(verb_for(&command), &machine, options_for(&command))
        .await?;
    outcome.result?;

    match command {
        Command::Status => {
            write_status(io::stdout(), &machine, outcome.context.machine_state)?;
        }
        Command::SshConfig => {
            let ssh = outcome
                .context
                .ssh_info
                .ok_or_else(|| CliError::NoSshInfo(machine.clone()))?;
            write_ssh_config(io::stdout(), &machine, &ssh)?;
        }
        _ => {}
    }
    Ok(())
}

fn build_runner(label: &str) -> Result<ActionRunner, CliError> {
    let connection = ConnectionConfig::load_without_cli_args()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let provider =
        load_provider_config(&discovery()).map_err(|err| CliError::Config(err.to_string()))?;
    let config = provider
        .with_default_project(&connection.project_id)
        .finalize();

    let cwd = std::env::current_dir().map_err(|err| CliError::Config(err.to_string()))?;
    let root = Utf8PathBuf::from_path_buf(cwd).map_err(|path| {
        CliError::Config(format!("non UTF-8 working directory: {}", path.display()))
    })?;

    let interrupt = InterruptFlag::new();
    drop(install_ctrl_c_handler(interrupt.clone()));

    let collaborators = Collaborators {
        ui: Arc::new(ConsoleUi::new(label)),
        connector: Arc::new(GoogleConnector::new(connection)),
        communicator: Arc::new(TcpProbe),
        hooks: Arc::new(NoGuestHooks),
        confirmer: Arc::new(StdinConfirmer),
    };
    Ok(ActionRunner::new(
        collaborators,
        Arc::new(config),
        Arc::new(FileIdentityStore::new(root)),
        interrupt,
    ))
}

fn write_status(
    mut target: impl Write,
    label: &str,
    state: Option<LifecycleState>,
) -> io::Result<()> {
    let state = state.map_or_else(|| String::from("unknown"), |state| state.to_string());
    writeln!(target, "{label}: {state}")
}

fn write_ssh_config(mut target: impl Write, label: &str, ssh: &SshInfo) -> io::Result<()> {
    writeln!(target, "Host {label}")?;
    writeln!(target, "  HostName {}", ssh.host)?;
    writeln!(target, "  Port {}", ssh.port)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
