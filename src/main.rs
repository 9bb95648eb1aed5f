//! Binary entry point for the boxlift CLI.

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use boxlift::{
    BrightboxConfig, ComputeActionRunner, ConfigError, Interrupt, NoopStage, PipelineSettings,
    ProvisionError, ProvisionOutcome, ProvisionPipeline, ProvisionState, RequestOverrides,
    SharedUi, SshConfig, SshConfigError, SshTransport, StderrUi, TerminateError,
    TerminationHandler,
};

mod cli;

use cli::{Cli, DestroyCommand, UpCommand};

/// Exit status used when the run was interrupted, matching shells' 128 + SIGINT.
const EXIT_INTERRUPTED: i32 = 130;
const LOG_ENV: &str = "BOXLIFT_LOG";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("ssh configuration error: {0}")]
    Ssh(#[from] SshConfigError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Terminate(#[from] TerminateError),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Up(command) => up(command).await,
        Cli::Destroy(command) => destroy(command).await,
    }
}

async fn up(args: UpCommand) -> Result<i32, CliError> {
    let config = BrightboxConfig::load_without_cli_args()?.with_overrides(&overrides_from(args));
    let request = config.as_request()?;
    let backend = config.backend()?;
    let ssh = SshConfig::load_without_cli_args()?;
    let settings = PipelineSettings {
        reachability_timeout: ssh.reachability_bound(),
        ..PipelineSettings::default()
    };
    let transport = SshTransport::with_process_runner(ssh)?;

    let ui: SharedUi = Arc::new(StderrUi);
    let terminator =
        TerminationHandler::new(ComputeActionRunner::new(backend.clone()), Arc::clone(&ui));
    let pipeline = ProvisionPipeline::new(backend, transport, terminator, NoopStage, Arc::clone(&ui))
        .with_settings(settings);

    let interrupt = Interrupt::new();
    listen_for_interrupt(interrupt.clone());
    let mut state = ProvisionState::new(interrupt);

    match pipeline.run(&request, &mut state).await {
        Ok(ProvisionOutcome::Ready) => {
            writeln!(io::stdout(), "{}", state.instance_id().unwrap_or_default()).ok();
            Ok(0)
        }
        Ok(ProvisionOutcome::Aborted) => Ok(EXIT_INTERRUPTED),
        Err(err) => {
            if let Err(recover_err) = pipeline.recover(&err, &mut state).await {
                ui.warn(&format!("cleanup failed: {recover_err}"));
            }
            if let Some(id) = state.instance_id() {
                ui.warn(&format!(
                    "server {id} may still exist; remove it with `boxlift destroy {id}`"
                ));
            }
            Err(err.into())
        }
    }
}

async fn destroy(args: DestroyCommand) -> Result<i32, CliError> {
    let config = BrightboxConfig::load_without_cli_args()?;
    let backend = config.backend()?;
    let handler = TerminationHandler::new(ComputeActionRunner::new(backend), Arc::new(StderrUi));
    let mut state = ProvisionState::for_instance(args.server_id, Interrupt::new());
    handler.terminate(&mut state).await?;
    Ok(0)
}

fn overrides_from(args: UpCommand) -> RequestOverrides {
    RequestOverrides {
        image_id: args.image,
        server_name: args.name,
        zone: args.zone,
        server_type: args.server_type,
        server_groups: args.groups,
        user_data: args.user_data,
        user_data_file: args.user_data_file,
        server_build_timeout: args.build_timeout,
    }
}

fn listen_for_interrupt(interrupt: Interrupt) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received");
            interrupt.trigger();
        }
    });
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
