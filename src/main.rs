#![forbid(unsafe_code)]

//! `xvfb-session`: run a command against a freshly reserved Xvfb display.
//!
//! Loads configuration, starts a display session, runs the wrapped command
//! with `DISPLAY` pointing at it, and stops the server afterwards. A
//! termination signal stops the server even if the command is still running.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use xvfb_session::cli::{Cli, Command, LogFormat, DEFAULT_LOG_FILTER};
use xvfb_session::publish::DISPLAY_ENV_VAR;
use xvfb_session::{readiness, reservation, AppError, DisplayNumber, Result};
use xvfb_session::{SessionCoordinator, XvfbConfig};

fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => XvfbConfig::load_from_path(path)?,
        None => XvfbConfig::default(),
    };

    match args.command {
        Command::Run { display, command } => {
            if display.is_some() {
                config.display = display;
                config.validate()?;
            }
            run_wrapped(config, &command).await
        }
        Command::Probe { display } => {
            let display_number: DisplayNumber = display.parse()?;
            let active = readiness::probe_display(&config.xset_binary, display_number).await?;
            info!(%display_number, active, "probe finished");
            Ok(if active {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Reserve => {
            let reserved = reservation::reserve(&config.port_search())?;
            println!("{}", reserved.display);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_wrapped(config: XvfbConfig, command: &[String]) -> Result<ExitCode> {
    let Some((program, program_args)) = command.split_first() else {
        return Err(AppError::Config("no command given".into()));
    };

    if config.skip {
        info!("xvfb start is skipped");
        let status = tokio::process::Command::new(program)
            .args(program_args)
            .status()
            .await
            .map_err(|err| AppError::SpawnFailed(format!("failed to run {program}: {err}")))?;
        return Ok(exit_code(status));
    }

    let mut coordinator = SessionCoordinator::new(config);
    let session = coordinator.start().await?;
    let shutdown = coordinator.shutdown_token();

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(program_args).kill_on_drop(true);
    coordinator.env_overlay().await.apply(&mut cmd);
    cmd.env(DISPLAY_ENV_VAR, session.display().to_string());

    let result = match cmd.spawn() {
        Ok(mut child) => {
            tokio::select! {
                status = child.wait() => status
                    .map(exit_code)
                    .map_err(|err| AppError::Io(format!("failed to wait for {program}: {err}"))),
                () = shutdown.cancelled() => {
                    warn!(%program, "interrupted, abandoning wrapped command");
                    Ok(ExitCode::from(130))
                }
            }
        }
        Err(err) => Err(AppError::SpawnFailed(format!("failed to run {program}: {err}"))),
    };

    match coordinator.stop(session).await {
        Some(outcome) => info!(outcome = %outcome.describe(), "xvfb stopped"),
        None => info!("xvfb already stopped"),
    }

    if let Err(err) = &result {
        error!(%err, "wrapped command failed");
    }
    result
}

fn exit_code(status: std::process::ExitStatus) -> ExitCode {
    status
        .code()
        .and_then(|code| u8::try_from(code).ok())
        .map_or(ExitCode::FAILURE, ExitCode::from)
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
