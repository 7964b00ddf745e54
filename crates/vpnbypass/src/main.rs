mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // the daemon also logs to a file; the guard flushes it on exit
    let log_file = daemon_log_file(&cli.command);
    let _log_guard = match init_tracing(cli.global.verbose, log_file.as_deref()) {
        Ok(guard) => guard,
        Err(err) => exit_with(CliError::Io(err)),
    };

    if let Err(err) = run(cli).await {
        exit_with(err);
    }
}

fn exit_with(err: CliError) -> ! {
    let code = err.exit_code();
    eprintln!("{:?}", miette::Report::new(err));
    std::process::exit(code);
}

fn daemon_log_file(command: &Command) -> Option<PathBuf> {
    match command {
        Command::Run(args) if !args.no_log_file => Some(
            args.log_file
                .clone()
                .unwrap_or_else(config::default_log_path),
        ),
        _ => None,
    }
}

fn init_tracing(verbosity: u8, log_file: Option<&Path>) -> std::io::Result<Option<WorkerGuard>> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console)
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let file_name = path
        .file_name()
        .map_or_else(|| "vpnbypass.log".into(), std::ffi::OsStr::to_os_string);
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    let file = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .init();
    Ok(Some(guard))
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands never start the engine
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "vpnbypass", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            // a broken file must not be replaced by defaults on save
            let cfg = if cmd.writes_settings() {
                config::load_config()?
            } else {
                config::load_config_or_default()
            };
            tracing::debug!(command = ?cmd, "dispatching command");
            commands::dispatch(cmd, cfg, &cli.global).await
        }
    }
}
