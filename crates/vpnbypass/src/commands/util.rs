//! Shared helpers for command handlers.

use std::future::Future;
use std::io::IsTerminal;
use std::time::Duration;

use indicatif::ProgressBar;
use vpnbypass_core::{CoreError, Engine};

use crate::cli::GlobalOpts;
use crate::config::{self, Config};
use crate::error::CliError;

/// Run `f` against a one-shot engine built from `cfg`.
pub async fn with_engine<F, Fut, T>(cfg: &Config, f: F) -> Result<T, CliError>
where
    F: FnOnce(Engine) -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    Ok(Engine::oneshot(config::engine_config(cfg), cfg.to_settings(), f).await?)
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

/// Spinner on stderr for slow operations; `None` when not interactive.
pub fn spinner(global: &GlobalOpts, message: &str) -> Option<ProgressBar> {
    if global.quiet || !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_owned());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

pub fn finish(pb: Option<ProgressBar>) {
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
}

/// Status line on stderr unless `--quiet`.
pub fn note(global: &GlobalOpts, message: &str) {
    if !global.quiet {
        eprintln!("{message}");
    }
}
