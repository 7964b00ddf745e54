//! Command dispatch: bridges CLI args -> engine Commands -> output formatting.

pub mod config_cmd;
pub mod domains;
pub mod routes;
pub mod run;
pub mod services;
pub mod status;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::config::Config;
use crate::error::CliError;

/// Dispatch an engine-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, cfg: Config, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Status => status::handle(&cfg, global).await,
        Command::Apply => routes::apply(cfg, global).await,
        Command::Refresh => routes::refresh(cfg, global).await,
        Command::Clear => routes::clear(&cfg, global).await,
        Command::Verify => routes::verify(&cfg, global).await,
        Command::Domains(args) => domains::handle(cfg, args, global).await,
        Command::Services(args) => services::handle(cfg, args, global).await,
        Command::Run(_) => run::handle(cfg).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "config and completions are handled before dispatch".into(),
        )),
    }
}
