//! Service subcommand handlers.

use tabled::Tabled;
use vpnbypass_core::{Command, CommandResult, ServiceEntry};

use crate::cli::{GlobalOpts, ServicesArgs, ServicesCommand};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Domains")]
    domains: usize,
    #[tabled(rename = "IP Ranges")]
    ip_ranges: usize,
}

async fn set_enabled(
    mut cfg: Config,
    key: String,
    enabled: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (result, settings) = util::with_engine(&cfg, |engine| async move {
        let result = engine
            .execute(Command::SetServiceEnabled { key, enabled })
            .await?;
        Ok((result, engine.snapshot().settings.clone()))
    })
    .await?;
    config::persist_settings(&mut cfg, &settings)?;

    let service = match result {
        CommandResult::Service(service) => service,
        other => {
            return Err(CliError::Internal(format!(
                "unexpected engine result: {other:?}"
            )));
        }
    };
    let verb = if enabled { "Enabled" } else { "Disabled" };
    util::note(global, &format!("{verb} {}", service.name));
    Ok(())
}

pub async fn handle(cfg: Config, args: ServicesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ServicesCommand::List { enabled } => {
            let settings = cfg.to_settings();
            let services: Vec<ServiceEntry> = settings
                .services
                .values()
                .filter(|s| !enabled || s.enabled)
                .cloned()
                .collect();

            let color = output::should_color(&global.color);
            let out = output::render_list(
                &global.output,
                &services,
                |s| ServiceRow {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    enabled: output::paint(if s.enabled { "yes" } else { "no" }, s.enabled, color),
                    domains: s.domains.len(),
                    ip_ranges: s.ip_ranges.len(),
                },
                |s| s.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
        ServicesCommand::Enable { service } => set_enabled(cfg, service, true, global).await,
        ServicesCommand::Disable { service } => set_enabled(cfg, service, false, global).await,
    }
}
