//! Domain subcommand handlers.

use chrono::{DateTime, Utc};
use tabled::Tabled;
use vpnbypass_core::{Command, CommandResult, CoreError, DomainEntry};

use crate::cli::{DomainsArgs, DomainsCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct DomainRow {
    #[tabled(rename = "Domain")]
    domain: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Last IP")]
    last_ip: String,
    #[tabled(rename = "Resolved")]
    resolved: String,
}

fn when(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(|| "-".into(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

fn render(entries: &[DomainEntry], global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        entries,
        |d| DomainRow {
            domain: d.domain.clone(),
            enabled: output::paint(if d.enabled { "yes" } else { "no" }, d.enabled, color),
            last_ip: d
                .last_resolved_ip
                .map_or_else(|| "-".into(), |ip| ip.to_string()),
            resolved: when(d.last_resolved_at),
        },
        |d| d.domain.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Run one settings command and write the result back to the config file.
async fn mutate(cfg: &mut Config, cmd: Command) -> Result<DomainEntry, CliError> {
    let (result, settings) = util::with_engine(cfg, |engine| async move {
        let result = engine.execute(cmd).await?;
        Ok((result, engine.snapshot().settings.clone()))
    })
    .await?;
    config::persist_settings(cfg, &settings)?;
    match result {
        CommandResult::Domain(entry) => Ok(entry),
        other => Err(CliError::Internal(format!(
            "unexpected engine result: {other:?}"
        ))),
    }
}

pub async fn handle(
    mut cfg: Config,
    args: DomainsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        DomainsCommand::List => {
            let settings = cfg.to_settings();
            let entries: Vec<DomainEntry> = settings.domains.values().cloned().collect();
            if entries.is_empty() && matches!(global.output, crate::cli::OutputFormat::Table) {
                util::note(global, "No domains configured");
                return Ok(());
            }
            render(&entries, global)
        }

        DomainsCommand::Add { domains } => {
            let (added, settings, first_err) = util::with_engine(&cfg, |engine| async move {
                let mut added = Vec::new();
                let mut first_err: Option<CoreError> = None;
                for domain in domains {
                    match engine.execute(Command::AddDomain { domain }).await {
                        Ok(CommandResult::Domain(entry)) => added.push(entry),
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "domain not added");
                            first_err.get_or_insert(e);
                        }
                    }
                }
                let settings = engine.snapshot().settings.clone();
                Ok((added, settings, first_err))
            })
            .await?;

            if !added.is_empty() {
                config::persist_settings(&mut cfg, &settings)?;
                render(&added, global)?;
            }
            match first_err {
                Some(e) => Err(e.into()),
                None => Ok(()),
            }
        }

        DomainsCommand::Remove { domain } => {
            let entry = mutate(&mut cfg, Command::RemoveDomain { key: domain }).await?;
            util::note(global, &format!("Removed {}", entry.domain));
            Ok(())
        }

        DomainsCommand::Enable { domain } => {
            let entry = mutate(
                &mut cfg,
                Command::SetDomainEnabled {
                    key: domain,
                    enabled: true,
                },
            )
            .await?;
            util::note(global, &format!("Enabled {}", entry.domain));
            Ok(())
        }

        DomainsCommand::Disable { domain } => {
            let entry = mutate(
                &mut cfg,
                Command::SetDomainEnabled {
                    key: domain,
                    enabled: false,
                },
            )
            .await?;
            util::note(global, &format!("Disabled {}", entry.domain));
            Ok(())
        }
    }
}
