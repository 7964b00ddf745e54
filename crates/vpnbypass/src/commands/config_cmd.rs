//! Config subcommand handlers.

use std::fmt::Write as _;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

use super::util;

/// Preferences as `key = value` lines, in the key names `config set` takes.
fn format_config(cfg: &Config) -> String {
    let p = &cfg.preferences;
    let mut out = String::new();
    let _ = writeln!(out, "auto_apply = {}", p.auto_apply);
    let _ = writeln!(out, "manage_hosts = {}", p.manage_hosts);
    let _ = writeln!(out, "verify_after_apply = {}", p.verify_after_apply);
    let _ = writeln!(out, "auto_refresh = {}", p.auto_refresh);
    let _ = writeln!(
        out,
        "refresh_interval = {}",
        humantime::format_duration(std::time::Duration::from_secs(p.refresh_interval_secs))
    );
    let _ = writeln!(out, "fallback_dns = {}", p.fallback_dns.join(","));
    let _ = writeln!(out);

    let settings = cfg.to_settings();
    let _ = writeln!(
        out,
        "# {} domains ({} enabled), {} of {} services enabled",
        settings.domains.len(),
        settings.enabled_domains().count(),
        settings.enabled_services().count(),
        settings.services.len()
    );
    let _ = write!(out, "# {}", config::config_path().display());
    out
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let out = output::render_single(&global.output, &cfg, format_config, |_| {
                config::config_path().display().to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }

        ConfigCommand::Set { key, value } => {
            // a broken file must not be silently replaced by defaults
            let mut cfg = config::load_config()?;
            cfg.set(&key, &value)?;
            config::save_config(&cfg)?;
            util::note(global, &format!("Set {key} = {value}"));
            Ok(())
        }
    }
}
