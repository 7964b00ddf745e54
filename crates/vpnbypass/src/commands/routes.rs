//! Route commands: apply, refresh, clear, verify.

use std::fmt::Write as _;
use std::sync::Arc;

use tabled::Tabled;
use vpnbypass_core::{
    ApplySummary, ClearSummary, Command, CommandResult, RefreshSummary, Settings, Trigger,
};

use crate::cli::GlobalOpts;
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

use super::util;

fn unexpected(result: &CommandResult) -> CliError {
    CliError::Internal(format!("unexpected engine result: {result:?}"))
}

fn failures(out: &mut String, failed: &[String], executor_error: Option<&str>, color: bool) {
    if !failed.is_empty() {
        let _ = write!(
            out,
            "\n{} {}",
            output::paint("Unresolved:", false, color),
            failed.join(", ")
        );
    }
    if let Some(err) = executor_error {
        let _ = write!(out, "\n{} {err}", output::paint("Executor:", false, color));
    }
}

// ── Apply ───────────────────────────────────────────────────────────

fn apply_detail(s: &ApplySummary, color: bool) -> String {
    let mut out = format!(
        "Applied {} of {} routes ({} already in place, {} failed, {} stale removed) in {} ms",
        s.routes_added,
        s.routes_planned,
        s.routes_kept,
        s.routes_failed,
        s.routes_removed,
        s.duration_ms
    );
    failures(&mut out, &s.failed_domains, s.executor_error.as_deref(), color);
    out
}

pub async fn apply(mut cfg: Config, global: &GlobalOpts) -> Result<(), CliError> {
    let pb = util::spinner(global, "Applying bypass routes...");
    let outcome = util::with_engine(&cfg, |engine| async move {
        let result = engine
            .execute(Command::ApplyAll {
                trigger: Trigger::Manual,
            })
            .await;
        let settings = Arc::clone(&engine.snapshot().settings);
        Ok((result, settings))
    })
    .await;
    util::finish(pb);

    let (result, settings) = outcome?;
    // resolutions are recorded even when the executor failed part way
    persist(&mut cfg, &settings)?;

    let summary = match result? {
        CommandResult::Applied(summary) => summary,
        other => return Err(unexpected(&other)),
    };

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &summary,
        |s| apply_detail(s, color),
        |s| s.routes_added.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Refresh ─────────────────────────────────────────────────────────

fn refresh_detail(s: &RefreshSummary, color: bool) -> String {
    let mut out = format!(
        "Refreshed routes: {} added, {} removed",
        s.routes_added, s.routes_removed
    );
    failures(&mut out, &s.failed_domains, s.executor_error.as_deref(), color);
    out
}

pub async fn refresh(mut cfg: Config, global: &GlobalOpts) -> Result<(), CliError> {
    let pb = util::spinner(global, "Refreshing bypass routes...");
    let outcome = util::with_engine(&cfg, |engine| async move {
        let result = engine
            .execute(Command::Refresh {
                trigger: Trigger::Manual,
            })
            .await;
        let settings = Arc::clone(&engine.snapshot().settings);
        Ok((result, settings))
    })
    .await;
    util::finish(pb);

    let (result, settings) = outcome?;
    persist(&mut cfg, &settings)?;

    let summary = match result? {
        CommandResult::Refreshed(summary) => summary,
        CommandResult::Skipped { reason } => {
            util::note(global, &format!("Nothing to refresh: {reason}"));
            return Ok(());
        }
        other => return Err(unexpected(&other)),
    };

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &summary,
        |s| refresh_detail(s, color),
        |s| format!("{} {}", s.routes_added, s.routes_removed),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Write the engine's settings back only if the engine changed them.
fn persist(cfg: &mut Config, settings: &Settings) -> Result<(), CliError> {
    if cfg.to_settings() == *settings {
        return Ok(());
    }
    config::persist_settings(cfg, settings)
}

// ── Clear ───────────────────────────────────────────────────────────

pub async fn clear(cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    if !util::confirm("Remove all bypass routes?", "clear", global.yes)? {
        return Ok(());
    }

    let pb = util::spinner(global, "Removing bypass routes...");
    let result =
        util::with_engine(cfg, |engine| async move { engine.execute(Command::ClearRoutes).await })
            .await;
    util::finish(pb);

    let summary: ClearSummary = match result? {
        CommandResult::Cleared(summary) => summary,
        other => return Err(unexpected(&other)),
    };

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &summary,
        |s| {
            let mut out = format!("Removed {} routes", s.routes_removed);
            if s.routes_failed > 0 {
                let _ = write!(
                    out,
                    ", {}",
                    output::paint(&format!("{} failed", s.routes_failed), false, color)
                );
            }
            failures(&mut out, &[], s.executor_error.as_deref(), color);
            out
        },
        |s| s.routes_removed.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Verify ──────────────────────────────────────────────────────────

#[derive(Tabled)]
struct VerifyRow {
    #[tabled(rename = "Destination")]
    destination: String,
    #[tabled(rename = "Reachable")]
    reachable: String,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Error")]
    error: String,
}

pub async fn verify(cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let pb = util::spinner(global, "Verifying bypass routes...");
    let result =
        util::with_engine(cfg, |engine| async move { engine.execute(Command::VerifyRoutes).await })
            .await;
    util::finish(pb);

    let results = match result? {
        CommandResult::Verified(results) => results,
        other => return Err(unexpected(&other)),
    };

    if results.is_empty() && matches!(global.output, crate::cli::OutputFormat::Table) {
        util::note(global, "No active routes to verify");
        return Ok(());
    }

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &results,
        |r| VerifyRow {
            destination: r.destination.clone(),
            reachable: output::paint(if r.reachable { "yes" } else { "no" }, r.reachable, color),
            latency: r
                .latency_ms
                .map_or_else(|| "-".into(), |ms| format!("{ms:.1} ms")),
            error: r.error.clone().unwrap_or_default(),
        },
        |r| format!("{} {}", r.destination, r.reachable),
    )?;
    output::print_output(&out, global.quiet);

    let unreachable = results.iter().filter(|r| !r.reachable).count();
    if unreachable > 0 {
        util::note(
            global,
            &format!("{unreachable} of {} routes unreachable", results.len()),
        );
    }
    Ok(())
}
