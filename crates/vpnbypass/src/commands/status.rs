//! `status`: VPN, gateway and active route overview.

use std::fmt::Write as _;
use std::net::{IpAddr, Ipv4Addr};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;
use vpnbypass_core::{ActiveRoute, ExecutorMode, VpnStatus};

use crate::cli::GlobalOpts;
use crate::config::Config;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Views ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct StatusView {
    vpn: VpnStatus,
    gateway: Option<Ipv4Addr>,
    wifi_ssid: Option<String>,
    pre_vpn_dns: Option<IpAddr>,
    executor: ExecutorMode,
    routes_stale: bool,
    domains_enabled: usize,
    domains_total: usize,
    services_enabled: Vec<String>,
    checked_at: Option<DateTime<Utc>>,
    routes: Vec<ActiveRoute>,
}

#[derive(Tabled)]
pub(super) struct RouteRow {
    #[tabled(rename = "Destination")]
    destination: String,
    #[tabled(rename = "Gateway")]
    gateway: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Since")]
    since: String,
}

impl From<&ActiveRoute> for RouteRow {
    fn from(r: &ActiveRoute) -> Self {
        Self {
            destination: r.destination.clone(),
            gateway: r.gateway.to_string(),
            source: r.source.clone(),
            since: r.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".into(), |v| v.to_string())
}

fn detail(view: &StatusView, color: bool) -> String {
    let mut out = String::new();

    let vpn = match (&view.vpn.interface, &view.vpn.vpn_type) {
        (Some(iface), Some(kind)) if view.vpn.connected => {
            format!("{} ({kind} on {iface})", output::paint("connected", true, color))
        }
        _ => output::paint("disconnected", false, color),
    };
    let _ = writeln!(out, "VPN:          {vpn}");
    let _ = writeln!(out, "Gateway:      {}", or_dash(view.gateway));
    let _ = writeln!(out, "Wi-Fi:        {}", or_dash(view.wifi_ssid.as_deref()));
    let _ = writeln!(out, "Pre-VPN DNS:  {}", or_dash(view.pre_vpn_dns));
    let _ = writeln!(out, "Executor:     {}", view.executor);
    let _ = writeln!(
        out,
        "Domains:      {} of {} enabled",
        view.domains_enabled, view.domains_total
    );
    let services = if view.services_enabled.is_empty() {
        "none".to_owned()
    } else {
        view.services_enabled.join(", ")
    };
    let _ = writeln!(out, "Services:     {services}");

    let mut routes = format!("{} active", view.routes.len());
    if view.routes_stale {
        routes.push_str(&output::dim(" (stale: VPN dropped since install)", color));
    }
    let _ = write!(out, "Routes:       {routes}");

    if !view.routes.is_empty() {
        let rows: Vec<RouteRow> = view.routes.iter().map(RouteRow::from).collect();
        let _ = write!(out, "\n\n{}", output::render_table(&rows));
    }
    out
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let snap = util::with_engine(cfg, |engine| async move { Ok(engine.snapshot()) }).await?;

    let settings = &snap.settings;
    let view = StatusView {
        vpn: snap.vpn.clone(),
        gateway: snap.gateway,
        wifi_ssid: snap.wifi_ssid.clone(),
        pre_vpn_dns: snap.pre_vpn_dns,
        executor: snap.executor.clone(),
        routes_stale: snap.routes_stale,
        domains_enabled: settings.enabled_domains().count(),
        domains_total: settings.domains.len(),
        services_enabled: settings.enabled_services().map(|s| s.name.clone()).collect(),
        checked_at: snap.checked_at,
        routes: snap.routes.as_ref().clone(),
    };

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &view,
        |v| detail(v, color),
        |v| (if v.vpn.connected { "connected" } else { "disconnected" }).to_owned(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
