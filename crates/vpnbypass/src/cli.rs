//! Clap derive structures for the `vpnbypass` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// vpnbypass -- route selected domains around a full-tunnel VPN
#[derive(Debug, Parser)]
#[command(
    name = "vpnbypass",
    version,
    about = "Route selected domains and services around a full-tunnel VPN",
    long_about = "Keeps chosen domains and service IP ranges on the regular gateway while a\n\
        full-tunnel VPN is connected.\n\n\
        Routes are installed through the privileged helper when it is running,\n\
        or with `sudo -n route` otherwise.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "VPNBYPASS_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show VPN, gateway and bypass route status
    #[command(alias = "st")]
    Status,

    /// Resolve every enabled domain and service and install bypass routes
    Apply,

    /// Re-resolve and swap only the routes whose addresses changed
    Refresh,

    /// Remove every bypass route
    Clear,

    /// Check that installed routes leave through the local gateway
    Verify,

    /// Manage bypassed domains
    #[command(alias = "d")]
    Domains(DomainsArgs),

    /// Enable or disable built-in services
    #[command(alias = "svc")]
    Services(ServicesArgs),

    /// Inspect and change preferences
    Config(ConfigArgs),

    /// Stay in the foreground: apply on connect, refresh on schedule
    Run(RunArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

impl Command {
    /// Whether the command saves settings back to the config file.
    pub fn writes_settings(&self) -> bool {
        match self {
            Self::Apply | Self::Refresh | Self::Config(_) | Self::Run(_) => true,
            Self::Domains(args) => !matches!(args.command, DomainsCommand::List),
            Self::Services(args) => !matches!(args.command, ServicesCommand::List { .. }),
            Self::Status | Self::Clear | Self::Verify | Self::Completions(_) => false,
        }
    }
}

// ── Domains ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DomainsArgs {
    #[command(subcommand)]
    pub command: DomainsCommand,
}

#[derive(Debug, Subcommand)]
pub enum DomainsCommand {
    /// List configured domains
    #[command(alias = "ls")]
    List,

    /// Add one or more domains (URLs are accepted and normalized)
    Add {
        #[arg(required = true, num_args = 1..)]
        domains: Vec<String>,
    },

    /// Remove a domain and its routes
    #[command(alias = "rm")]
    Remove {
        /// Domain name or entry id
        domain: String,
    },

    /// Enable a domain
    Enable {
        /// Domain name or entry id
        domain: String,
    },

    /// Disable a domain and remove its routes
    Disable {
        /// Domain name or entry id
        domain: String,
    },
}

// ── Services ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ServicesArgs {
    #[command(subcommand)]
    pub command: ServicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum ServicesCommand {
    /// List built-in services
    #[command(alias = "ls")]
    List {
        /// Only show enabled services
        #[arg(long)]
        enabled: bool,
    },

    /// Enable a service
    Enable {
        /// Service id or name
        service: String,
    },

    /// Disable a service and remove its routes
    Disable {
        /// Service id or name
        service: String,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the current configuration
    Show,

    /// Print the config file path
    Path,

    /// Set a preference
    ///
    /// Keys: auto_apply, manage_hosts, verify_after_apply, auto_refresh,
    /// refresh_interval (e.g. 30m), fallback_dns (comma-separated)
    Set { key: String, value: String },
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Log file (default: vpnbypass.log in the state directory)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Only log to stderr
    #[arg(long, conflicts_with = "log_file")]
    pub no_log_file: bool,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
