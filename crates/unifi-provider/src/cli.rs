//! Clap derive structures for the `unifi-provider` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// unifi-provider -- declare UniFi resources, reconcile the controller
#[derive(Debug, Parser)]
#[command(
    name = "unifi-provider",
    version,
    about = "Reconcile UniFi network resources against declared configuration",
    long_about = "Plans and applies changes to networks, WLANs, firewall rules and groups,\n\
        port forwards, and users on a UniFi controller so that it matches a\n\
        YAML resource file. Tracks controller ids in a local state file.",
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
    /// Controller profile to use
    #[arg(long, short = 'p', env = "UNIFI_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "UNIFI_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Controller URL (overrides profile)
    #[arg(long, short = 'c', env = "UNIFI_CONTROLLER", global = true)]
    pub controller: Option<String>,

    /// Site name
    #[arg(long, short = 's', env = "UNIFI_SITE", global = true)]
    pub site: Option<String>,

    /// Controller API key
    #[arg(long, env = "UNIFI_API_KEY", global = true, hide_env = true)]
    pub api_key: Option<String>,

    /// Controller platform (skips detection when set)
    #[arg(long, value_enum, global = true)]
    pub platform: Option<PlatformArg>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "UNIFI_OUTPUT",
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

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "UNIFI_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "UNIFI_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Instances applied concurrently
    #[arg(long, env = "UNIFI_PARALLELISM", global = true)]
    pub parallelism: Option<usize>,
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
    /// Plain text, one address per line (scripting)
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

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PlatformArg {
    /// UniFi OS console (UDM, UCG, Cloud Key Gen2+)
    UnifiOs,
    /// Standalone Network Application
    Classic,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show what apply would change
    Plan(PlanArgs),

    /// Reconcile the controller with the resource file
    Apply(ApplyArgs),

    /// Re-read stored instances from the controller into the state file
    Refresh(RefreshArgs),

    /// Check a resource file without contacting the controller
    Validate(ResourceArgs),

    /// Describe resource kinds and their attributes
    Schema(SchemaArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct ResourceArgs {
    /// YAML file declaring resources
    #[arg(long, short = 'f', default_value = "unifi.yaml")]
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct StateArgs {
    /// State file tracking controller ids
    #[arg(long, default_value = "unifi.state.json")]
    pub state: PathBuf,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub resources: ResourceArgs,

    #[command(flatten)]
    pub state: StateArgs,

    /// Plan against stored state only, without reading the controller
    #[arg(long)]
    pub no_refresh: bool,
}

#[derive(Debug, Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub resources: ResourceArgs,

    #[command(flatten)]
    pub state: StateArgs,
}

#[derive(Debug, Args)]
pub struct RefreshArgs {
    /// Resource file, used to re-discover instances by identity
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,

    #[command(flatten)]
    pub state: StateArgs,
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// Kind to describe (e.g. network, firewall_rule); all kinds when omitted
    pub kind: Option<String>,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
