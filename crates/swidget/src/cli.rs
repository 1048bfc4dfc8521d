//! Clap derive structures for the `swidget` CLI.
//!
//! Defines the command tree, global flags, and shared value types. Also
//! compiled by `build.rs` for man pages, so it may only depend on clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// swidget -- control Swidget smart devices on the local network
#[derive(Debug, Parser)]
#[command(
    name = "swidget",
    version,
    about = "Control Swidget smart devices on the local network",
    long_about = "Discover, provision and control Swidget devices.\n\n\
        Talks to each device directly over its local HTTP API and, for\n\
        long-running commands, its authenticated realtime websocket.",
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
    /// Device profile to use
    #[arg(long, short = 'p', env = "SWIDGET_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Device address (overrides profile)
    #[arg(long, env = "SWIDGET_HOST", global = true)]
    pub host: Option<String>,

    /// Device secret key
    #[arg(long, env = "SWIDGET_SECRET_KEY", global = true, hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "SWIDGET_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', env = "SWIDGET_OUTPUT", default_value = "table", global = true)]
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

    /// Talk plain HTTP / WS instead of HTTPS / WSS
    #[arg(long, global = true)]
    pub http: bool,

    /// Verify the device's TLS certificate
    #[arg(long, global = true)]
    pub verify_ssl: bool,

    /// Request timeout in seconds
    #[arg(long, env = "SWIDGET_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
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

#[derive(Debug, Clone, Copy, ValueEnum)]
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
    /// Find Swidget devices on the local network via SSDP
    Discover(DiscoverArgs),

    /// Show the device's current state
    #[command(alias = "status")]
    State,

    /// Show hardware information
    Hwinfo,

    /// Turn the device on
    On,

    /// Turn the device off
    Off,

    /// Get or set the brightness of a dimmer
    Brightness(BrightnessArgs),

    /// Start the countdown timer on a timer switch
    Timer(TimerArgs),

    /// Send an arbitrary command to a device component
    RawCommand(RawCommandArgs),

    /// Ask the device to blink its LED
    Blink,

    /// Enable the device's debug server
    EnableDebugServer,

    /// Stream realtime notifications until interrupted
    Watch(WatchArgs),

    /// Provision a device in access-point mode
    Wifi(WifiArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Device commands ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Seconds to wait for replies
    #[arg(long, default_value = "5")]
    pub timeout: u64,
}

#[derive(Debug, Args)]
pub struct BrightnessArgs {
    /// New level (0-100); omit to print the current level
    #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
    pub level: Option<u8>,

    /// Set the level the dimmer turns on at instead of the current level
    #[arg(long, requires = "level")]
    pub default: bool,
}

#[derive(Debug, Args)]
pub struct TimerArgs {
    /// Minutes until the load turns off
    pub minutes: u32,
}

#[derive(Debug, Args)]
pub struct RawCommandArgs {
    /// Assembly, e.g. "host" or "insert"
    pub assembly: String,

    /// Component id within the assembly
    pub component: String,

    /// Function name, e.g. "toggle"
    pub function: String,

    /// Command payload as JSON, e.g. '{"state":"on"}'
    pub command: String,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Exit after this many notifications
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

// ── Wi-Fi provisioning ───────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WifiArgs {
    #[command(subcommand)]
    pub command: WifiCommand,
}

#[derive(Debug, Subcommand)]
pub enum WifiCommand {
    /// Join a device in AP mode to a Wi-Fi network
    Join(JoinArgs),
}

#[derive(Debug, Args)]
pub struct JoinArgs {
    /// Network name to join (prompted when omitted)
    #[arg(long)]
    pub ssid: Option<String>,

    /// Name to give the device (prompted when omitted)
    #[arg(long)]
    pub device_name: Option<String>,

    /// Network password
    #[arg(long, env = "SWIDGET_NETWORK_PASSWORD", hide_env_values = true)]
    pub network_password: Option<String>,

    /// Secret key for the device; empty lets the device generate one
    #[arg(long = "new-secret-key", env = "SWIDGET_NEW_SECRET_KEY", hide_env_values = true)]
    pub new_secret_key: Option<String>,

    /// Save the resulting device as a profile with this name
    #[arg(long)]
    pub save_profile: Option<String>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive configuration wizard
    Init,

    /// Show the resolved configuration
    Show,

    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
