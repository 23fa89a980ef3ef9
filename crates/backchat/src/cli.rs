//! Clap derive structures for the `backchat` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// backchat -- terminal client for a real-time group chat
#[derive(Debug, Parser)]
#[command(
    name = "backchat",
    version,
    about = "Join, read, and moderate a group chat from the terminal",
    long_about = "A terminal client for backchat servers.\n\n\
        `join` keeps a live view over the server's push channel, retrying\n\
        with backoff and falling back to polling when push is unavailable.",
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
    /// Server profile to use
    #[arg(long, short = 'p', env = "BACKCHAT_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Server URL (overrides profile)
    #[arg(long, short = 's', env = "BACKCHAT_SERVER", global = true)]
    pub server: Option<String>,

    /// Display name (overrides profile)
    #[arg(long, short = 'u', env = "BACKCHAT_USERNAME", global = true)]
    pub username: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "BACKCHAT_OUTPUT",
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
    #[arg(long, short = 'k', env = "BACKCHAT_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "BACKCHAT_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
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
    /// Plain text, one message id per line (scripting)
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
    /// Join the chat and follow it live; stdin lines are sent as messages
    #[command(alias = "j")]
    Join(JoinArgs),

    /// Print the current message list
    #[command(alias = "ls")]
    List(ListArgs),

    /// Post a single message
    Send(SendArgs),

    /// Delete a message (admin)
    #[command(alias = "rm")]
    Delete(DeleteArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Chat commands ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct JoinArgs {
    /// Log in as admin on join (enables /delete and tags your messages)
    #[arg(long)]
    pub admin: bool,

    /// Fall back to polling on the first push failure
    #[arg(long)]
    pub poll_on_first_failure: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Max messages to fetch (server default: 50)
    #[arg(long, short = 'l')]
    pub limit: Option<u32>,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Message text
    #[arg(required = true, num_args = 1..)]
    pub content: Vec<String>,

    /// Log in as admin first and tag the message as an admin message
    #[arg(long)]
    pub admin: bool,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Message id
    pub id: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Add a profile from --server (and --username) to the config file
    Init {
        /// Profile name
        #[arg(long, default_value = "default")]
        name: String,

        /// Prompt for the admin password and store it in the system keyring
        #[arg(long)]
        store_admin_password: bool,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Display current resolved configuration
    Show,

    /// Print the config file path
    Path,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
