//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use backchat_config::ConfigError;
use backchat_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach chat server at {url}")]
    #[diagnostic(
        code(backchat::connection_failed),
        help(
            "Check that the server is running and reachable.\n\
             Self-signed certificate? Try --insecure (-k)."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Request timed out")]
    #[diagnostic(
        code(backchat::timeout),
        help("Increase the timeout with --timeout or check server responsiveness.")
    )]
    Timeout,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Admin login failed: {message}")]
    #[diagnostic(
        code(backchat::auth_failed),
        help(
            "Check the admin password for profile '{profile}'.\n\
             Store it with: backchat config init --store-admin-password"
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("This action requires admin login")]
    #[diagnostic(code(backchat::admin_required))]
    AdminRequired,

    // ── Resources ────────────────────────────────────────────────────
    #[error("Message '{id}' not found")]
    #[diagnostic(
        code(backchat::not_found),
        help("Run: backchat list to see message ids")
    )]
    MessageNotFound { id: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("Server rejected the request: {message}")]
    #[diagnostic(code(backchat::rejected))]
    Rejected { message: String },

    #[error("API error: {message}")]
    #[diagnostic(code(backchat::api_error))]
    ApiError { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(backchat::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(backchat::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: backchat config init --server <URL>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No server configured")]
    #[diagnostic(
        code(backchat::no_config),
        help(
            "Pass --server <URL>, or create a profile with: backchat config init --server <URL>\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("No username given")]
    #[diagnostic(
        code(backchat::no_username),
        help("Pass --username <NAME> or set `username` in your profile.")
    )]
    NoUsername,

    #[error("No admin password configured for profile '{profile}'")]
    #[diagnostic(
        code(backchat::no_credentials),
        help(
            "Set admin_password_env in the profile, store it with\n\
             backchat config init --store-admin-password, or run interactively."
        )
    )]
    NoCredentials { profile: String },

    #[error("Profile '{name}' already exists in {path}")]
    #[diagnostic(code(backchat::profile_exists), help("Use --force to overwrite it."))]
    ProfileExists { name: String, path: String },

    #[error(transparent)]
    #[diagnostic(code(backchat::config))]
    Config(Box<figment::Error>),

    // ── Session ──────────────────────────────────────────────────────
    #[error("Session has ended")]
    #[diagnostic(code(backchat::session_closed))]
    SessionClosed,

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(backchat::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to write config: {0}")]
    #[diagnostic(code(backchat::serialize))]
    Serialize(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::AdminRequired => exit_code::PERMISSION,
            Self::MessageNotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. }
            | Self::NoConfig { .. }
            | Self::NoUsername
            | Self::ProfileNotFound { .. }
            | Self::ProfileExists { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url: if url.is_empty() { "(server)".into() } else { url },
                reason,
            },
            CoreError::Timeout => CliError::Timeout,
            CoreError::SessionClosed => CliError::SessionClosed,
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed {
                profile: "current".into(),
                message,
            },
            CoreError::AdminRequired => CliError::AdminRequired,
            CoreError::MessageNotFound { id } => CliError::MessageNotFound { id },
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Rejected { message } => CliError::Rejected { message },
            CoreError::Api { message, status } => CliError::ApiError {
                message: match status {
                    Some(code) => format!("{message} (HTTP {code})"),
                    None => message,
                },
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::ApiError { message },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: String::new(),
            },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Serialization(e) => CliError::Serialize(e.to_string()),
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}
