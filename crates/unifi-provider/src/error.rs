//! CLI error types with miette diagnostics.
//!
//! Maps `ReconcileError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use unifi_provider_config::ConfigError;
use unifi_provider_core::ReconcileError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach controller after {attempts} attempt(s): {message}")]
    #[diagnostic(
        code(unifi_provider::connection_failed),
        help(
            "Check that the controller is running and accessible.\n\
             Self-signed certificates need --insecure (-k) or ca_cert in your profile."
        )
    )]
    ConnectionFailed { message: String, attempts: u32 },

    #[error("Request timed out")]
    #[diagnostic(
        code(unifi_provider::timeout),
        help("Increase timeout with --timeout or check controller responsiveness.")
    )]
    Timeout,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(unifi_provider::auth_failed),
        help("Verify the API key or username/password for this profile.")
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(unifi_provider::no_credentials),
        help("Set api_key or api_key_env in the profile, or pass --api-key / UNIFI_API_KEY.")
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("Unknown resource kind '{name}'")]
    #[diagnostic(
        code(unifi_provider::unknown_kind),
        help("Run: unifi-provider schema  to list supported kinds")
    )]
    UnknownKind { name: String },

    #[error("Invalid resource {address}: {message}")]
    #[diagnostic(code(unifi_provider::invalid_resource))]
    InvalidResource { address: String, message: String },

    #[error("Controller rejected request: {message}")]
    #[diagnostic(code(unifi_provider::api_error))]
    Api {
        message: String,
        status: Option<u16>,
    },

    #[error("{failed} of {total} instances failed to apply")]
    #[diagnostic(
        code(unifi_provider::apply_failed),
        help("Applied instances were saved to the state file. Fix the errors and re-run apply.")
    )]
    ApplyFailed { failed: usize, total: usize },

    #[error("Cancelled")]
    #[diagnostic(code(unifi_provider::cancelled))]
    Cancelled,

    // ── Input files ──────────────────────────────────────────────────
    #[error("Invalid resource file {path}: {reason}")]
    #[diagnostic(code(unifi_provider::resource_file))]
    ResourceFile { path: String, reason: String },

    #[error("Invalid state file {path}: {reason}")]
    #[diagnostic(
        code(unifi_provider::state_file),
        help("The state file is written by this tool; restore it from a backup if it was edited.")
    )]
    StateFile { path: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(unifi_provider::validation))]
    Validation { field: String, reason: String },

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(unifi_provider::profile_not_found),
        help("Add [profiles.{name}] to {path}, or pass --controller and --api-key.")
    )]
    ProfileNotFound { name: String, path: String },

    #[error(transparent)]
    #[diagnostic(code(unifi_provider::config))]
    Config(Box<figment::Error>),

    #[error("Internal error: {0}")]
    #[diagnostic(code(unifi_provider::internal))]
    Internal(String),

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Api {
                status: Some(409), ..
            } => exit_code::CONFLICT,
            Self::UnknownKind { .. }
            | Self::InvalidResource { .. }
            | Self::ResourceFile { .. }
            | Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ReconcileError → CliError mapping ────────────────────────────────

impl From<ReconcileError> for CliError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Auth { message } => CliError::AuthFailed { message },
            ReconcileError::Transport { message, attempts } => {
                if message.contains("timed out") {
                    CliError::Timeout
                } else {
                    CliError::ConnectionFailed { message, attempts }
                }
            }
            ReconcileError::Api {
                message,
                attribute,
                status,
            } => CliError::Api {
                message: match attribute {
                    Some(attr) => format!("{message} (attribute {attr})"),
                    None => message,
                },
                status,
            },
            ReconcileError::UnknownKind { name } => CliError::UnknownKind { name },
            ReconcileError::Validation { address, message } => CliError::InvalidResource {
                address: address.to_string(),
                message,
            },
            ReconcileError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            ReconcileError::Cancelled => CliError::Cancelled,
            other @ (ReconcileError::PartialFailure { .. }
            | ReconcileError::DependencyFailed { .. }
            | ReconcileError::Internal(_)) => CliError::Internal(other.to_string()),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                path: unifi_provider_config::config_path().display().to_string(),
            },
            ConfigError::Figment(err) => CliError::Config(err),
        }
    }
}
