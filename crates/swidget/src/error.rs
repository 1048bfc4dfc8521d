//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a stable exit code.

use miette::Diagnostic;
use thiserror::Error;

use swidget_config::ConfigError;
use swidget_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to device at {host}")]
    #[diagnostic(
        code(swidget::connection_failed),
        help(
            "Check that the device is powered and reachable on this network.\n\
             Devices on older firmware only speak plain HTTP: try --http"
        )
    )]
    ConnectionFailed {
        host: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed")]
    #[diagnostic(
        code(swidget::auth_failed),
        help(
            "The device rejected the secret key for profile '{profile}'.\n\
             Re-run: swidget config init"
        )
    )]
    AuthFailed { profile: String },

    #[error("No secret key configured for profile '{profile}'")]
    #[diagnostic(
        code(swidget::no_credentials),
        help(
            "Configure one with: swidget config init\n\
             Or set the SWIDGET_SECRET_KEY environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Device ───────────────────────────────────────────────────────
    #[error("Device error ({code}): {message}")]
    #[diagnostic(code(swidget::device_error))]
    ApiError { code: String, message: String },

    #[error("Operation '{operation}' is not supported by this device")]
    #[diagnostic(code(swidget::unsupported), help("{reason}"))]
    Unsupported { operation: String, reason: String },

    #[error("Provisioning failed: {message}")]
    #[diagnostic(
        code(swidget::provisioning),
        help(
            "Make sure this machine is joined to the device's \"Swidget-\" network\n\
             and that the SSID and password are correct."
        )
    )]
    Provisioning { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(swidget::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(swidget::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: swidget config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No device configured")]
    #[diagnostic(
        code(swidget::no_config),
        help(
            "Pass --host and --secret-key, or create a profile with: swidget config init\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(swidget::config))]
    Config(Box<ConfigError>),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("'{action}' requires confirmation")]
    #[diagnostic(
        code(swidget::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(swidget::timeout),
        help("Increase the timeout with --timeout or check the device's connection.")
    )]
    Timeout { seconds: u64 },

    #[error("Device did not answer within {timeout_ms}ms")]
    #[diagnostic(code(swidget::command_timeout))]
    CommandTimeout { timeout_ms: u64 },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(swidget::json), help("Quote the payload for your shell, e.g. '{{\"state\":\"on\"}}'"))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::ProfileNotFound { .. } | Self::NoConfig { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } | Self::CommandTimeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } | Self::Json(_) => exit_code::USAGE,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { host, reason } => CliError::ConnectionFailed {
                host,
                source: reason.into(),
            },

            CoreError::ConnectionClosed => CliError::ConnectionFailed {
                host: "(closed)".into(),
                source: "connection closed before the device answered".into(),
            },

            CoreError::AuthenticationFailed { message: _ } => CliError::AuthFailed {
                profile: "current".into(),
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout { seconds: timeout_secs },

            CoreError::CommandTimeout { timeout_ms, .. } => CliError::CommandTimeout { timeout_ms },

            CoreError::UnsupportedOperation { operation, reason } => CliError::Unsupported { operation, reason },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Rejected { message } => CliError::ApiError {
                code: "rejected".into(),
                message,
            },

            CoreError::MalformedFrame { reason } => CliError::ApiError {
                code: "malformed_frame".into(),
                message: reason,
            },

            CoreError::Provisioning { message } => CliError::Provisioning { message },

            CoreError::Api { message, status } => CliError::ApiError {
                code: status.map_or_else(|| "api".into(), |s| s.to_string()),
                message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::ApiError {
                code: "internal".into(),
                message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::UnknownProfile { profile } => CliError::ProfileNotFound {
                name: profile,
                available: "(none)".into(),
            },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}
