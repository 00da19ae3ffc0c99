//! Binary error types with miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use socwatch_config::ConfigError;
use socwatch_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("Invalid configuration: {source}")]
    #[diagnostic(
        code(socwatch::config),
        help(
            "Check the config file ({path}) and the SOCWATCH_* environment.\n\
             Nested keys use a double underscore, e.g. SOCWATCH_API__RATE_LIMIT=10"
        )
    )]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    #[error("No sites configured in {path}")]
    #[diagnostic(
        code(socwatch::no_sites),
        help("Add entries under `sla_sites:` with `name` and `site_id`.")
    )]
    NoSites { path: String },

    // ── Upstream ─────────────────────────────────────────────────────

    #[error("Authentication with the telemetry API failed")]
    #[diagnostic(
        code(socwatch::auth_failed),
        help(
            "Verify SUNSYNK_USERNAME / SUNSYNK_PASSWORD, or store the password with:\n\
             secret-tool store --label socwatch service socwatch username <user>"
        )
    )]
    AuthFailed { message: String },

    #[error("Telemetry API error: {message}")]
    #[diagnostic(code(socwatch::api))]
    Api { message: String },

    #[error("Publishing failed: {message}")]
    #[diagnostic(
        code(socwatch::publish),
        help("Check GOOGLE_SHEETS_ID and the sheets credentials.")
    )]
    Publish { message: String },

    #[error(transparent)]
    #[diagnostic(code(socwatch::core))]
    Core(CoreError),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::NoSites { .. } => exit_code::USAGE,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::Api { .. } | Self::Publish { .. } => exit_code::CONNECTION,
            Self::Core(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::Api { message, .. } => CliError::Api { message },
            CoreError::Publish { message } => CliError::Publish { message },
            other => CliError::Core(other),
        }
    }
}
