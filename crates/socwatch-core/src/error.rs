// ── Core error types ──
//
// Errors surfaced by socwatch-core. Transport details from socwatch-api
// are folded into domain variants by the `From` impl below.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Upstream ─────────────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Telemetry API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Persistence ──────────────────────────────────────────────────
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Sink ─────────────────────────────────────────────────────────
    #[error("Publishing failed: {message}")]
    Publish { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<socwatch_api::Error> for CoreError {
    fn from(err: socwatch_api::Error) -> Self {
        match err {
            socwatch_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            socwatch_api::Error::Transport(ref e) => CoreError::Api {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            },
            socwatch_api::Error::Http { status, body } => CoreError::Api {
                message: format!("HTTP {status}: {body}"),
                status: Some(status),
            },
            socwatch_api::Error::Api { code, message } => CoreError::Api {
                message: format!("code {code}: {message}"),
                status: None,
            },
            socwatch_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            socwatch_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            socwatch_api::Error::Deserialization { message, body: _ } => {
                CoreError::Api {
                    message: format!("unexpected response: {message}"),
                    status: None,
                }
            }
        }
    }
}
