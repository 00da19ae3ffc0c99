use thiserror::Error;

/// Top-level error type for the `socwatch-api` crate.
///
/// Covers every failure mode of the Sunsynk client: authentication,
/// transport, non-2xx responses, envelope-level API errors and decoding.
/// `socwatch-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Token request rejected, or a call was answered with HTTP 401.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    // ── Sunsynk envelope ────────────────────────────────────────────
    /// `{"success": false, "code": N, "msg": "..."}` returned with HTTP 200.
    #[error("Sunsynk API error (code {code}): {message}")]
    Api { code: i64, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the retry policy should try the call again.
    ///
    /// Transport failures, non-2xx statuses and envelope errors are
    /// retried. Rejected credentials and undecodable bodies are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Http { .. } | Self::Api { .. }
        )
    }

    /// Returns `true` if the bearer token was rejected.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}
