// Sunsynk HTTP client
//
// Wraps `reqwest::Client` with URL construction, bearer auth, envelope
// unwrapping and the shared request policy. Endpoint groups (auth,
// plants, telemetry) are implemented as inherent methods in separate
// files to keep this module focused on transport mechanics.

use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::auth::AccessToken;
use crate::error::Error;
use crate::models::Envelope;
use crate::policy::RequestPolicy;
use crate::transport::TransportConfig;

/// Default number of plants requested per listing page.
pub const DEFAULT_PAGE_SIZE: u32 = 14;

/// Raw HTTP client for the Sunsynk cloud API.
///
/// One instance owns one [`RequestPolicy`]: every call made through it,
/// including retries, draws from the same rate budget.
pub struct SunsynkClient {
    http: reqwest::Client,
    base_url: Url,
    policy: RequestPolicy,
    page_size: u32,
}

impl SunsynkClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the API root, e.g. `https://api.sunsynk.net`.
    pub fn new(
        base_url: Url,
        transport: &TransportConfig,
        policy: RequestPolicy,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, policy))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, policy: RequestPolicy) -> Self {
        Self {
            http,
            base_url,
            policy,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the listing page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn policy(&self) -> &RequestPolicy {
        &self.policy
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/{path}` with the given query pairs appended.
    pub(crate) fn api_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/{}", path.trim_start_matches('/')))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send an authenticated GET and unwrap the envelope.
    ///
    /// Returns `Ok(None)` when the envelope carries no `data`. Callers
    /// decide whether that is an empty result or a failure.
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        token: &AccessToken,
    ) -> Result<Option<T>, Error> {
        debug!("GET {}", url.path());

        let resp = self
            .http
            .get(url)
            .bearer_auth(token.expose())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        parse_envelope(resp).await
    }
}

/// Check the HTTP status, then the `{ success, code, msg }` envelope,
/// and hand back `data`.
pub(crate) async fn parse_envelope<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<Option<T>, Error> {
    let status = resp.status();

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::Authentication {
            message: "token expired or rejected (HTTP 401)".into(),
        });
    }

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Http {
            status: status.as_u16(),
            body: preview(&body).to_owned(),
        });
    }

    let body = resp.text().await?;
    trace!(len = body.len(), "response body received");

    let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(&body)),
        body: body.clone(),
    })?;

    if envelope.success == Some(false) {
        return Err(Error::Api {
            code: envelope.code.unwrap_or(-1),
            message: envelope.msg.unwrap_or_else(|| "request unsuccessful".into()),
        });
    }

    Ok(envelope.data)
}

fn preview(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
