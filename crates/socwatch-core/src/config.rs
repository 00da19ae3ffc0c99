// ── Runtime configuration ──
//
// Fully resolved settings handed to the monitor. Built by socwatch-config
// from files and environment; this module never touches disk.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use secrecy::SecretString;
use url::Url;

use socwatch_api::{
    DEFAULT_PAGE_SIZE, RateLimiter, RequestPolicy, RetryPolicy, SunsynkClient, TransportConfig,
};

use crate::error::CoreError;
use crate::model::ConfiguredSite;
use crate::retention::RetentionRule;

/// Number of plant pages fetched per discovery.
pub const DEFAULT_PAGE_COUNT: u32 = 14;

/// Upstream account credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// How to reach and pace the telemetry API.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: Url,
    pub credentials: Credentials,
    pub transport: TransportConfig,
    /// Request budget per rolling second, shared by every call.
    pub rate_limit: u32,
    pub retry: RetryPolicy,
    pub page_size: u32,
    pub page_count: u32,
}

impl ApiSettings {
    pub fn new(base_url: Url, credentials: Credentials) -> Self {
        Self {
            base_url,
            credentials,
            transport: TransportConfig::default(),
            rate_limit: 20,
            retry: RetryPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
            page_count: DEFAULT_PAGE_COUNT,
        }
    }

    /// Build the HTTP client with one shared rate limiter and retry policy.
    pub fn build_client(&self) -> Result<SunsynkClient, CoreError> {
        let policy = RequestPolicy::new(RateLimiter::per_second(self.rate_limit), self.retry);
        let client = SunsynkClient::new(self.base_url.clone(), &self.transport, policy)?;
        Ok(client.with_page_size(self.page_size))
    }
}

/// Everything the monitoring loop needs.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub api: ApiSettings,
    pub sites: Vec<ConfiguredSite>,
    /// Pause between successful iterations.
    pub fetch_interval: Duration,
    /// Pause after an iteration fails.
    pub error_backoff: Duration,
    /// Local time after which the fleet is rediscovered once per day.
    pub discovery_at: NaiveTime,
    /// Local time after which the retention sweep runs once per day.
    pub retention_at: NaiveTime,
    /// Root for `cache/`, `raw/` and `processed/`.
    pub data_dir: PathBuf,
    pub retention: Vec<RetentionRule>,
}

/// Where Sheets bearer tokens come from.
#[derive(Debug, Clone)]
pub enum SheetsAuth {
    /// Service-account key file. Tokens are minted on demand and refreshed
    /// before they expire.
    ServiceAccount { credentials_file: PathBuf },
    /// A token minted outside the process, used as is.
    AccessToken(SecretString),
}

/// Google Sheets sink settings.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub base_url: Url,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub auth: SheetsAuth,
    pub transport: TransportConfig,
}
