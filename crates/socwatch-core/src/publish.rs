// ── Publishing ──
//
// The tabular sink seam plus the Google Sheets implementation. Each
// publish replaces the whole sheet: header row, then one row per site.

use std::future::Future;

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::config::{SheetsAuth, SheetsConfig};
use crate::error::CoreError;
use crate::model::{AnalysisMap, SiteAnalysis};

pub const HEADERS: [&str; 11] = [
    "Site Name",
    "Inverter SN",
    "Lowest SOC",
    "Lowest Time",
    "Current SOC",
    "Current Time",
    "V-bat",
    "V-BMS",
    "V-Diff",
    "Voltage Time",
    "Yesterday Max SOC",
];

const MISSING: &str = "N/A";

/// Destination for each cycle's analysis.
pub trait Publisher: Send + Sync {
    fn publish(
        &self,
        analyses: &AnalysisMap,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;
}

// ── Row formatting ───────────────────────────────────────────────────

/// `HH:MM` from a `YYYY-MM-DD HH:MM:SS` timestamp.
fn clock(time: Option<&str>) -> String {
    match time {
        Some(t) => {
            let tail = t.split_once(' ').map_or(t, |(_, rest)| rest);
            tail.chars().take(5).collect()
        }
        None => MISSING.to_owned(),
    }
}

fn volts(v: Option<f64>) -> String {
    v.map_or_else(|| MISSING.to_owned(), |v| format!("{v:.2}"))
}

fn row(name: &str, a: &SiteAnalysis) -> Vec<String> {
    vec![
        name.to_owned(),
        a.inverter_sn.clone(),
        a.lowest_soc.to_string(),
        clock(a.lowest_soc_time.as_deref()),
        a.current_soc.to_string(),
        clock(a.current_soc_time.as_deref()),
        volts(a.current_v_bat),
        volts(a.current_vbms),
        volts(a.max_v_diff),
        clock(a.current_voltage_time.as_deref()),
        a.yesterday_max_soc
            .map_or_else(|| MISSING.to_owned(), |v| format!("{v:.1}%")),
    ]
}

/// Header row followed by one row per site, in map order.
pub fn sheet_rows(analyses: &AnalysisMap) -> Vec<Vec<String>> {
    let mut rows = Vec::with_capacity(analyses.len() + 1);
    rows.push(HEADERS.iter().map(|h| (*h).to_owned()).collect());
    rows.extend(analyses.iter().map(|(name, a)| row(name, a)));
    rows
}

// ── Google Sheets ────────────────────────────────────────────────────

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

enum TokenSource {
    Fixed(SecretString),
    /// Caches the minted token and fetches a new one once it expires.
    ServiceAccount(CustomServiceAccount),
}

impl TokenSource {
    fn load(auth: &SheetsAuth) -> Result<Self, CoreError> {
        match auth {
            SheetsAuth::AccessToken(token) => Ok(Self::Fixed(token.clone())),
            SheetsAuth::ServiceAccount { credentials_file } => {
                let account = CustomServiceAccount::from_file(credentials_file).map_err(|e| {
                    CoreError::Config {
                        message: format!(
                            "cannot load service account key {}: {e}",
                            credentials_file.display()
                        ),
                    }
                })?;
                Ok(Self::ServiceAccount(account))
            }
        }
    }

    async fn bearer(&self) -> Result<SecretString, CoreError> {
        match self {
            Self::Fixed(token) => Ok(token.clone()),
            Self::ServiceAccount(account) => {
                let token = account
                    .token(&[SHEETS_SCOPE])
                    .await
                    .map_err(|e| CoreError::Publish {
                        message: format!("service account token: {e}"),
                    })?;
                Ok(SecretString::from(token.as_str().to_owned()))
            }
        }
    }
}

pub struct SheetsPublisher {
    http: reqwest::Client,
    config: SheetsConfig,
    tokens: TokenSource,
}

impl SheetsPublisher {
    pub fn new(config: SheetsConfig) -> Result<Self, CoreError> {
        let http = config.transport.build_client()?;
        Self::with_client(http, config)
    }

    /// Fails when a service-account key cannot be read or parsed.
    pub fn with_client(http: reqwest::Client, config: SheetsConfig) -> Result<Self, CoreError> {
        let tokens = TokenSource::load(&config.auth)?;
        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    fn values_url(&self, range_and_verb: &str) -> Result<Url, CoreError> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| CoreError::Config {
                message: format!("sheets base URL cannot carry a path: {}", self.config.base_url),
            })?
            .pop_if_empty()
            .extend([
                "v4",
                "spreadsheets",
                self.config.spreadsheet_id.as_str(),
                "values",
                range_and_verb,
            ]);
        Ok(url)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        token: &SecretString,
        step: &str,
    ) -> Result<(), CoreError> {
        let resp = request
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| CoreError::Publish {
                message: format!("{step}: {e}"),
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        let hint = if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            " (check the sheets credentials and that the sheet is shared with them)"
        } else {
            ""
        };
        Err(CoreError::Publish {
            message: format!("{step}: HTTP {}{hint}: {body}", status.as_u16()),
        })
    }
}

impl Publisher for SheetsPublisher {
    async fn publish(&self, analyses: &AnalysisMap) -> Result<(), CoreError> {
        let sheet = self.config.sheet_name.as_str();
        let rows = sheet_rows(analyses);
        let token = self.tokens.bearer().await?;

        let clear = self.values_url(&format!("{sheet}:clear"))?;
        self.send(self.http.post(clear).json(&json!({})), &token, "clear sheet")
            .await?;

        let mut update = self.values_url(&format!("{sheet}!A1"))?;
        update
            .query_pairs_mut()
            .append_pair("valueInputOption", "RAW");
        debug!(rows = rows.len(), sheet, "writing sheet");
        self.send(
            self.http.put(update).json(&json!({ "values": rows })),
            &token,
            "update sheet",
        )
        .await?;

        info!(sites = analyses.len(), sheet, "sheet updated");
        Ok(())
    }
}
