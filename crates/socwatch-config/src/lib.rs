//! Configuration for the socwatch daemon.
//!
//! TOML settings layered with `SOCWATCH_` environment overrides, the YAML
//! site list, credential resolution (env + keyring + plaintext), and
//! translation to `socwatch_core::MonitorConfig` / `SheetsConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use socwatch_api::{RetryPolicy, TlsMode, TransportConfig};
use socwatch_core::{
    ApiSettings, ConfiguredSite, Credentials, MonitorConfig, RetentionRule, SheetsAuth, SheetsConfig,
};

const KEYRING_SERVICE: &str = "socwatch";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("missing {what}: set {hint}")]
    Missing { what: String, hint: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("failed to parse site list {path}: {source}")]
    Sites {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// YAML file holding `sla_sites`.
    pub sites_file: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub api: ApiConfig,
    pub monitoring: MonitoringConfig,
    pub retention: RetentionConfig,
    pub sheets: SheetsSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sites_file: PathBuf::from("config/sites.yaml"),
            data_dir: PathBuf::from("data"),
            log_dir: PathBuf::from("logs"),
            api: ApiConfig::default(),
            monitoring: MonitoringConfig::default(),
            retention: RetentionConfig::default(),
            sheets: SheetsSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,

    /// Account name; `SUNSYNK_USERNAME` when unset.
    pub username: Option<String>,

    /// Plaintext password (prefer `SUNSYNK_PASSWORD` or the keyring).
    pub password: Option<String>,

    /// Requests per rolling second.
    pub rate_limit: u32,
    pub max_retries: u32,
    /// Base retry delay; attempt `n` waits `n * retry_delay`.
    pub retry_delay: u64,
    pub page_size: u32,
    pub page_count: u32,
    pub timeout: u64,
    pub insecure: bool,
    pub ca_cert: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.sunsynk.net".into(),
            username: None,
            password: None,
            rate_limit: 20,
            max_retries: 3,
            retry_delay: 2,
            page_size: 14,
            page_count: 14,
            timeout: 30,
            insecure: false,
            ca_cert: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Seconds between cycles.
    pub fetch_interval: u64,
    /// Seconds to wait after a failed iteration.
    pub error_backoff: u64,
    /// `HH:MM` local time for the daily fleet rediscovery.
    pub discovery_at: String,
    /// `HH:MM` local time for the daily retention sweep.
    pub retention_at: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            fetch_interval: 300,
            error_backoff: 60,
            discovery_at: "05:00".into(),
            retention_at: "04:00".into(),
        }
    }
}

/// Age limits in days per data directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub raw_days: u32,
    pub processed_days: u32,
    pub cache_days: u32,
    pub log_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            raw_days: 7,
            processed_days: 7,
            cache_days: 1,
            log_days: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SheetsSection {
    pub enabled: bool,
    pub base_url: String,
    /// Spreadsheet id; `GOOGLE_SHEETS_ID` when unset.
    pub spreadsheet_id: Option<String>,
    pub sheet_name: String,
    /// Service-account key JSON. Preferred over `token_env`.
    pub credentials_file: Option<PathBuf>,
    /// Environment variable holding a pre-minted OAuth access token.
    pub token_env: String,
}

impl Default for SheetsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://sheets.googleapis.com".into(),
            spreadsheet_id: None,
            sheet_name: "Sheet1".into(),
            credentials_file: None,
            token_env: "GOOGLE_SHEETS_TOKEN".into(),
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// `path` if given, else `config/{SOCWATCH_ENV}/config.toml` with the
/// environment defaulting to `development`.
pub fn config_path(path: Option<&Path>) -> PathBuf {
    if let Some(p) = path {
        return p.to_path_buf();
    }
    let env = std::env::var("SOCWATCH_ENV").unwrap_or_else(|_| "development".into());
    PathBuf::from("config").join(env).join("config.toml")
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the TOML file (if present), then `SOCWATCH_*` env with
/// `__` separating nested keys (e.g. `SOCWATCH_API__RATE_LIMIT`).
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SOCWATCH_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

#[derive(Deserialize)]
struct SitesFile {
    #[serde(default)]
    sla_sites: Vec<ConfiguredSite>,
}

/// Read the monitored site list from YAML.
pub fn load_sites(path: &Path) -> Result<Vec<ConfiguredSite>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_sites(&raw).map_err(|source| ConfigError::Sites {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_sites(raw: &str) -> Result<Vec<ConfiguredSite>, serde_yaml::Error> {
    let file: SitesFile = serde_yaml::from_str(raw)?;
    Ok(file.sla_sites)
}

// ── Credential resolution ───────────────────────────────────────────

/// Username from config or `SUNSYNK_USERNAME`; password from
/// `SUNSYNK_PASSWORD`, the system keyring, then plaintext config.
pub fn resolve_credentials(api: &ApiConfig) -> Result<Credentials, ConfigError> {
    let username = api
        .username
        .clone()
        .filter(|u| !u.is_empty())
        .or_else(|| std::env::var("SUNSYNK_USERNAME").ok())
        .ok_or_else(|| ConfigError::Missing {
            what: "Sunsynk username".into(),
            hint: "api.username or SUNSYNK_USERNAME".into(),
        })?;

    // 1. Env var
    if let Ok(pw) = std::env::var("SUNSYNK_PASSWORD") {
        return Ok(Credentials {
            username,
            password: SecretString::from(pw),
        });
    }

    // 2. Keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &username) {
        if let Ok(pw) = entry.get_password() {
            return Ok(Credentials {
                username,
                password: SecretString::from(pw),
            });
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = api.password {
        return Ok(Credentials {
            username,
            password: SecretString::from(pw.clone()),
        });
    }

    Err(ConfigError::Missing {
        what: format!("password for {username}"),
        hint: format!("SUNSYNK_PASSWORD, a '{KEYRING_SERVICE}' keyring entry, or api.password"),
    })
}

// ── Translation to runtime config ───────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL {raw:?}: {e}"),
    })
}

fn parse_time(field: &str, raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("expected HH:MM, got {raw:?}: {e}"),
    })
}

fn transport(api: &ApiConfig) -> TransportConfig {
    let tls = if api.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = api.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };
    TransportConfig {
        tls,
        timeout: Duration::from_secs(api.timeout),
    }
}

/// Retention rules for the data subdirectories and the log directory.
pub fn retention_rules(cfg: &Config) -> Vec<RetentionRule> {
    let r = &cfg.retention;
    vec![
        RetentionRule::days(cfg.data_dir.join("raw"), r.raw_days),
        RetentionRule::days(cfg.data_dir.join("processed"), r.processed_days),
        RetentionRule::days(cfg.data_dir.join("cache"), r.cache_days),
        RetentionRule::days(&cfg.log_dir, r.log_days),
    ]
}

/// Build the monitor's runtime config from `cfg` and the site list.
pub fn monitor_config(
    cfg: &Config,
    sites: Vec<ConfiguredSite>,
) -> Result<MonitorConfig, ConfigError> {
    if cfg.api.rate_limit == 0 {
        return Err(ConfigError::Validation {
            field: "api.rate_limit".into(),
            reason: "must be at least 1".into(),
        });
    }
    if cfg.api.max_retries == 0 {
        return Err(ConfigError::Validation {
            field: "api.max_retries".into(),
            reason: "must be at least 1".into(),
        });
    }

    let mut api = ApiSettings::new(
        parse_url("api.base_url", &cfg.api.base_url)?,
        resolve_credentials(&cfg.api)?,
    );
    api.transport = transport(&cfg.api);
    api.rate_limit = cfg.api.rate_limit;
    api.retry = RetryPolicy {
        max_attempts: cfg.api.max_retries,
        base_delay: Duration::from_secs(cfg.api.retry_delay),
    };
    api.page_size = cfg.api.page_size;
    api.page_count = cfg.api.page_count;

    Ok(MonitorConfig {
        api,
        sites,
        fetch_interval: Duration::from_secs(cfg.monitoring.fetch_interval),
        error_backoff: Duration::from_secs(cfg.monitoring.error_backoff),
        discovery_at: parse_time("monitoring.discovery_at", &cfg.monitoring.discovery_at)?,
        retention_at: parse_time("monitoring.retention_at", &cfg.monitoring.retention_at)?,
        data_dir: cfg.data_dir.clone(),
        retention: retention_rules(cfg),
    })
}

/// Sheets sink settings, or `None` when publishing is disabled.
pub fn sheets_config(cfg: &Config) -> Result<Option<SheetsConfig>, ConfigError> {
    let sheets = &cfg.sheets;
    if !sheets.enabled {
        return Ok(None);
    }

    let spreadsheet_id = sheets
        .spreadsheet_id
        .clone()
        .filter(|id| !id.is_empty())
        .or_else(|| std::env::var("GOOGLE_SHEETS_ID").ok())
        .ok_or_else(|| ConfigError::Missing {
            what: "spreadsheet id".into(),
            hint: "sheets.spreadsheet_id or GOOGLE_SHEETS_ID".into(),
        })?;

    let auth = match &sheets.credentials_file {
        Some(path) if path.is_file() => SheetsAuth::ServiceAccount {
            credentials_file: path.clone(),
        },
        Some(path) => {
            return Err(ConfigError::Missing {
                what: "Google service account key".into(),
                hint: format!("sheets.credentials_file points at {}", path.display()),
            });
        }
        None => std::env::var(&sheets.token_env)
            .map(|token| SheetsAuth::AccessToken(SecretString::from(token)))
            .map_err(|_| ConfigError::Missing {
                what: "Google Sheets credentials".into(),
                hint: format!("sheets.credentials_file or {}", sheets.token_env),
            })?,
    };

    Ok(Some(SheetsConfig {
        base_url: parse_url("sheets.base_url", &sheets.base_url)?,
        spreadsheet_id,
        sheet_name: sheets.sheet_name.clone(),
        auth,
        transport: transport(&cfg.api),
    }))
}
