//! Monitoring logic between `socwatch-api` and the daemon binary.
//!
//! - **[`FetchPipeline`]**: authenticates once per run, enumerates the
//!   live fleet ([`discover_fleet`](FetchPipeline::discover_fleet)) and pulls
//!   per-site telemetry for validated sites
//!   ([`fetch_cycle`](FetchPipeline::fetch_cycle)). Failures are contained
//!   per page and per site.
//!
//! - **[`validate`]**: reconciles configured sites with the live fleet,
//!   choosing the first eligible inverter in roster order.
//!
//! - **[`analyze`]**: reduces raw day series into a fixed-shape
//!   [`SiteAnalysis`] per site.
//!
//! - **[`Monitor`]**: the long-running loop. Daily retention sweep, daily
//!   discovery refresh, and a fetch → analyze → publish cycle every
//!   interval, with the fleet state threaded through as an explicit
//!   [`FleetState`] value.
//!
//! - **[`Publisher`]**: the tabular sink seam, with [`SheetsPublisher`] as
//!   the Google Sheets implementation.

pub mod analyze;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod monitor;
pub mod pipeline;
pub mod publish;
pub mod retention;
pub mod storage;
pub mod validate;

// ── Primary re-exports ──────────────────────────────────────────────
pub use analyze::{AnalysisError, analyze, analyze_site};
pub use cache::{CachedFleet, DiscoveryCache};
pub use config::{ApiSettings, Credentials, MonitorConfig, SheetsAuth, SheetsConfig};
pub use error::CoreError;
pub use model::{
    AnalysisMap, ConfiguredSite, FleetSite, FleetSnapshot, RawBundles, RawSiteBundle,
    SiteAnalysis, SiteValidation, SocLevel, ValidationStatus, Validations,
};
pub use monitor::{CycleReport, DailyTrigger, FleetState, Monitor};
pub use pipeline::FetchPipeline;
pub use publish::{Publisher, SheetsPublisher, sheet_rows};
pub use retention::{RetentionRule, RetentionSweep, SweepReport};
pub use storage::DataDir;
pub use validate::validate;
