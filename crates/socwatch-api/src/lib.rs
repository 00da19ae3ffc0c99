// socwatch-api: Async Rust client for the Sunsynk telemetry API

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod plants;
pub mod policy;
pub mod telemetry;
pub mod transport;

pub use auth::AccessToken;
pub use client::{DEFAULT_PAGE_SIZE, SunsynkClient};
pub use error::Error;
pub use models::{
    DayTelemetry, InverterRoster, MetricSeries, Plant, PlantPage, SiteId, TimeSeriesRecord,
};
pub use policy::{RateLimiter, RequestPolicy, RetryPolicy};
pub use telemetry::Metric;
pub use transport::{TlsMode, TransportConfig};
