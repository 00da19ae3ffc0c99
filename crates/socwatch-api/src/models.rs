// Sunsynk wire types
//
// Every endpoint answers with `{ code, msg, success, data }`. The `data`
// payloads below are lenient: ids and values arrive as
// numbers or strings depending on the endpoint and firmware, and absent
// lists are treated as empty.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ── Envelope ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    pub data: Option<T>,
}

// ── Lenient scalar ───────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
}

impl From<Scalar> for String {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Text(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
        }
    }
}

fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Scalar::deserialize(deserializer).map(String::from)
}

fn optional_scalar_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(String::from))
}

// ── SiteId ───────────────────────────────────────────────────────────

/// Opaque fleet identifier for a plant.
///
/// The API returns numeric ids, configuration files often quote them.
/// Both forms compare equal through their decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteId(String);

impl SiteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SiteId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<u64> for SiteId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for SiteId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SiteId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        scalar_string(deserializer).map(Self::new)
    }
}

// ── Plants ───────────────────────────────────────────────────────────

/// One page of `GET /api/v1/plants`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlantPage {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub infos: Vec<Plant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Plant {
    pub id: SiteId,
    pub name: String,
}

// ── Inverters ────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub(crate) struct InverterPage {
    #[serde(default)]
    pub infos: Vec<InverterInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InverterInfo {
    #[serde(deserialize_with = "scalar_string")]
    pub sn: String,
    #[serde(
        rename = "equipMode",
        default,
        deserialize_with = "optional_scalar_string"
    )]
    pub equip_mode: Option<String>,
}

/// Serial number → optional type tag, in upstream order.
pub type InverterRoster = IndexMap<String, Option<String>>;

// ── Day telemetry ────────────────────────────────────────────────────

/// One `(value, time)` sample. The value stays string-encoded until the
/// analyzer parses it; the time is `YYYY-MM-DD HH:MM:SS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRecord {
    #[serde(deserialize_with = "scalar_string")]
    pub value: String,
    pub time: String,
}

impl TimeSeriesRecord {
    pub fn new(value: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            time: time.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub records: Vec<TimeSeriesRecord>,
}

/// Payload of `GET /api/v1/inverter/{sn}/day`: one series per requested
/// metric, keyed by label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayTelemetry {
    #[serde(default)]
    pub infos: Vec<MetricSeries>,
}

impl DayTelemetry {
    /// Records of the first series carrying `label`, or an empty slice.
    pub fn series(&self, label: &str) -> &[TimeSeriesRecord] {
        self.infos
            .iter()
            .find(|info| info.label == label)
            .map(|info| info.records.as_slice())
            .unwrap_or_default()
    }
}
