// ── Domain model ──
//
// Configured sites, the live fleet snapshot, per-site validation,
// raw telemetry bundles and the analysis record published each cycle.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

use socwatch_api::{DayTelemetry, InverterRoster, SiteId};

// ── Configured sites ────────────────────────────────────────────────

/// A site the operator wants monitored. `name` is the key used in every
/// downstream map; `site_id` is what discovery is matched against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredSite {
    pub name: String,
    pub site_id: SiteId,
}

impl ConfiguredSite {
    pub fn new(name: impl Into<String>, site_id: impl Into<SiteId>) -> Self {
        Self {
            name: name.into(),
            site_id: site_id.into(),
        }
    }
}

// ── Live fleet ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSite {
    pub id: SiteId,
    #[serde(default)]
    pub inverters: InverterRoster,
}

/// Site name → id and inverter roster, as discovered upstream.
///
/// Serialized as a plain JSON object so the cache file and the raw
/// snapshot dump share one format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FleetSnapshot {
    pub sites: IndexMap<String, FleetSite>,
}

impl FleetSnapshot {
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn insert(&mut self, name: impl Into<String>, site: FleetSite) {
        self.sites.insert(name.into(), site);
    }
}

// ── Validation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Valid,
    #[default]
    Invalid,
}

/// Outcome of checking one configured site against the live fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteValidation {
    pub exists: bool,
    pub id_matches: bool,
    pub has_eligible_inverter: bool,
    pub status: ValidationStatus,
    pub inverter_sn: Option<String>,
    pub inverter_type: Option<String>,
    pub site_id: SiteId,
}

impl SiteValidation {
    pub(crate) fn invalid(site_id: SiteId) -> Self {
        Self {
            exists: false,
            id_matches: false,
            has_eligible_inverter: false,
            status: ValidationStatus::Invalid,
            inverter_sn: None,
            inverter_type: None,
            site_id,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == ValidationStatus::Valid
    }
}

/// Site name → validation, in configuration order.
pub type Validations = IndexMap<String, SiteValidation>;

// ── Raw telemetry ───────────────────────────────────────────────────

/// Everything fetched for one site in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSiteBundle {
    pub site_id: SiteId,
    pub inverter_sn: String,
    pub inverter_type: String,
    /// Today's SOC, battery voltage and BMS voltage series.
    pub data: DayTelemetry,
    /// Peak of yesterday's SOC series; `None` if empty or unreachable.
    pub yesterday_max_soc: Option<f64>,
}

pub type RawBundles = IndexMap<String, RawSiteBundle>;

// ── Analysis ────────────────────────────────────────────────────────

/// A state-of-charge reading, or `OFFLINE` when the day's series came
/// back empty. Distinguishes "no data" from a genuine zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SocLevel {
    Offline,
    Percent(f64),
}

impl SocLevel {
    pub fn is_offline(self) -> bool {
        matches!(self, Self::Offline)
    }
}

impl fmt::Display for SocLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => f.write_str("OFFLINE"),
            Self::Percent(v) => write!(f, "{v}"),
        }
    }
}

impl Serialize for SocLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Offline => serializer.serialize_str("OFFLINE"),
            Self::Percent(v) => serializer.serialize_f64(*v),
        }
    }
}

/// Fixed-shape battery health summary for one site and one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteAnalysis {
    pub site_id: SiteId,
    pub inverter_sn: String,
    pub inverter_type: String,
    pub lowest_soc: SocLevel,
    pub lowest_soc_time: Option<String>,
    pub current_soc: SocLevel,
    pub current_soc_time: Option<String>,
    pub max_v_diff: Option<f64>,
    pub max_diff_time: Option<String>,
    pub max_v_bat: Option<f64>,
    pub max_v_bat_time: Option<String>,
    pub current_v_bat: Option<f64>,
    pub current_vbms: Option<f64>,
    pub current_voltage_time: Option<String>,
    pub yesterday_max_soc: Option<f64>,
}

pub type AnalysisMap = IndexMap<String, SiteAnalysis>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn fleet_snapshot_round_trips_as_plain_object() {
        let json = r#"{"Alpha":{"id":101,"inverters":{"S2":null,"S1":"M1"}},"Beta":{"id":"102"}}"#;
        let snap: FleetSnapshot = serde_json::from_str(json).unwrap();

        assert_eq!(snap.len(), 2);
        let alpha = &snap.sites["Alpha"];
        assert_eq!(alpha.id.as_str(), "101");
        let order: Vec<&str> = alpha.inverters.keys().map(String::as_str).collect();
        assert_eq!(order, ["S2", "S1"]);
        assert!(snap.sites["Beta"].inverters.is_empty());

        let back: FleetSnapshot =
            serde_json::from_str(&serde_json::to_string(&snap).unwrap()).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn soc_level_serializes_sentinel() {
        assert_eq!(
            serde_json::to_string(&SocLevel::Offline).unwrap(),
            "\"OFFLINE\""
        );
        assert_eq!(serde_json::to_string(&SocLevel::Percent(42.5)).unwrap(), "42.5");
        assert_eq!(SocLevel::Percent(85.0).to_string(), "85");
    }
}
