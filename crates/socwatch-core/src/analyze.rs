// ── Battery analysis ──
//
// Reduces one day of SOC and voltage series into a `SiteAnalysis`.
// Pure: no I/O, no clock.

use thiserror::Error;
use tracing::{debug, error};

use socwatch_api::{Metric, TimeSeriesRecord};

use crate::model::{AnalysisMap, RawBundles, RawSiteBundle, SiteAnalysis, SocLevel};

/// A telemetry value that could not be read as a number.
#[derive(Debug, Error, PartialEq)]
#[error("{label} value {value:?} at {time:?} is not numeric")]
pub struct AnalysisError {
    pub label: &'static str,
    pub value: String,
    pub time: String,
}

fn numeric(metric: Metric, record: &TimeSeriesRecord) -> Result<f64, AnalysisError> {
    record
        .value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AnalysisError {
            label: metric.label(),
            value: record.value.clone(),
            time: record.time.clone(),
        })
}

/// Analyse one site's bundle.
///
/// - lowest SOC is the first minimum; current SOC is the last record.
///   An empty SOC series yields [`SocLevel::Offline`] for both.
/// - voltage difference pairs battery and BMS records by position over
///   the shorter series; ties keep the earliest pair.
/// - current voltages come from the last record of each series on its own,
///   timed by the battery record. Voltage fields are only filled when both
///   series have data; a lone series is ignored entirely.
pub fn analyze_site(bundle: &RawSiteBundle) -> Result<SiteAnalysis, AnalysisError> {
    let soc = bundle.data.series(Metric::StateOfCharge.label());
    let v_bat = bundle.data.series(Metric::BatteryVoltage.label());
    let v_bms = bundle.data.series(Metric::BmsVoltage.label());

    // ── State of charge ──────────────────────────────────────────────
    let mut lowest: Option<(f64, &TimeSeriesRecord)> = None;
    for record in soc {
        let value = numeric(Metric::StateOfCharge, record)?;
        match lowest {
            Some((min, _)) if value >= min => {}
            _ => lowest = Some((value, record)),
        }
    }
    let current = match soc.last() {
        Some(record) => Some((numeric(Metric::StateOfCharge, record)?, record)),
        None => None,
    };

    // ── Voltage spread ───────────────────────────────────────────────
    let mut widest: Option<(f64, f64, &TimeSeriesRecord)> = None;
    let mut latest: Option<(f64, f64, &TimeSeriesRecord)> = None;
    if let (Some(last_bat), Some(last_bms)) = (v_bat.last(), v_bms.last()) {
        latest = Some((
            numeric(Metric::BatteryVoltage, last_bat)?,
            numeric(Metric::BmsVoltage, last_bms)?,
            last_bat,
        ));

        for (bat, bms) in v_bat.iter().zip(v_bms) {
            let bat_value = numeric(Metric::BatteryVoltage, bat)?;
            let diff = (bat_value - numeric(Metric::BmsVoltage, bms)?).abs();
            match widest {
                Some((max, _, _)) if diff <= max => {}
                _ => widest = Some((diff, bat_value, bat)),
            }
        }
    }

    Ok(SiteAnalysis {
        site_id: bundle.site_id.clone(),
        inverter_sn: bundle.inverter_sn.clone(),
        inverter_type: bundle.inverter_type.clone(),
        lowest_soc: lowest.map_or(SocLevel::Offline, |(v, _)| SocLevel::Percent(v)),
        lowest_soc_time: lowest.map(|(_, r)| r.time.clone()),
        current_soc: current.map_or(SocLevel::Offline, |(v, _)| SocLevel::Percent(v)),
        current_soc_time: current.map(|(_, r)| r.time.clone()),
        max_v_diff: widest.map(|(d, _, _)| d),
        max_diff_time: widest.map(|(_, _, r)| r.time.clone()),
        max_v_bat: widest.map(|(_, v, _)| v),
        max_v_bat_time: widest.map(|(_, _, r)| r.time.clone()),
        current_v_bat: latest.map(|(v, _, _)| v),
        current_vbms: latest.map(|(_, v, _)| v),
        current_voltage_time: latest.map(|(_, _, r)| r.time.clone()),
        yesterday_max_soc: bundle.yesterday_max_soc,
    })
}

/// Analyse every bundle. A site whose data cannot be analysed is logged
/// and left out; the others are unaffected.
pub fn analyze(bundles: &RawBundles) -> AnalysisMap {
    let mut out = AnalysisMap::with_capacity(bundles.len());
    for (name, bundle) in bundles {
        match analyze_site(bundle) {
            Ok(analysis) => {
                out.insert(name.clone(), analysis);
            }
            Err(e) => error!(site = %name, error = %e, "analysis failed"),
        }
    }
    debug!(sites = out.len(), "analysis complete");
    out
}
