// ── Site validation ──
//
// Reconcile configured sites with the discovered fleet.

use std::collections::HashMap;

use tracing::{info, warn};

use socwatch_api::SiteId;

use crate::model::{ConfiguredSite, FleetSite, FleetSnapshot, SiteValidation, ValidationStatus, Validations};

/// Equipment modes the downstream analysis understands. Inverters that
/// report no mode at all are assumed compatible.
const ELIGIBLE_MODES: [&str; 2] = ["M", "M1"];

pub fn is_eligible_mode(mode: Option<&str>) -> bool {
    mode.is_none_or(|m| ELIGIBLE_MODES.contains(&m))
}

/// Validate every configured site against `fleet`.
///
/// Matching is by site id, never by name. A site is valid only when its id
/// is present upstream and at least one inverter is eligible; the first
/// eligible inverter in roster order wins. Output preserves configuration
/// order; a repeated name keeps its first position and its last value.
pub fn validate(sites: &[ConfiguredSite], fleet: &FleetSnapshot) -> Validations {
    let by_id: HashMap<&SiteId, &FleetSite> =
        fleet.sites.values().map(|site| (&site.id, site)).collect();

    let mut out = Validations::with_capacity(sites.len());
    for configured in sites {
        let validation = match by_id.get(&configured.site_id) {
            Some(live) => validate_one(configured, live),
            None => {
                warn!(site = %configured.name, id = %configured.site_id, "site not found upstream");
                SiteValidation::invalid(configured.site_id.clone())
            }
        };
        out.insert(configured.name.clone(), validation);
    }

    log_summary(&out);
    out
}

fn validate_one(configured: &ConfiguredSite, live: &FleetSite) -> SiteValidation {
    let chosen = live
        .inverters
        .iter()
        .find(|(_, mode)| is_eligible_mode(mode.as_deref()));

    match chosen {
        Some((serial, mode)) => SiteValidation {
            exists: true,
            id_matches: true,
            has_eligible_inverter: true,
            status: ValidationStatus::Valid,
            inverter_sn: Some(serial.clone()),
            inverter_type: Some(mode.clone().unwrap_or_else(|| "M".to_owned())),
            site_id: configured.site_id.clone(),
        },
        None => {
            warn!(
                site = %configured.name,
                inverters = live.inverters.len(),
                "no eligible inverter"
            );
            SiteValidation {
                exists: true,
                id_matches: true,
                ..SiteValidation::invalid(configured.site_id.clone())
            }
        }
    }
}

fn log_summary(validations: &Validations) {
    let valid = validations.values().filter(|v| v.is_valid()).count();
    info!(
        total = validations.len(),
        valid,
        invalid = validations.len() - valid,
        "site validation complete"
    );
    for (name, v) in validations.iter().filter(|(_, v)| !v.is_valid()) {
        let reason = if v.exists {
            "no eligible inverter"
        } else {
            "not found upstream"
        };
        info!(site = %name, id = %v.site_id, reason, "invalid site");
    }
}
