// ── Fetch pipeline ──
//
// Fleet discovery and per-cycle telemetry collection. Every operation
// authenticates once and then shares that token; failures are contained
// per page and per site and never abort the whole run.

use chrono::{Days, NaiveDate};
use futures_util::future::join_all;
use tracing::{debug, error, info, warn};

use socwatch_api::{AccessToken, InverterRoster, Metric, SunsynkClient};

use crate::config::Credentials;
use crate::error::CoreError;
use crate::model::{FleetSite, FleetSnapshot, RawBundles, RawSiteBundle, SiteValidation, Validations};

const TODAY_METRICS: [Metric; 3] = [
    Metric::StateOfCharge,
    Metric::BatteryVoltage,
    Metric::BmsVoltage,
];

pub struct FetchPipeline {
    client: SunsynkClient,
    credentials: Credentials,
    page_count: u32,
}

impl FetchPipeline {
    pub fn new(client: SunsynkClient, credentials: Credentials, page_count: u32) -> Self {
        Self {
            client,
            credentials,
            page_count: page_count.max(1),
        }
    }

    async fn login(&self) -> Option<AccessToken> {
        match self
            .client
            .authenticate(&self.credentials.username, &self.credentials.password)
            .await
        {
            Ok(token) => Some(token),
            Err(e) => {
                error!(error = %e, user = %self.credentials.username, "authentication failed");
                None
            }
        }
    }

    /// Enumerate every site and its inverter roster.
    ///
    /// Plant pages are requested concurrently and merged in page order; a
    /// failed page contributes nothing. A failed roster lookup records the
    /// site with an empty roster. Authentication failure yields an empty
    /// snapshot.
    pub async fn discover_fleet(&self) -> FleetSnapshot {
        let mut snapshot = FleetSnapshot::default();
        let Some(token) = self.login().await else {
            return snapshot;
        };

        let pages = join_all(
            (1..=self.page_count).map(|page| self.client.list_plants(&token, page)),
        )
        .await;

        let mut plants = Vec::new();
        for (page, result) in (1..=self.page_count).zip(pages) {
            match result {
                Ok(listing) => {
                    debug!(
                        page,
                        plants = listing.infos.len(),
                        total = listing.total,
                        "plant page fetched"
                    );
                    plants.extend(listing.infos);
                }
                Err(e) => warn!(page, error = %e, "plant page failed, skipping"),
            }
        }

        for plant in plants {
            let inverters = match self.client.list_inverters(&token, &plant.id).await {
                Ok(roster) => roster,
                Err(e) => {
                    warn!(site = %plant.name, id = %plant.id, error = %e, "inverter listing failed");
                    InverterRoster::new()
                }
            };
            snapshot.insert(
                plant.name,
                FleetSite {
                    id: plant.id,
                    inverters,
                },
            );
        }

        info!(sites = snapshot.len(), "fleet discovery complete");
        snapshot
    }

    /// Fetch today's telemetry and yesterday's peak SOC for every valid
    /// site. Sites that fail are logged and omitted.
    pub async fn fetch_cycle(&self, validations: &Validations, today: NaiveDate) -> RawBundles {
        let mut bundles = RawBundles::new();
        let Some(token) = self.login().await else {
            return bundles;
        };

        for (name, validation) in validations.iter().filter(|(_, v)| v.is_valid()) {
            match self.fetch_site(&token, validation, today).await {
                Ok(bundle) => {
                    bundles.insert(name.clone(), bundle);
                }
                Err(e) => error!(site = %name, error = %e, "telemetry fetch failed"),
            }
        }

        info!(
            fetched = bundles.len(),
            valid = validations.values().filter(|v| v.is_valid()).count(),
            "telemetry cycle fetched"
        );
        bundles
    }

    async fn fetch_site(
        &self,
        token: &AccessToken,
        validation: &SiteValidation,
        today: NaiveDate,
    ) -> Result<RawSiteBundle, CoreError> {
        let serial = validation
            .inverter_sn
            .as_deref()
            .ok_or_else(|| CoreError::Internal("valid site without inverter".into()))?;

        let data = self
            .client
            .day_telemetry(token, serial, today, &TODAY_METRICS)
            .await?;

        let yesterday_max_soc = match today.checked_sub_days(Days::new(1)) {
            Some(day) => self.peak_soc(token, serial, day).await,
            None => None,
        };

        Ok(RawSiteBundle {
            site_id: validation.site_id.clone(),
            inverter_sn: serial.to_owned(),
            inverter_type: validation
                .inverter_type
                .clone()
                .unwrap_or_else(|| "M".to_owned()),
            data,
            yesterday_max_soc,
        })
    }

    /// Highest SOC recorded on `day`, or `None` if the series is empty,
    /// unreadable or could not be fetched.
    async fn peak_soc(&self, token: &AccessToken, serial: &str, day: NaiveDate) -> Option<f64> {
        let telemetry = match self
            .client
            .day_telemetry(token, serial, day, &[Metric::StateOfCharge])
            .await
        {
            Ok(t) => t,
            Err(e) => {
                warn!(serial, %day, error = %e, "previous-day SOC unavailable");
                return None;
            }
        };

        let values: Option<Vec<f64>> = telemetry
            .series(Metric::StateOfCharge.label())
            .iter()
            .map(|r| r.value.trim().parse::<f64>().ok())
            .collect();
        let Some(values) = values else {
            warn!(serial, %day, "previous-day SOC series has non-numeric values");
            return None;
        };
        values.into_iter().reduce(f64::max)
    }
}
